// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `watchsync`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "watchsync",
    version,
    about = "Mirror local file changes to a GitHub repository.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Watchsync.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Watchsync.toml")]
    pub config: String,

    /// Targets file (JSON), overriding `[sync].targets_file`.
    #[arg(long, value_name = "PATH")]
    pub targets: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `WATCHSYNC_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate config and targets, print them, and exit.
    #[arg(long, conflicts_with = "check")]
    pub dry_run: bool,

    /// Validate credentials and print the branch head, then exit.
    #[arg(long)]
    pub check: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
