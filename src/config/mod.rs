// src/config/mod.rs

//! Configuration loading and validation for watchsync.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate basic invariants (`validate.rs`).
//! - Read the persisted watch targets (`targets.rs`).

pub mod loader;
pub mod model;
pub mod targets;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, resolve_targets_path};
pub use model::{ConfigFile, RawConfigFile, RemoteSection, RetrySection, SyncSection, WatchSection};
pub use targets::{load_targets, parse_targets};
