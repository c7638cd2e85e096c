// src/watch/mod.rs

//! File watching and change detection.
//!
//! This module is responsible for:
//! - Compiling per-target exclusion rules.
//! - Wiring up a cross-platform filesystem watcher (`notify`).
//! - Coalescing bursts of events into one debounced batch per root.
//!
//! It does **not** know about priorities or the remote; it only turns
//! filesystem changes into batches of paths.

use std::time::Duration;

pub mod coalesce;
pub mod path_utils;
pub mod patterns;
pub mod watcher;

pub use coalesce::Coalescer;
pub use path_utils::{RootKind, WatchRoot, relative_str, repo_path};
pub use patterns::{DEFAULT_IGNORE_PATTERNS, PathFilter};
pub use watcher::{WatcherHandle, start_watcher};

/// Timing knobs shared by every watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSettings {
    /// Quiet period after the last settled write before a batch is emitted.
    pub debounce: Duration,
    /// How long a path must be quiet before its write counts as finished.
    pub settle: Duration,
    /// How often a missing root is re-checked. Zero disables re-checking.
    pub poll_interval: Duration,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(2000),
            settle: Duration::from_millis(500),
            poll_interval: Duration::from_millis(1000),
        }
    }
}
