#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use watchsync::fs::FileSystem;
use watchsync::remote::{ContentApi, RemoteSyncClient};
use watchsync::retry::RetryPolicy;
use watchsync::types::{Priority, WatchTarget};
use watchsync::watch::WatchSettings;

/// Builder for `WatchTarget` to simplify test setup.
pub struct WatchTargetBuilder {
    target: WatchTarget,
}

impl WatchTargetBuilder {
    pub fn new(id: &str, root: impl AsRef<Path>) -> Self {
        Self {
            target: WatchTarget::with_id(id, root.as_ref(), Priority::Medium),
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.target.priority = priority;
        self
    }

    pub fn ignore(mut self, pattern: &str) -> Self {
        self.target.ignore_patterns.push(pattern.to_string());
        self
    }

    pub fn meta(mut self, key: &str, value: &str) -> Self {
        self.target
            .metadata
            .insert(key.to_string(), serde_json::Value::String(value.to_string()));
        self
    }

    pub fn build(self) -> WatchTarget {
        self.target
    }
}

/// Watch timings short enough for tests against a real filesystem.
pub fn fast_watch_settings() -> WatchSettings {
    WatchSettings {
        debounce: Duration::from_millis(150),
        settle: Duration::from_millis(30),
        poll_interval: Duration::from_millis(50),
    }
}

/// Retry policy with millisecond delays.
pub fn fast_retry_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_factor: 2.0,
    }
}

/// A client over `api` that authenticates as `user`.
pub fn client_with(
    api: Arc<dyn ContentApi>,
    fs: Arc<dyn FileSystem>,
    user: &str,
) -> RemoteSyncClient {
    RemoteSyncClient::new(api, fs, fast_retry_policy(), user)
}
