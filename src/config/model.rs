// src/config/model.rs

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::errors::{Result, SyncError};
use crate::remote::RemoteEndpoint;
use crate::retry::RetryPolicy;
use crate::sync::UploadFilter;
use crate::watch::WatchSettings;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [remote]
/// owner = "octo"
/// repo = "notes"
/// branch = "main"
/// token_env = "GITHUB_TOKEN"
///
/// [watch]
/// debounce_ms = 2000
///
/// [sync]
/// targets_file = "projects.json"
/// ```
///
/// Every section is optional as far as parsing goes; `owner` and `repo` are
/// enforced when converting into [`ConfigFile`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub remote: RemoteSection,
    #[serde(default)]
    pub watch: WatchSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub sync: SyncSection,
}

/// `[remote]` section.
#[derive(Clone, Deserialize)]
pub struct RemoteSection {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Login the token must belong to; defaults to `owner`.
    #[serde(default)]
    pub username: Option<String>,
    /// Inline token. Prefer `token_env`.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_api_version() -> String {
    "2022-11-28".to_string()
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            owner: String::new(),
            repo: String::new(),
            branch: default_branch(),
            username: None,
            token: None,
            token_env: default_token_env(),
            timeout_secs: default_timeout_secs(),
            api_version: default_api_version(),
        }
    }
}

impl fmt::Debug for RemoteSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSection")
            .field("api_base", &self.api_base)
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("branch", &self.branch)
            .field("username", &self.username)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("token_env", &self.token_env)
            .field("timeout_secs", &self.timeout_secs)
            .field("api_version", &self.api_version)
            .finish()
    }
}

/// `[watch]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchSection {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_debounce_ms() -> u64 {
    2000
}

fn default_settle_ms() -> u64 {
    500
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            settle_ms: default_settle_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// `[retry]` section, applied to every remote call.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

fn default_max_retries() -> u32 {
    RetryPolicy::default().max_retries
}

fn default_base_delay_ms() -> u64 {
    RetryPolicy::default().base_delay.as_millis() as u64
}

fn default_max_delay_ms() -> u64 {
    RetryPolicy::default().max_delay.as_millis() as u64
}

fn default_backoff_factor() -> f64 {
    RetryPolicy::default().backoff_factor
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

/// `[sync]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncSection {
    /// JSON file holding the watch targets.
    #[serde(default = "default_targets_file")]
    pub targets_file: String,
    /// Commit message for targets without their own. `{target}` and `{count}`
    /// are substituted.
    #[serde(default = "default_commit_message")]
    pub commit_message: String,
    /// Check the token against `/user` before starting.
    #[serde(default = "default_true")]
    pub validate_credentials: bool,
    #[serde(default = "default_reschedule_ms")]
    pub reschedule_ms: u64,
    /// How long shutdown waits for in-flight batches.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    /// Upload limit in bytes; targets may override it with `maxFileSize`.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default)]
    pub min_file_size: u64,
    #[serde(default = "default_blocked_extensions")]
    pub blocked_extensions: Vec<String>,
    /// Empty means every extension not blocked. Targets may override it
    /// with `allowedExtensions`.
    #[serde(default)]
    pub allowed_extensions: Vec<String>,
}

fn default_targets_file() -> String {
    "projects.json".to_string()
}

fn default_commit_message() -> String {
    crate::sync::DEFAULT_COMMIT_MESSAGE.to_string()
}

fn default_true() -> bool {
    true
}

fn default_reschedule_ms() -> u64 {
    100
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

fn default_max_file_size() -> u64 {
    crate::sync::filter::DEFAULT_MAX_FILE_SIZE
}

fn default_blocked_extensions() -> Vec<String> {
    crate::sync::filter::DEFAULT_BLOCKED_EXTENSIONS
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            targets_file: default_targets_file(),
            commit_message: default_commit_message(),
            validate_credentials: default_true(),
            reschedule_ms: default_reschedule_ms(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            max_file_size: default_max_file_size(),
            min_file_size: 0,
            blocked_extensions: default_blocked_extensions(),
            allowed_extensions: Vec::new(),
        }
    }
}

/// Validated configuration.
///
/// Only obtainable through `TryFrom<RawConfigFile>`, so holders can rely on
/// the invariants checked there.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub remote: RemoteSection,
    pub watch: WatchSection,
    pub retry: RetrySection,
    pub sync: SyncSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            remote: raw.remote,
            watch: raw.watch,
            retry: raw.retry,
            sync: raw.sync,
        }
    }

    pub fn username(&self) -> &str {
        self.remote.username.as_deref().unwrap_or(&self.remote.owner)
    }

    pub fn watch_settings(&self) -> WatchSettings {
        WatchSettings {
            debounce: Duration::from_millis(self.watch.debounce_ms),
            settle: Duration::from_millis(self.watch.settle_ms),
            poll_interval: Duration::from_millis(self.watch.poll_interval_ms),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry.max_retries,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            backoff_factor: self.retry.backoff_factor,
        }
    }

    pub fn upload_filter(&self) -> UploadFilter {
        UploadFilter::new(
            self.sync.max_file_size,
            self.sync.min_file_size,
            &self.sync.blocked_extensions,
            &self.sync.allowed_extensions,
        )
    }

    pub fn reschedule_delay(&self) -> Duration {
        Duration::from_millis(self.sync.reschedule_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.sync.shutdown_grace_secs)
    }

    /// Inline token, else the variable named by `token_env`.
    pub fn resolve_token(&self) -> Result<String> {
        resolve_token_with(&self.remote, |name| std::env::var(name).ok())
    }

    pub fn endpoint(&self, token: String) -> RemoteEndpoint {
        RemoteEndpoint {
            api_base: self.remote.api_base.clone(),
            owner: self.remote.owner.clone(),
            repo: self.remote.repo.clone(),
            branch: self.remote.branch.clone(),
            token,
            api_version: self.remote.api_version.clone(),
            timeout: Duration::from_secs(self.remote.timeout_secs),
        }
    }
}

pub(crate) fn resolve_token_with(
    remote: &RemoteSection,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String> {
    if let Some(token) = remote.token.as_deref().filter(|t| !t.trim().is_empty()) {
        return Ok(token.trim().to_string());
    }
    match lookup(&remote.token_env) {
        Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        _ => Err(SyncError::Config(format!(
            "no access token: set [remote].token or the {} environment variable",
            remote.token_env
        ))),
    }
}
