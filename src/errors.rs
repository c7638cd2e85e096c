// src/errors.rs

//! Crate-wide error taxonomy and result alias.

use std::path::PathBuf;

use thiserror::Error;

use crate::remote::ApiError;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Watch root does not exist (yet). Non-fatal for a running watcher.
    #[error("watch path unavailable: {}", .0.display())]
    PathUnavailable(PathBuf),

    /// A changed file vanished between detection and upload.
    #[error("local file missing: {}", .0.display())]
    LocalFileMissing(PathBuf),

    /// 401 / invalid credentials. Terminal for the operation.
    #[error("remote authentication failed: {0}")]
    RemoteAuth(ApiError),

    /// Network, 5xx, 429 or rate-limit 403 that outlived its retries.
    #[error("remote transient failure: {0}")]
    RemoteTransient(ApiError),

    /// Any other 4xx (e.g. 422), or an undecodable response.
    #[error("remote rejected request: {0}")]
    RemoteRejected(ApiError),

    /// A registered batch consumer failed or panicked.
    #[error("batch consumer failed: {0}")]
    Consumer(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("file watch error: {0}")]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ApiError> for SyncError {
    fn from(err: ApiError) -> Self {
        if err.status_code() == Some(401) {
            SyncError::RemoteAuth(err)
        } else if err.is_retryable() {
            SyncError::RemoteTransient(err)
        } else {
            SyncError::RemoteRejected(err)
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SyncError>;
