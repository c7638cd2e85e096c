// src/remote/client.rs

//! Versioned single-file operations over a [`ContentApi`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::{error, info, warn};

use crate::classify::classify;
use crate::errors::{Result, SyncError};
use crate::fs::FileSystem;
use crate::retry::{RetryAttempt, RetryPolicy};

use super::api::{CommitResponse, ContentApi, DeleteContents, PutContents};
use super::error::{ApiError, remote_retry_condition};

/// Current remote state of one file. `content_hash` is `None` when the file
/// does not exist remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBlobRef {
    pub path: String,
    pub content_hash: Option<String>,
    pub content: Option<Vec<u8>>,
}

impl RemoteBlobRef {
    fn missing(path: &str) -> Self {
        Self {
            path: path.to_string(),
            content_hash: None,
            content: None,
        }
    }

    pub fn exists(&self) -> bool {
        self.content_hash.is_some()
    }
}

/// One local file and where it goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadItem {
    pub local: PathBuf,
    pub remote: String,
}

#[derive(Debug)]
pub struct UploadOutcome {
    pub file: PathBuf,
    pub remote: String,
    pub result: Result<CommitResponse>,
}

impl UploadOutcome {
    pub fn success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Performs authenticated, retried get/put/delete of single blobs.
///
/// Every remote call runs under the configured [`RetryPolicy`] with
/// [`remote_retry_condition`]; terminal failures come back as
/// [`SyncError::RemoteAuth`], [`SyncError::RemoteTransient`] or
/// [`SyncError::RemoteRejected`].
#[derive(Clone)]
pub struct RemoteSyncClient {
    api: Arc<dyn ContentApi>,
    fs: Arc<dyn FileSystem>,
    retry: RetryPolicy,
    username: String,
}

impl fmt::Debug for RemoteSyncClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSyncClient")
            .field("api", &self.api)
            .field("retry", &self.retry)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl RemoteSyncClient {
    pub fn new(
        api: Arc<dyn ContentApi>,
        fs: Arc<dyn FileSystem>,
        retry: RetryPolicy,
        username: impl Into<String>,
    ) -> Self {
        Self {
            api,
            fs,
            retry,
            username: username.into(),
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Fetch the current remote state of `path`. A 404 yields an empty ref.
    pub async fn get_blob(&self, path: &str) -> Result<RemoteBlobRef> {
        let api = self.api.as_ref();
        let blob = self
            .retry
            .execute_if(move || fetch_blob(api, path), remote_retry_condition)
            .await?;
        Ok(blob)
    }

    /// Create or update `remote_path` with the bytes of `local`.
    ///
    /// The current remote sha is re-read on every attempt, so a retried update
    /// always carries the latest version.
    pub async fn put_blob(&self, local: &Path, remote_path: &str, message: &str) -> Result<CommitResponse> {
        if !self.fs.is_file(local) {
            warn!(event = "upload_failure", file = %local.display(), "local file missing");
            return Err(SyncError::LocalFileMissing(local.to_path_buf()));
        }
        let bytes = self.fs.read(local).map_err(|e| read_error(local, e))?;
        let content = BASE64.encode(&bytes);

        let api = self.api.as_ref();
        let content = content.as_str();
        let outcome = self
            .retry
            .execute_with_hook(
                move || attempt_put(api, remote_path, content, message),
                remote_retry_condition,
                honour_retry_after,
            )
            .await;

        match outcome {
            Ok(resp) => {
                info!(
                    event = "upload_success",
                    path = remote_path,
                    bytes = bytes.len(),
                    commit = %resp.commit.sha,
                    "uploaded file"
                );
                Ok(resp)
            }
            Err(err) => {
                let err = SyncError::from(err);
                error!(event = "upload_failure", path = remote_path, error = %err, "upload failed");
                Err(err)
            }
        }
    }

    /// Delete `remote_path`. A path that does not exist remotely is a no-op
    /// returning `Ok(None)` without issuing a delete request.
    pub async fn delete_blob(&self, remote_path: &str, message: &str) -> Result<Option<CommitResponse>> {
        let api = self.api.as_ref();
        let outcome = self
            .retry
            .execute_with_hook(
                move || attempt_delete(api, remote_path, message),
                remote_retry_condition,
                honour_retry_after,
            )
            .await;

        match outcome {
            Ok(Some(resp)) => {
                info!(
                    event = "upload_success",
                    path = remote_path,
                    commit = %resp.commit.sha,
                    "deleted remote file"
                );
                Ok(Some(resp))
            }
            Ok(None) => {
                warn!(path = remote_path, "file does not exist remotely; nothing to delete");
                Ok(None)
            }
            Err(err) => {
                let err = SyncError::from(err);
                error!(event = "upload_failure", path = remote_path, error = %err, "delete failed");
                Err(err)
            }
        }
    }

    /// Upload files one after another. A failure is recorded and does not stop
    /// the remaining items.
    pub async fn upload_many(&self, items: &[UploadItem], message: &str) -> Vec<UploadOutcome> {
        let mut outcomes = Vec::with_capacity(items.len());
        for item in items {
            let result = self.put_blob(&item.local, &item.remote, message).await;
            outcomes.push(UploadOutcome {
                file: item.local.clone(),
                remote: item.remote.clone(),
                result,
            });
        }
        outcomes
    }

    /// Whether the credentials work and belong to the configured user.
    ///
    /// Any failure counts as invalid.
    pub async fn validate_credentials(&self) -> bool {
        let api = self.api.as_ref();
        let login = self
            .retry
            .execute_if(move || api.authenticated_user(), remote_retry_condition)
            .await;

        match login {
            Ok(login) if login.eq_ignore_ascii_case(&self.username) => {
                info!(user = %login, "credentials validated");
                true
            }
            Ok(login) => {
                warn!(
                    expected = %self.username,
                    actual = %login,
                    "credentials belong to a different user"
                );
                false
            }
            Err(err) => {
                let err = SyncError::from(err);
                warn!("credential validation failed\n{}", classify(&err).report());
                false
            }
        }
    }

    /// Commit sha at the head of the configured branch.
    pub async fn head_commit(&self) -> Result<String> {
        let api = self.api.as_ref();
        let sha = self
            .retry
            .execute_if(move || api.branch_head(), remote_retry_condition)
            .await?;
        Ok(sha)
    }
}

/// One GET, with 404 mapped to a missing blob.
async fn fetch_blob(api: &dyn ContentApi, path: &str) -> std::result::Result<RemoteBlobRef, ApiError> {
    match api.get_contents(path).await {
        Ok(entry) => {
            let packed: String = entry.content.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            let content = BASE64
                .decode(packed.as_bytes())
                .map_err(|e| ApiError::Decode(format!("content of {path}: {e}")))?;
            Ok(RemoteBlobRef {
                path: path.to_string(),
                content_hash: Some(entry.sha),
                content: Some(content),
            })
        }
        Err(err) if err.is_not_found() => Ok(RemoteBlobRef::missing(path)),
        Err(err) => Err(err),
    }
}

async fn attempt_put(
    api: &dyn ContentApi,
    path: &str,
    content: &str,
    message: &str,
) -> std::result::Result<CommitResponse, ApiError> {
    let current = fetch_blob(api, path).await?;
    info!(
        event = "upload_attempt",
        path,
        update = current.exists(),
        "uploading file"
    );
    let body = PutContents {
        message: message.to_string(),
        content: content.to_string(),
        branch: api.branch().to_string(),
        sha: current.content_hash,
    };
    api.put_contents(path, &body).await
}

async fn attempt_delete(
    api: &dyn ContentApi,
    path: &str,
    message: &str,
) -> std::result::Result<Option<CommitResponse>, ApiError> {
    let current = fetch_blob(api, path).await?;
    let Some(sha) = current.content_hash else {
        return Ok(None);
    };
    info!(event = "upload_attempt", path, delete = true, "deleting remote file");
    let body = DeleteContents {
        message: message.to_string(),
        sha,
        branch: api.branch().to_string(),
    };
    api.delete_contents(path, &body).await.map(Some)
}

/// Retry hook: wait out `retry-after` on throttled responses.
fn honour_retry_after(attempt: &RetryAttempt<'_, ApiError>) -> anyhow::Result<Option<Duration>> {
    let throttled = match attempt.error {
        ApiError::Status {
            status, rate_limited, ..
        } => *status == 429 || *rate_limited,
        _ => false,
    };
    Ok(if throttled { attempt.error.retry_after() } else { None })
}

fn read_error(path: &Path, err: anyhow::Error) -> SyncError {
    match err.downcast::<std::io::Error>() {
        Ok(io) if io.kind() == std::io::ErrorKind::NotFound => SyncError::LocalFileMissing(path.to_path_buf()),
        Ok(io) => SyncError::Io(io),
        Err(other) => SyncError::Other(other),
    }
}
