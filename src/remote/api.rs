// src/remote/api.rs

//! Pluggable content-API backend.
//!
//! [`RemoteSyncClient`](super::RemoteSyncClient) talks to a [`ContentApi`]
//! instead of an HTTP client directly. Production uses
//! [`HttpContentApi`](super::HttpContentApi); tests swap in an in-memory fake
//! that records requests and can script failures.
//!
//! Every method issues exactly one request. Retrying, create-vs-update and
//! 404 handling belong to the client, not to the backend.

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use super::error::ApiError;

pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// `GET /repos/{owner}/{repo}/contents/{path}` response.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ContentsEntry {
    /// Base64, possibly wrapped with newlines.
    #[serde(default)]
    pub content: String,
    pub sha: String,
}

/// `PUT /repos/{owner}/{repo}/contents/{path}` body.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PutContents {
    pub message: String,
    /// Base64 of the file contents.
    pub content: String,
    pub branch: String,
    /// Current blob sha; omitted on create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

/// `DELETE /repos/{owner}/{repo}/contents/{path}` body.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeleteContents {
    pub message: String,
    pub sha: String,
    pub branch: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BlobInfo {
    pub path: String,
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CommitInfo {
    pub sha: String,
}

/// Response of a PUT or DELETE. `content` is null for deletes.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CommitResponse {
    #[serde(default)]
    pub content: Option<BlobInfo>,
    pub commit: CommitInfo,
}

/// Trait abstracting the remote content API.
pub trait ContentApi: Send + Sync + Debug {
    /// Fetch one file. A missing file is `ApiError::Status { status: 404, .. }`.
    fn get_contents<'a>(&'a self, path: &'a str) -> ApiFuture<'a, ContentsEntry>;

    fn put_contents<'a>(&'a self, path: &'a str, body: &'a PutContents) -> ApiFuture<'a, CommitResponse>;

    fn delete_contents<'a>(
        &'a self,
        path: &'a str,
        body: &'a DeleteContents,
    ) -> ApiFuture<'a, CommitResponse>;

    /// Commit sha the configured branch points at.
    fn branch_head(&self) -> ApiFuture<'_, String>;

    /// Login of the identity behind the configured credentials.
    fn authenticated_user(&self) -> ApiFuture<'_, String>;

    /// Branch all writes go to.
    fn branch(&self) -> &str;
}
