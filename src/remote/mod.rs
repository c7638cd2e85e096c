// src/remote/mod.rs

//! Remote content API: wire types, the HTTP backend, and the retried
//! single-file client used by the sync consumer.

pub mod api;
pub mod client;
pub mod error;
pub mod http;

pub use api::{
    ApiFuture, BlobInfo, CommitInfo, CommitResponse, ContentApi, ContentsEntry, DeleteContents,
    PutContents,
};
pub use client::{RemoteBlobRef, RemoteSyncClient, UploadItem, UploadOutcome};
pub use error::{ApiError, NetworkErrorKind, remote_retry_condition};
pub use http::{HttpContentApi, RemoteEndpoint};
