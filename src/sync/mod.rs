// src/sync/mod.rs

//! The batch consumer that mirrors local changes to the remote.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::classify::classify;
use crate::engine::{BatchConsumer, ChangeBatch, ConsumerFuture};
use crate::errors::{Result, SyncError};
use crate::fs::FileSystem;
use crate::remote::{RemoteSyncClient, UploadItem};
use crate::types::{meta, metadata_str};
use crate::watch::repo_path;

pub mod filter;

pub use filter::UploadFilter;

pub const DEFAULT_COMMIT_MESSAGE: &str = "Auto-commit: file update";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub file: PathBuf,
    pub remote: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub file: PathBuf,
    pub reason: String,
}

/// Outcome of mirroring one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub target_id: String,
    pub success_count: usize,
    pub fail_count: usize,
    /// Files not attempted: directories, paths outside the root, files the
    /// upload filter rejects, or a suspended target. Always `skips.len()`.
    pub skipped: usize,
    pub skips: Vec<SkippedFile>,
    pub failures: Vec<FileFailure>,
}

impl SyncReport {
    fn new(target_id: &str) -> Self {
        Self {
            target_id: target_id.to_string(),
            ..Self::default()
        }
    }

    fn skip(&mut self, file: &Path, reason: impl Into<String>) {
        let reason = reason.into();
        debug!(file = %file.display(), reason = %reason, "skipping file");
        self.skipped += 1;
        self.skips.push(SkippedFile {
            file: file.to_path_buf(),
            reason,
        });
    }

    fn record(&mut self, file: PathBuf, remote: String, result: std::result::Result<(), &SyncError>) {
        match result {
            Ok(()) => self.success_count += 1,
            Err(err) => {
                self.fail_count += 1;
                self.failures.push(FileFailure {
                    file,
                    remote,
                    reason: err.to_string(),
                });
            }
        }
    }
}

/// Uploads files that still exist and deletes remotely the ones that are
/// gone.
///
/// Remote paths are the basename for single-file targets and the
/// root-relative path for directory targets, prefixed by the `pathPrefix`
/// metadata when set. Files the [`UploadFilter`] rejects are skipped. A
/// `RemoteAuth` failure suspends the target until [`resume`](Self::resume).
pub struct MirrorConsumer {
    client: RemoteSyncClient,
    repo_clients: HashMap<String, RemoteSyncClient>,
    fs: Arc<dyn FileSystem>,
    upload_filter: UploadFilter,
    default_message: String,
    suspended: Mutex<HashSet<String>>,
    report_tx: Option<mpsc::UnboundedSender<SyncReport>>,
}

impl fmt::Debug for MirrorConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MirrorConsumer")
            .field("repos", &self.repo_clients.keys().collect::<Vec<_>>())
            .field("default_message", &self.default_message)
            .field("upload_filter", &self.upload_filter)
            .finish_non_exhaustive()
    }
}

impl MirrorConsumer {
    pub fn new(client: RemoteSyncClient, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            client,
            repo_clients: HashMap::new(),
            fs,
            upload_filter: UploadFilter::default(),
            default_message: DEFAULT_COMMIT_MESSAGE.to_string(),
            suspended: Mutex::new(HashSet::new()),
            report_tx: None,
        }
    }

    /// Commit message used when a target has no `commitMessage` metadata.
    pub fn with_default_message(mut self, message: impl Into<String>) -> Self {
        self.default_message = message.into();
        self
    }

    /// Limits applied before every upload; targets may override parts of it
    /// through metadata.
    pub fn with_upload_filter(mut self, filter: UploadFilter) -> Self {
        self.upload_filter = filter;
        self
    }

    /// Client for targets whose `repo` metadata equals `repo`.
    pub fn with_repo_client(mut self, repo: impl Into<String>, client: RemoteSyncClient) -> Self {
        self.repo_clients.insert(repo.into(), client);
        self
    }

    /// Send every report to `tx` as well as logging it.
    pub fn with_report_sink(mut self, tx: mpsc::UnboundedSender<SyncReport>) -> Self {
        self.report_tx = Some(tx);
        self
    }

    fn suspended(&self) -> MutexGuard<'_, HashSet<String>> {
        self.suspended.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_suspended(&self, target_id: &str) -> bool {
        self.suspended().contains(target_id)
    }

    pub fn has_suspended(&self) -> bool {
        !self.suspended().is_empty()
    }

    /// Lift an auth suspension. Returns whether the target was suspended.
    pub fn resume(&self, target_id: &str) -> bool {
        self.suspended().remove(target_id)
    }

    /// Lift every suspension.
    pub fn resume_all(&self) {
        self.suspended().clear();
    }

    fn suspend(&self, target_id: &str) {
        if self.suspended().insert(target_id.to_string()) {
            warn!(target_id, "authentication failed; target suspended until credentials are fixed");
        }
    }

    fn client_for(&self, batch: &ChangeBatch) -> Result<&RemoteSyncClient> {
        match metadata_str(&batch.metadata, meta::REPO) {
            None => Ok(&self.client),
            Some(repo) => self.repo_clients.get(repo).ok_or_else(|| {
                SyncError::Config(format!(
                    "target {} wants repository {repo:?}, which has no client",
                    batch.target_id
                ))
            }),
        }
    }

    fn commit_message(&self, batch: &ChangeBatch, count: usize) -> String {
        let template = metadata_str(&batch.metadata, meta::COMMIT_MESSAGE).unwrap_or(&self.default_message);
        let name = metadata_str(&batch.metadata, meta::NAME).unwrap_or(&batch.target_id);
        template
            .replace("{target}", name)
            .replace("{count}", &count.to_string())
    }

    /// Mirror one batch and report per-file results.
    pub async fn sync_batch(&self, batch: &ChangeBatch) -> Result<SyncReport> {
        let mut report = SyncReport::new(&batch.target_id);
        if self.is_suspended(&batch.target_id) {
            warn!(
                target_id = %batch.target_id,
                files = batch.files.len(),
                "target suspended; skipping batch"
            );
            for file in &batch.files {
                report.skip(file, "target suspended");
            }
            return Ok(report);
        }

        let client = self.client_for(batch)?;
        let filter = self.upload_filter.for_target(&batch.target_id, &batch.metadata)?;
        let prefix = metadata_str(&batch.metadata, meta::PATH_PREFIX);

        let mut uploads = Vec::new();
        let mut deletes = Vec::new();
        for file in &batch.files {
            let Some(rel) = batch.root.relative(file) else {
                report.skip(file, "outside the watch root");
                continue;
            };
            let remote = repo_path(prefix, &rel);
            if self.fs.is_file(file) {
                let size = match self.fs.file_size(file) {
                    Ok(size) => size,
                    Err(err) => {
                        report.skip(file, format!("cannot read file size: {err:#}"));
                        continue;
                    }
                };
                if let Some(reason) = filter.check(file, size) {
                    info!(target_id = %batch.target_id, file = %file.display(), %reason, "file filtered; not uploading");
                    report.skip(file, reason);
                    continue;
                }
                uploads.push(UploadItem {
                    local: file.clone(),
                    remote,
                });
            } else if self.fs.exists(file) {
                report.skip(file, "not a regular file");
            } else {
                deletes.push((file.clone(), remote));
            }
        }

        if !uploads.is_empty() {
            let message = self.commit_message(batch, uploads.len());
            for outcome in client.upload_many(&uploads, &message).await {
                if let Err(err) = &outcome.result {
                    self.note_failure(&batch.target_id, err);
                }
                report.record(outcome.file, outcome.remote, outcome.result.as_ref().map(|_| ()));
            }
        }

        for (file, remote) in deletes {
            let message = format!("Delete {remote}");
            let result = client.delete_blob(&remote, &message).await;
            if let Err(err) = &result {
                self.note_failure(&batch.target_id, err);
            }
            report.record(file, remote, result.as_ref().map(|_| ()));
        }

        info!(
            target_id = %batch.target_id,
            success = report.success_count,
            failed = report.fail_count,
            skipped = report.skipped,
            "batch synced"
        );
        Ok(report)
    }

    fn note_failure(&self, target_id: &str, err: &SyncError) {
        if matches!(err, SyncError::RemoteAuth(_)) {
            self.suspend(target_id);
        }
        debug!(target_id, "sync failure\n{}", classify(err).report());
    }
}

impl BatchConsumer for MirrorConsumer {
    fn consume(&self, batch: Arc<ChangeBatch>) -> ConsumerFuture<'_> {
        Box::pin(async move {
            let report = self.sync_batch(&batch).await?;
            for failure in &report.failures {
                warn!(
                    target_id = %report.target_id,
                    file = %failure.file.display(),
                    remote = %failure.remote,
                    reason = %failure.reason,
                    "file not synced"
                );
            }
            if let Some(tx) = &self.report_tx {
                // A dropped receiver only means nobody is listening.
                let _ = tx.send(report);
            }
            Ok(())
        })
    }
}
