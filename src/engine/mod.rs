// src/engine/mod.rs

//! Orchestration engine for watchsync.
//!
//! This module ties together:
//! - the batch type produced by watchers
//! - the pure priority buckets ([`queue`])
//! - the drain loop that hands batches to registered consumers
//!   ([`runtime`])
//!
//! The ordering rules live in [`queue::PriorityBuckets`]; the async shell
//! that owns the idle/draining flag is [`runtime::PriorityChangeQueue`].

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::types::{Metadata, Priority, WatchTarget};
use crate::watch::WatchRoot;

pub mod queue;
pub mod runtime;

pub use queue::PriorityBuckets;
pub use runtime::PriorityChangeQueue;

/// One debounced set of changes for one target.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeBatch {
    pub target_id: String,
    pub priority: Priority,
    /// Absolute paths, de-duplicated, in first-seen order.
    pub files: Vec<PathBuf>,
    pub enqueued_at: DateTime<Utc>,
    /// Copied from the target when the batch was created.
    pub metadata: Metadata,
    /// Root the files were observed under.
    pub root: WatchRoot,
}

impl ChangeBatch {
    pub fn new(target: &WatchTarget, root: WatchRoot, files: Vec<PathBuf>) -> Self {
        let mut unique: Vec<PathBuf> = Vec::with_capacity(files.len());
        for file in files {
            if !unique.contains(&file) {
                unique.push(file);
            }
        }
        Self {
            target_id: target.id.clone(),
            priority: target.priority,
            files: unique,
            enqueued_at: Utc::now(),
            metadata: target.metadata.clone(),
            root,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Lifecycle of the drain loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueuePhase {
    #[default]
    Idle,
    Draining,
}

pub type ConsumerFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

/// Something that processes drained batches.
///
/// Consumers run one at a time, in registration order, each awaited to
/// completion before the next. An error or panic is logged and does not
/// affect other consumers or batches.
pub trait BatchConsumer: Send + Sync + 'static {
    fn consume(&self, batch: Arc<ChangeBatch>) -> ConsumerFuture<'_>;
}

/// Adapter turning an async closure into a [`BatchConsumer`].
pub struct FnConsumer<F>(pub F);

impl<F, Fut> BatchConsumer for FnConsumer<F>
where
    F: Fn(Arc<ChangeBatch>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn consume(&self, batch: Arc<ChangeBatch>) -> ConsumerFuture<'_> {
        Box::pin((self.0)(batch))
    }
}
