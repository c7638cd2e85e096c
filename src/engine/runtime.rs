// src/engine/runtime.rs

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::errors::SyncError;
use crate::types::Priority;

use super::queue::PriorityBuckets;
use super::{BatchConsumer, ChangeBatch, FnConsumer, QueuePhase};

/// Delay between drain passes while work keeps arriving.
pub const DEFAULT_RESCHEDULE_DELAY: Duration = Duration::from_millis(100);

struct QueueState {
    buckets: PriorityBuckets,
    phase: QueuePhase,
}

struct QueueInner {
    state: Mutex<QueueState>,
    consumers: RwLock<Vec<Arc<dyn BatchConsumer>>>,
    reschedule_delay: Duration,
    phase_tx: watch::Sender<QueuePhase>,
}

impl QueueInner {
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn consumers(&self) -> Vec<Arc<dyn BatchConsumer>> {
        self.consumers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// Serializes change batches from every watcher by strict priority.
///
/// The queue is `Idle` until the first [`enqueue`](Self::enqueue), which flips
/// it to `Draining` and spawns the drain loop. Only one drain loop exists at a
/// time; it runs passes until a pass ends with all buckets empty, sleeping
/// `reschedule_delay` between passes, then goes back to `Idle`.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct PriorityChangeQueue {
    inner: Arc<QueueInner>,
}

impl fmt::Debug for PriorityChangeQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityChangeQueue")
            .field("phase", &self.phase())
            .field("pending", &self.pending_len())
            .finish_non_exhaustive()
    }
}

impl Default for PriorityChangeQueue {
    fn default() -> Self {
        Self::new(DEFAULT_RESCHEDULE_DELAY)
    }
}

impl PriorityChangeQueue {
    pub fn new(reschedule_delay: Duration) -> Self {
        let (phase_tx, _) = watch::channel(QueuePhase::Idle);
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    buckets: PriorityBuckets::new(),
                    phase: QueuePhase::Idle,
                }),
                consumers: RwLock::new(Vec::new()),
                reschedule_delay,
                phase_tx,
            }),
        }
    }

    /// Register a consumer. Consumers run in registration order.
    pub fn on_batch_processed(&self, consumer: Arc<dyn BatchConsumer>) {
        self.inner
            .consumers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(consumer);
    }

    /// Register an async closure as a consumer.
    pub fn on_batch_processed_fn<F, Fut>(&self, f: F)
    where
        F: Fn(Arc<ChangeBatch>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_batch_processed(Arc::new(FnConsumer(f)));
    }

    /// Queue a batch. Empty batches are dropped and return `false`.
    ///
    /// Must be called from within a tokio runtime; the first batch after an
    /// idle period spawns the drain loop.
    pub fn enqueue(&self, batch: ChangeBatch) -> bool {
        if batch.is_empty() {
            debug!(target_id = %batch.target_id, "dropping empty batch");
            return false;
        }

        info!(
            event = "batch_enqueued",
            target_id = %batch.target_id,
            priority = %batch.priority,
            files = batch.files.len(),
            "batch enqueued"
        );

        let start_drain = {
            let mut state = self.inner.lock_state();
            state.buckets.push(batch);
            if state.phase == QueuePhase::Idle {
                state.phase = QueuePhase::Draining;
                self.inner.phase_tx.send_replace(QueuePhase::Draining);
                true
            } else {
                false
            }
        };

        if start_drain {
            tokio::spawn(drain_loop(Arc::clone(&self.inner)));
        }
        true
    }

    pub fn phase(&self) -> QueuePhase {
        self.inner.lock_state().phase
    }

    /// Batches waiting for a drain pass (not counting the one in flight).
    pub fn pending_len(&self) -> usize {
        self.inner.lock_state().buckets.len()
    }

    pub fn pending_of(&self, priority: Priority) -> usize {
        self.inner.lock_state().buckets.len_of(priority)
    }

    /// Resolve once the drain loop has gone back to idle.
    pub async fn wait_until_idle(&self) {
        let mut rx = self.inner.phase_tx.subscribe();
        // The sender lives as long as `inner`, which `self` keeps alive.
        let _ = rx.wait_for(|phase| *phase == QueuePhase::Idle).await;
    }
}

async fn drain_loop(inner: Arc<QueueInner>) {
    debug!("drain loop started");
    let mut passes: u64 = 0;

    loop {
        passes += 1;
        for priority in Priority::DRAIN_ORDER {
            let snapshot = inner.lock_state().buckets.take(priority);
            for batch in snapshot {
                dispatch(&inner, Arc::new(batch)).await;
            }
        }

        {
            let mut state = inner.lock_state();
            if state.buckets.is_empty() {
                state.phase = QueuePhase::Idle;
                inner.phase_tx.send_replace(QueuePhase::Idle);
                break;
            }
        }

        debug!(
            delay_ms = inner.reschedule_delay.as_millis() as u64,
            "batches arrived during the pass; rescheduling"
        );
        tokio::time::sleep(inner.reschedule_delay).await;
    }

    debug!(passes, "drain loop idle");
}

async fn dispatch(inner: &QueueInner, batch: Arc<ChangeBatch>) {
    let consumers = inner.consumers();
    let mut failed = 0usize;

    for (index, consumer) in consumers.iter().enumerate() {
        let consumer = Arc::clone(consumer);
        let job = Arc::clone(&batch);
        // Own task per call so a panic is contained.
        let outcome = tokio::spawn(async move { consumer.consume(job).await }).await;

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(SyncError::Consumer(format!("{err:#}"))),
            Err(join_err) if join_err.is_panic() => Some(SyncError::Consumer("consumer panicked".into())),
            Err(join_err) => Some(SyncError::Consumer(join_err.to_string())),
        };
        if let Some(err) = failure {
            failed += 1;
            error!(
                target_id = %batch.target_id,
                consumer = index,
                error = %err,
                "batch consumer failed"
            );
        }
    }

    info!(
        event = "batch_drained",
        target_id = %batch.target_id,
        priority = %batch.priority,
        files = batch.files.len(),
        consumers = consumers.len(),
        failed,
        "batch processed"
    );
}
