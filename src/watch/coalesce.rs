// src/watch/coalesce.rs

//! Pure settle + debounce state machine.
//!
//! The watcher feeds raw per-path events into a [`Coalescer`] and polls it at
//! the deadline it reports. No IO and no clock reads happen here: callers pass
//! `now`, which keeps the timing rules testable.
//!
//! A write counts as finished once its path has been quiet for `settle`; the
//! debounce window starts from there. Any event on any path restarts both, so
//! a batch is flushed once the whole root has been quiet for
//! `settle + debounce`.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Coalescer {
    quiet: Duration,
    /// Distinct paths in first-seen order.
    pending: Vec<PathBuf>,
    seen: HashSet<PathBuf>,
    last_event: Option<Instant>,
}

impl Coalescer {
    pub fn new(settle: Duration, debounce: Duration) -> Self {
        Self {
            quiet: settle + debounce,
            pending: Vec::new(),
            seen: HashSet::new(),
            last_event: None,
        }
    }

    /// Record one event for `path` at `now`. Duplicates keep their first
    /// position but still reset the timer.
    pub fn record(&mut self, path: PathBuf, now: Instant) {
        if self.seen.insert(path.clone()) {
            self.pending.push(path);
        }
        self.last_event = Some(self.last_event.map_or(now, |last| last.max(now)));
    }

    /// Advance to `now`. Returns the batch once the quiet period has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<Vec<PathBuf>> {
        let due = self.next_deadline()?;
        if now < due {
            return None;
        }
        self.seen.clear();
        self.last_event = None;
        Some(std::mem::take(&mut self.pending))
    }

    /// Instant at which [`poll`](Self::poll) will flush, if anything is pending.
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.pending.is_empty() {
            return None;
        }
        self.last_event.map(|last| last + self.quiet)
    }

    /// Drop everything without flushing.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.seen.clear();
        self.last_event = None;
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
