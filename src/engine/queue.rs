// src/engine/queue.rs

use std::collections::VecDeque;

use crate::types::Priority;

use super::ChangeBatch;

/// Three FIFO buckets, one per [`Priority`].
///
/// Pure data structure: the drain loop snapshots one bucket at a time with
/// [`take`](Self::take), walking [`Priority::DRAIN_ORDER`]. Batches pushed
/// after a `take` land in the now-empty bucket and wait for the next pass.
#[derive(Debug, Default)]
pub struct PriorityBuckets {
    buckets: [VecDeque<ChangeBatch>; 3],
}

impl PriorityBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, batch: ChangeBatch) {
        self.buckets[batch.priority.index()].push_back(batch);
    }

    /// Remove and return every batch of `priority`, oldest first.
    pub fn take(&mut self, priority: Priority) -> Vec<ChangeBatch> {
        std::mem::take(&mut self.buckets[priority.index()]).into()
    }

    pub fn len_of(&self, priority: Priority) -> usize {
        self.buckets[priority.index()].len()
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(VecDeque::is_empty)
    }
}
