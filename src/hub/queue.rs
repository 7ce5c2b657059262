//! Bounded FIFO of updates held for a subject without live observers.

use std::collections::VecDeque;

use crate::updates::Update;

/// Offline queue of one subject.
///
/// Invariant: `len() <= capacity()`; pushing onto a full queue evicts the oldest entry.
#[derive(Debug)]
pub(crate) struct OfflineQueue {
    items: VecDeque<Update>,
    capacity: usize,
}

impl OfflineQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Appends an update, returning the evicted oldest entry if the queue was full.
    pub(crate) fn push(&mut self, update: Update) -> Option<Update> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(update);
        evicted
    }

    /// Takes every queued update in arrival order.
    pub(crate) fn drain(&mut self) -> Vec<Update> {
        self.items.drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
