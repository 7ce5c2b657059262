//! # Process-wide delivery counters.
//!
//! [`Stats`] holds atomics mutated only by the [`Registry`](crate::Registry);
//! [`Counters`] is the read-only serializable snapshot handed to callers.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Snapshot of the delivery counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    /// Observers ever connected.
    pub total_connections: u64,
    /// Observers currently connected.
    pub active_connections: u64,
    /// Updates appended to an observer buffer or an offline queue.
    pub messages_sent: u64,
    /// Observers removed because of send failures or missed heartbeats.
    pub errors: u64,
    /// Offline-queue entries dropped on overflow.
    pub queue_evictions: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Stats {
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    messages_sent: AtomicU64,
    errors: AtomicU64,
    queue_evictions: AtomicU64,
}

impl Stats {
    pub(crate) fn connected(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn disconnected(&self) {
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub(crate) fn message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn queue_eviction(&self) {
        self.queue_evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> Counters {
        Counters {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            queue_evictions: self.queue_evictions.load(Ordering::Relaxed),
        }
    }
}
