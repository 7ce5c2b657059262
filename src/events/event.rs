//! # Diagnostic events emitted by the engine, the registry and the runtime.
//!
//! The [`EventKind`] enum classifies events across four groups:
//! - **Execution events**: attempt flow of task executions
//! - **Connection events**: observer lifecycle and delivery problems
//! - **Subscriber events**: problems of diagnostic subscribers themselves
//! - **Runtime events**: shutdown progress
//!
//! The [`Event`] struct carries optional metadata (subject, task, observer, attempt,
//! delay, reason) depending on the kind.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use taskpulse::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::RetryScheduled)
//!     .with_task("t-1")
//!     .with_subject("agent-7")
//!     .with_attempt(2)
//!     .with_delay(Duration::from_secs(4))
//!     .with_reason("connection reset");
//!
//! assert_eq!(ev.kind, EventKind::RetryScheduled);
//! assert_eq!(ev.delay_ms, Some(4000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::ids::ObserverId;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of diagnostic events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Execution events ===
    /// Work was submitted to the engine.
    ///
    /// Sets: `task`, `subject`.
    TaskSubmitted,

    /// An attempt is starting.
    ///
    /// Sets: `task`, `subject`, `attempt` (1-based).
    AttemptStarting,

    /// An attempt failed.
    ///
    /// Sets: `task`, `subject`, `attempt`, `reason` (error label), `detail` (message).
    AttemptFailed,

    /// Next attempt scheduled after a transient failure.
    ///
    /// Sets: `task`, `subject`, `attempt` (failed attempt), `delay_ms`, `reason`.
    RetryScheduled,

    /// Execution completed successfully (terminal).
    ///
    /// Sets: `task`, `subject`, `attempt`.
    TaskCompleted,

    /// Execution failed for good (terminal).
    ///
    /// Sets: `task`, `subject`, `attempt`, `reason` (error label), `detail`.
    TaskFailed,

    /// Execution was cancelled (terminal).
    ///
    /// Sets: `task`, `subject`, `attempt` (attempts made so far).
    TaskCancelled,

    // === Connection events ===
    /// Observer connected.
    ///
    /// Sets: `subject`, `observer`, `count` (backlog size delivered).
    ObserverConnected,

    /// Observer disconnected on request of the transport.
    ///
    /// Sets: `subject`, `observer`.
    ObserverDisconnected,

    /// Observer removed because its transport failed.
    ///
    /// Sets: `subject`, `observer`, `reason`.
    ObserverSendFailed,

    /// Observer removed because it missed heartbeats.
    ///
    /// Sets: `subject`, `observer`.
    ObserverEvicted,

    /// Offline queue was full; the oldest update was dropped.
    ///
    /// Sets: `subject`, `count` (queue length after the append).
    QueueOverflow,

    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `task` (subscriber name), `reason` (panic message).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `task` (subscriber name), `reason` (`full` / `closed`).
    SubscriberOverflow,

    // === Runtime events ===
    /// Shutdown requested.
    ShutdownRequested,

    /// All executions stopped within the grace period.
    AllStoppedWithin,

    /// Grace period exceeded; some executions did not stop in time.
    GraceExceeded,
}

/// Diagnostic event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Task id (or subscriber name for subscriber events).
    pub task: Option<Arc<str>>,
    /// Subject id.
    pub subject: Option<Arc<str>>,
    /// Observer id.
    pub observer: Option<ObserverId>,
    /// Attempt number (1-based).
    pub attempt: Option<u32>,
    /// Retry delay in milliseconds.
    pub delay_ms: Option<u64>,
    /// Short machine-friendly reason (error label, overflow cause).
    pub reason: Option<Arc<str>>,
    /// Human-readable detail (error message).
    pub detail: Option<Arc<str>>,
    /// Generic counter (backlog size, queue length).
    pub count: Option<usize>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            subject: None,
            observer: None,
            attempt: None,
            delay_ms: None,
            reason: None,
            detail: None,
            count: None,
        }
    }

    /// Attaches a task id.
    #[inline]
    pub fn with_task(mut self, task: impl AsRef<str>) -> Self {
        self.task = Some(Arc::from(task.as_ref()));
        self
    }

    /// Attaches a subject id.
    #[inline]
    pub fn with_subject(mut self, subject: impl AsRef<str>) -> Self {
        self.subject = Some(Arc::from(subject.as_ref()));
        self
    }

    /// Attaches an observer id.
    #[inline]
    pub fn with_observer(mut self, observer: ObserverId) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Attaches an attempt number.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(d.as_millis().min(u128::from(u64::MAX)) as u64);
        self
    }

    /// Attaches a short reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl AsRef<str>) -> Self {
        self.reason = Some(Arc::from(reason.as_ref()));
        self
    }

    /// Attaches a human-readable detail.
    #[inline]
    pub fn with_detail(mut self, detail: impl AsRef<str>) -> Self {
        self.detail = Some(Arc::from(detail.as_ref()));
        self
    }

    /// Attaches a counter value.
    #[inline]
    pub fn with_count(mut self, n: usize) -> Self {
        self.count = Some(n);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_task(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_reason(info)
    }

    /// Returns `true` for events ending a task execution.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            EventKind::TaskCompleted | EventKind::TaskFailed | EventKind::TaskCancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_monotonic() {
        let a = Event::new(EventKind::TaskSubmitted);
        let b = Event::new(EventKind::TaskSubmitted);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_terminal_kinds() {
        assert!(Event::new(EventKind::TaskCancelled).is_terminal());
        assert!(!Event::new(EventKind::RetryScheduled).is_terminal());
    }
}
