//! # LogWriter: renders diagnostic events through `tracing`.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO  attempt starting task="t-1" subject="agent-7" attempt=1
//! WARN  retry scheduled task="t-1" subject="agent-7" attempt=1 delay_ms=1000 reason="connection"
//! INFO  task completed task="t-1" subject="agent-7" attempt=2
//! WARN  observer evicted subject="agent-7" observer=6f1c...
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let task = e.task.as_deref().unwrap_or("-");
        let subject = e.subject.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::TaskSubmitted => debug!(task, subject, "task submitted"),
            EventKind::AttemptStarting => info!(task, subject, attempt = ?e.attempt, "attempt starting"),
            EventKind::AttemptFailed => warn!(
                task, subject, attempt = ?e.attempt, reason,
                detail = e.detail.as_deref().unwrap_or(""),
                "attempt failed"
            ),
            EventKind::RetryScheduled => warn!(
                task, subject, attempt = ?e.attempt, delay_ms = ?e.delay_ms, reason,
                "retry scheduled"
            ),
            EventKind::TaskCompleted => info!(task, subject, attempt = ?e.attempt, "task completed"),
            EventKind::TaskFailed => error!(
                task, subject, attempt = ?e.attempt, reason,
                detail = e.detail.as_deref().unwrap_or(""),
                "task failed"
            ),
            EventKind::TaskCancelled => info!(task, subject, attempt = ?e.attempt, "task cancelled"),
            EventKind::ObserverConnected => {
                info!(subject, observer = ?e.observer, backlog = ?e.count, "observer connected")
            }
            EventKind::ObserverDisconnected => info!(subject, observer = ?e.observer, "observer disconnected"),
            EventKind::ObserverSendFailed => {
                warn!(subject, observer = ?e.observer, reason, "observer send failed")
            }
            EventKind::ObserverEvicted => warn!(subject, observer = ?e.observer, "observer evicted"),
            EventKind::QueueOverflow => warn!(subject, len = ?e.count, "offline queue overflow"),
            EventKind::SubscriberPanicked => error!(subscriber = task, info = reason, "subscriber panicked"),
            EventKind::SubscriberOverflow => {
                warn!(subscriber = task, reason, dropped = ?e.count, "subscriber overflow")
            }
            EventKind::ShutdownRequested => info!("shutdown requested"),
            EventKind::AllStoppedWithin => info!("all executions stopped within grace"),
            EventKind::GraceExceeded => error!("grace exceeded"),
        }
    }

    fn name(&self) -> &'static str {
        "log_writer"
    }
}
