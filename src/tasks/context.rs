//! # Per-attempt context handed to a unit of work.
//!
//! [`AttemptContext`] carries the execution identity, the attempt number, a cancellation
//! token and a way to report intermediate progress to the subject's observers.
//!
//! Contexts are cloneable and may outlive the attempt (a helper task spawned by the
//! work can hold one). Once the attempt returns, the actor drops the [`AttemptGuard`]
//! and every clone goes quiet: a report either lands before the attempt's outcome is
//! published or not at all.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::hub::UpdateSink;
use crate::ids::{SubjectId, TaskId};
use crate::updates::{ExecutionStatus, TaskStatus, TaskUpdate, Update};

/// Context of one attempt.
///
/// Cheap to clone. Progress reports are dropped once cancellation was requested, so a
/// cancelled execution emits nothing but its terminal `cancelled` update.
#[derive(Clone)]
pub struct AttemptContext {
    task_id: TaskId,
    subject: SubjectId,
    attempt: u32,
    token: CancellationToken,
    open: Arc<RwLock<bool>>,
    sink: Arc<dyn UpdateSink>,
}

/// Closes an attempt's contexts when dropped.
pub(crate) struct AttemptGuard {
    token: CancellationToken,
    open: Arc<RwLock<bool>>,
}

impl Drop for AttemptGuard {
    fn drop(&mut self) {
        // Waits for in-flight reports to finish publishing.
        *self.open.write() = false;
        self.token.cancel();
    }
}

impl AttemptContext {
    /// Opens the context of one attempt under the execution's token.
    pub(crate) fn open(
        task_id: TaskId,
        subject: SubjectId,
        attempt: u32,
        parent: &CancellationToken,
        sink: Arc<dyn UpdateSink>,
    ) -> (Self, AttemptGuard) {
        let token = parent.child_token();
        let open = Arc::new(RwLock::new(true));
        let guard = AttemptGuard {
            token: token.clone(),
            open: Arc::clone(&open),
        };
        let ctx = Self {
            task_id,
            subject,
            attempt,
            token,
            open,
            sink,
        };
        (ctx, guard)
    }

    /// Execution id.
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Subject the execution reports to.
    pub fn subject(&self) -> &SubjectId {
        &self.subject
    }

    /// Attempt number, starting at 1.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Cancellation token of this attempt.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns `true` once cancellation was requested or the attempt has returned.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when cancellation is requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Publishes `task_update{status: running, progress, message}`.
    ///
    /// Returns `false` if the report was suppressed because of cancellation or
    /// because the attempt already returned.
    pub fn report_progress(&self, progress: f64, message: Option<&str>) -> bool {
        let open = self.open.read();
        if !*open || self.is_cancelled() {
            return false;
        }
        let mut update = TaskUpdate::new(self.subject.clone(), self.task_id.clone(), TaskStatus::Running)
            .with_attempt(self.attempt)
            .with_progress(progress);
        if let Some(msg) = message {
            update = update.with_message(msg);
        }
        self.sink.publish(&self.subject, update.into());
        true
    }

    /// Publishes a `status_update` describing what the subject is busy with.
    ///
    /// Returns `false` if the report was suppressed because of cancellation or
    /// because the attempt already returned.
    pub fn report_status(&self, status: &str, progress: Option<f64>, message: Option<&str>) -> bool {
        let open = self.open.read();
        if !*open || self.is_cancelled() {
            return false;
        }
        let mut exec = ExecutionStatus::new(TaskStatus::Running).with_task(self.task_id.clone());
        if let Some(p) = progress {
            exec = exec.with_progress(p);
        }
        if let Some(msg) = message {
            exec = exec.with_message(msg);
        }
        self.sink
            .publish(&self.subject, Update::status(self.subject.clone(), status, exec));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::testing::RecordingSink;

    fn ctx(sink: Arc<RecordingSink>, token: &CancellationToken) -> (AttemptContext, AttemptGuard) {
        AttemptContext::open("t1".into(), "a1".into(), 2, token, sink)
    }

    #[test]
    fn test_progress_is_published_as_running_update() {
        let sink = Arc::new(RecordingSink::default());
        let (c, _guard) = ctx(sink.clone(), &CancellationToken::new());
        assert!(c.report_progress(140.0, Some("almost")));

        let updates = sink.task_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].status, TaskStatus::Running);
        assert_eq!(updates[0].progress, Some(100.0));
        assert_eq!(updates[0].attempt, Some(2));
        assert_eq!(updates[0].message.as_deref(), Some("almost"));
    }

    #[test]
    fn test_reports_suppressed_after_cancel() {
        let sink = Arc::new(RecordingSink::default());
        let token = CancellationToken::new();
        let (c, _guard) = ctx(sink.clone(), &token);
        token.cancel();

        assert!(!c.report_progress(10.0, None));
        assert!(!c.report_status("busy", None, None));
        assert!(sink.updates.lock().is_empty());
    }

    #[test]
    fn test_clones_go_quiet_when_guard_drops() {
        let sink = Arc::new(RecordingSink::default());
        let parent = CancellationToken::new();
        let (c, guard) = ctx(sink.clone(), &parent);
        let kept = c.clone();
        assert!(kept.report_progress(10.0, None));

        drop(guard);
        assert!(kept.is_cancelled());
        assert!(!parent.is_cancelled());
        assert!(!kept.report_progress(90.0, None));
        assert!(!c.report_status("late", None, None));
        assert_eq!(sink.updates.lock().len(), 1);
    }

    #[test]
    fn test_status_update_carries_task() {
        let sink = Arc::new(RecordingSink::default());
        let (c, _guard) = ctx(sink.clone(), &CancellationToken::new());
        c.report_status("indexing", Some(30.0), None);

        let recorded = sink.updates.lock();
        match &recorded[0].1 {
            Update::StatusUpdate {
                status,
                execution_status,
                ..
            } => {
                assert_eq!(status, "indexing");
                assert_eq!(execution_status.task_id, Some("t1".into()));
                assert_eq!(execution_status.progress, Some(30.0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
