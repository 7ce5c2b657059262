//! # ExecutionActor: drives one task execution to a terminal state.
//!
//! ## Attempt loop
//! ```text
//! loop {
//!   ├─► cancelled? → cancelled
//!   ├─► running (attempt n) ──► work.run(ctx)
//!   ├─► cancelled meanwhile? → cancelled (outcome discarded)
//!   ├─► Ok(result)            → completed
//!   └─► Err(e) classify
//!         ├─► Cancelled       → cancelled
//!         ├─► Fatal           → failed
//!         └─► Transient
//!               ├─► budget spent → failed
//!               └─► retrying(delay) ──► sleep | cancelled → cancelled
//! }
//! ```
//!
//! ## Rules
//! - Attempts run **sequentially**; at most one in flight per execution.
//! - A scheduled retry is preempted immediately by cancellation; a running attempt
//!   is allowed to finish and its outcome is then recorded as `cancelled`.
//! - Every state change is published both as a `task_update` (to observers) and as
//!   a diagnostic event (to the bus). Nothing is published after a terminal state.
//! - The attempt's contexts are closed as soon as `work.run` returns, so clones kept
//!   by helper tasks cannot report into a later attempt or after the outcome.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::engine::snapshot::{AttemptError, TaskSnapshot};
use crate::error::TaskError;
use crate::events::{Bus, Event, EventKind};
use crate::hub::UpdateSink;
use crate::ids::{SubjectId, TaskId};
use crate::policies::{FailureClass, RetryPolicy};
use crate::tasks::{AttemptContext, WorkRef};
use crate::updates::{TaskStatus, TaskUpdate};

pub(crate) struct ExecutionActor {
    pub(crate) task_id: TaskId,
    pub(crate) subject: SubjectId,
    pub(crate) work: WorkRef,
    pub(crate) policy: RetryPolicy,
    pub(crate) sink: Arc<dyn UpdateSink>,
    pub(crate) bus: Bus,
    pub(crate) state: Arc<watch::Sender<TaskSnapshot>>,
}

impl ExecutionActor {
    /// Runs attempts until a terminal state and returns it.
    pub(crate) async fn run(self, token: CancellationToken) -> TaskStatus {
        let mut attempt: u32 = 0;
        let mut retries_used: u32 = 0;

        loop {
            if token.is_cancelled() {
                return self.cancelled(attempt);
            }

            attempt += 1;
            self.transition(TaskStatus::Running, |s| {
                s.attempts = attempt;
                s.next_retry_at = None;
            });
            self.emit(self.update(TaskStatus::Running, attempt));
            self.bus
                .publish(self.event(EventKind::AttemptStarting).with_attempt(attempt));

            let (ctx, guard) = AttemptContext::open(
                self.task_id.clone(),
                self.subject.clone(),
                attempt,
                &token,
                Arc::clone(&self.sink),
            );
            let res = self.work.run(ctx).await;
            drop(guard);

            if token.is_cancelled() {
                return self.cancelled(attempt);
            }

            let err = match res {
                Ok(value) => return self.completed(attempt, value),
                Err(err) => err,
            };

            match self.policy.classify(&err) {
                FailureClass::Cancelled => return self.cancelled(attempt),
                FailureClass::Fatal => return self.failed(attempt, &err),
                FailureClass::Transient => {}
            }

            let Some(delay) = self.policy.next_delay(retries_used) else {
                return self.failed(attempt, &err);
            };
            retries_used += 1;
            self.retrying(attempt, &err, delay);

            tokio::select! {
                biased;
                _ = token.cancelled() => return self.cancelled(attempt),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn completed(&self, attempt: u32, value: Value) -> TaskStatus {
        self.transition(TaskStatus::Completed, |s| s.result = Some(value.clone()));
        self.emit(self.update(TaskStatus::Completed, attempt).with_result(value));
        self.bus
            .publish(self.event(EventKind::TaskCompleted).with_attempt(attempt));
        TaskStatus::Completed
    }

    fn retrying(&self, attempt: u32, err: &TaskError, delay: Duration) {
        self.record_failure(attempt, err);
        let due = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d));
        self.transition(TaskStatus::Retrying, |s| s.next_retry_at = due);
        self.emit(
            self.update(TaskStatus::Retrying, attempt)
                .with_delay(delay)
                .with_error(err.as_message()),
        );
        self.bus.publish(
            self.event(EventKind::RetryScheduled)
                .with_attempt(attempt)
                .with_delay(delay)
                .with_reason(err.as_label()),
        );
    }

    fn failed(&self, attempt: u32, err: &TaskError) -> TaskStatus {
        self.record_failure(attempt, err);
        self.transition(TaskStatus::Failed, |_| {});
        self.emit(
            self.update(TaskStatus::Failed, attempt)
                .with_error(err.as_message()),
        );
        self.bus.publish(
            self.event(EventKind::TaskFailed)
                .with_attempt(attempt)
                .with_reason(err.as_label())
                .with_detail(err.as_message()),
        );
        TaskStatus::Failed
    }

    fn cancelled(&self, attempt: u32) -> TaskStatus {
        self.transition(TaskStatus::Cancelled, |s| s.next_retry_at = None);
        let mut update = TaskUpdate::new(self.subject.clone(), self.task_id.clone(), TaskStatus::Cancelled);
        if attempt > 0 {
            update = update.with_attempt(attempt);
        }
        self.emit(update);
        self.bus
            .publish(self.event(EventKind::TaskCancelled).with_attempt(attempt));
        TaskStatus::Cancelled
    }

    fn record_failure(&self, attempt: u32, err: &TaskError) {
        let message = err.as_message();
        self.state.send_modify(|s| {
            s.last_error = Some(message.clone());
            s.errors.push(AttemptError {
                attempt,
                label: err.as_label().to_string(),
                message,
                at: Utc::now(),
            });
        });
        self.bus.publish(
            self.event(EventKind::AttemptFailed)
                .with_attempt(attempt)
                .with_reason(err.as_label())
                .with_detail(err.as_message()),
        );
    }

    fn transition(&self, next: TaskStatus, f: impl FnOnce(&mut TaskSnapshot)) {
        self.state.send_modify(|s| {
            if !s.state.can_transition_to(next) {
                error!(task = %self.task_id, from = s.state.as_str(), to = next.as_str(), "illegal task transition");
                return;
            }
            s.state = next;
            s.updated_at = Utc::now();
            f(s);
        });
    }

    fn update(&self, status: TaskStatus, attempt: u32) -> TaskUpdate {
        TaskUpdate::new(self.subject.clone(), self.task_id.clone(), status).with_attempt(attempt)
    }

    fn emit(&self, update: TaskUpdate) {
        self.sink.publish(&self.subject, update.into());
    }

    fn event(&self, kind: EventKind) -> Event {
        Event::new(kind)
            .with_task(&self.task_id)
            .with_subject(&self.subject)
    }
}
