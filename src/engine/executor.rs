//! # Execution engine.
//!
//! [`Engine`] accepts [`Submission`]s, runs each one in its own
//! [`ExecutionActor`](crate::engine::actor::ExecutionActor) and tracks live executions
//! by task id.
//!
//! ## Architecture
//! ```text
//! submit(submission)
//!     ├─► duplicate / closed? → SubmitError
//!     ├─► insert Execution { token, state, join }
//!     └─► tokio::spawn(actor.run(child token)) ──► removes its own entry when terminal
//!
//! cancel(task_id) ──► token.cancel()
//! shutdown(grace) ──► cancel all ──► join within grace ──► abort the rest
//!                                                          └─► mark them cancelled
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::actor::ExecutionActor;
use crate::engine::handle::ExecutionHandle;
use crate::engine::snapshot::TaskSnapshot;
use crate::error::{RuntimeError, SubmitError};
use crate::events::{Bus, Event, EventKind};
use crate::hub::UpdateSink;
use crate::ids::{SubjectId, TaskId};
use crate::policies::RetryPolicy;
use crate::tasks::Submission;
use crate::updates::{TaskStatus, TaskUpdate};

struct Execution {
    generation: u64,
    subject: SubjectId,
    token: CancellationToken,
    state: watch::Receiver<TaskSnapshot>,
    publisher: Arc<watch::Sender<TaskSnapshot>>,
    join: Option<JoinHandle<()>>,
}

struct Inner {
    executions: DashMap<TaskId, Execution>,
    sink: Arc<dyn UpdateSink>,
    bus: Bus,
    policy: RetryPolicy,
    token: CancellationToken,
    closed: AtomicBool,
    generation: AtomicU64,
}

/// Runs submitted work with retries and reports progress to an [`UpdateSink`].
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    /// Creates an engine with a default retry policy.
    pub fn new(policy: RetryPolicy, sink: Arc<dyn UpdateSink>, bus: Bus) -> Self {
        Self {
            inner: Arc::new(Inner {
                executions: DashMap::new(),
                sink,
                bus,
                policy,
                token: CancellationToken::new(),
                closed: AtomicBool::new(false),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Starts an execution. Never blocks; must be called inside a tokio runtime.
    ///
    /// ### Errors
    /// - [`SubmitError::Duplicate`] if a live execution has the same task id
    /// - [`SubmitError::Closed`] after [`shutdown`](Self::shutdown)
    pub fn submit(&self, submission: Submission) -> Result<ExecutionHandle, SubmitError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(SubmitError::Closed);
        }
        let (work, subject, task_id, retry) = submission.into_parts();
        let task_id = task_id.unwrap_or_else(TaskId::generate);
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        let token = self.inner.token.child_token();
        let (state_tx, state_rx) = watch::channel(TaskSnapshot::pending(task_id.clone(), subject.clone()));
        let state_tx = Arc::new(state_tx);

        match self.inner.executions.entry(task_id.clone()) {
            Entry::Occupied(_) => return Err(SubmitError::Duplicate(task_id.to_string())),
            Entry::Vacant(v) => {
                v.insert(Execution {
                    generation,
                    subject: subject.clone(),
                    token: token.clone(),
                    state: state_rx.clone(),
                    publisher: Arc::clone(&state_tx),
                    join: None,
                });
            }
        }

        debug!(task = %task_id, subject = %subject, work = work.name(), "task submitted");
        self.inner.bus.publish(
            Event::new(EventKind::TaskSubmitted)
                .with_task(&task_id)
                .with_subject(&subject),
        );

        let actor = ExecutionActor {
            task_id: task_id.clone(),
            subject,
            work,
            policy: retry.unwrap_or_else(|| self.inner.policy.clone()),
            sink: Arc::clone(&self.inner.sink),
            bus: self.inner.bus.clone(),
            state: state_tx,
        };
        let inner = Arc::clone(&self.inner);
        let id = task_id.clone();
        let actor_token = token.clone();
        let join = tokio::spawn(async move {
            actor.run(actor_token).await;
            inner
                .executions
                .remove_if(&id, |_, e| e.generation == generation);
        });

        if let Some(mut e) = self.inner.executions.get_mut(&task_id) {
            if e.generation == generation {
                e.join = Some(join);
            }
        }

        Ok(ExecutionHandle::new(task_id, state_rx, token))
    }

    /// Requests cancellation of a live execution. Returns `false` if none was found.
    pub fn cancel(&self, task_id: &TaskId) -> bool {
        match self.inner.executions.get(task_id) {
            Some(e) => {
                e.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Returns the current snapshot of a live execution.
    pub fn status(&self, task_id: &TaskId) -> Option<TaskSnapshot> {
        self.inner
            .executions
            .get(task_id)
            .map(|e| e.state.borrow().clone())
    }

    /// Returns the ids of all live executions, sorted.
    pub fn active(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self
            .inner
            .executions
            .iter()
            .map(|e| e.key().clone())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) was called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Stops accepting work, cancels every execution and waits up to `grace` for them.
    ///
    /// Executions still running after `grace` are aborted, marked `cancelled` (with a
    /// final `task_update`) and reported in [`RuntimeError::GraceExceeded`].
    pub async fn shutdown(&self, grace: Duration) -> Result<(), RuntimeError> {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.token.cancel();

        let joins: Vec<(TaskId, JoinHandle<()>)> = self
            .inner
            .executions
            .iter_mut()
            .filter_map(|mut e| {
                let id = e.key().clone();
                e.join.take().map(|j| (id, j))
            })
            .collect();

        let deadline = tokio::time::Instant::now() + grace;
        let mut stuck = Vec::new();
        for (id, mut join) in joins {
            if tokio::time::timeout_at(deadline, &mut join).await.is_err() {
                join.abort();
                let _ = join.await;
                if self.abandon(&id) {
                    stuck.push(id.to_string());
                }
            }
        }

        if stuck.is_empty() {
            Ok(())
        } else {
            stuck.sort_unstable();
            warn!(?grace, ?stuck, "executions did not stop within grace");
            Err(RuntimeError::GraceExceeded { grace, stuck })
        }
    }

    /// Moves an aborted execution to `cancelled` and publishes its terminal update.
    ///
    /// Returns `false` if it was gone or already terminal.
    fn abandon(&self, task_id: &TaskId) -> bool {
        let Some((_, exec)) = self.inner.executions.remove(task_id) else {
            return false;
        };
        let mut attempt = 0;
        let moved = exec.publisher.send_if_modified(|s| {
            if s.state.is_terminal() {
                return false;
            }
            attempt = s.attempts;
            s.state = TaskStatus::Cancelled;
            s.next_retry_at = None;
            s.updated_at = Utc::now();
            true
        });
        if !moved {
            return false;
        }

        let mut update = TaskUpdate::new(exec.subject.clone(), task_id.clone(), TaskStatus::Cancelled);
        if attempt > 0 {
            update = update.with_attempt(attempt);
        }
        self.inner.sink.publish(&exec.subject, update.into());
        self.inner.bus.publish(
            Event::new(EventKind::TaskCancelled)
                .with_task(task_id)
                .with_subject(&exec.subject)
                .with_attempt(attempt),
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use crate::hub::testing::RecordingSink;
    use crate::policies::BackoffPolicy;
    use crate::tasks::{AttemptContext, Work, WorkFn};
    use crate::updates::{TaskStatus, TaskUpdate};
    use serde_json::{Value, json};
    use std::sync::atomic::AtomicU32;

    fn policy(max_retries: u32, base: u64, max: u64) -> RetryPolicy {
        RetryPolicy::new(
            max_retries,
            BackoffPolicy {
                base: Duration::from_secs(base),
                max: Duration::from_secs(max),
                ..BackoffPolicy::default()
            },
        )
    }

    fn engine(policy: RetryPolicy) -> (Engine, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (Engine::new(policy, sink.clone(), Bus::new(64)), sink)
    }

    /// Work failing transiently `failures` times, then succeeding.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl Work for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn run(&self, _ctx: AttemptContext) -> Result<Value, TaskError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(TaskError::kind("connection", format!("reset #{n}")))
            } else {
                Ok(json!({"attempts": n + 1}))
            }
        }
    }

    fn flaky(failures: u32) -> Arc<Flaky> {
        Arc::new(Flaky {
            failures,
            calls: AtomicU32::new(0),
        })
    }

    fn statuses(updates: &[TaskUpdate]) -> Vec<TaskStatus> {
        updates.iter().map(|u| u.status).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_completes_with_backoff_delays() {
        let (engine, sink) = engine(policy(3, 1, 10));
        let handle = engine
            .submit(Submission::new("agent", flaky(3)).with_task_id("t1"))
            .unwrap();

        let snap = handle.wait().await;
        assert_eq!(snap.state, TaskStatus::Completed);
        assert_eq!(snap.attempts, 4);
        assert_eq!(snap.errors.len(), 3);
        assert_eq!(snap.errors[0].label, "connection");
        assert_eq!(snap.result, Some(json!({"attempts": 4})));

        let updates = sink.task_updates();
        let delays: Vec<u64> = updates.iter().filter_map(|u| u.delay_ms).collect();
        assert_eq!(delays, vec![1000, 2000, 4000]);

        let last = updates.last().unwrap();
        assert_eq!(last.status, TaskStatus::Completed);
        assert_eq!(last.attempt, Some(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_makes_r_plus_one_attempts() {
        let (engine, sink) = engine(policy(2, 1, 10));
        let handle = engine
            .submit(Submission::new("agent", flaky(u32::MAX)))
            .unwrap();

        let snap = handle.wait().await;
        assert_eq!(snap.state, TaskStatus::Failed);
        assert_eq!(snap.attempts, 3);

        tokio::time::sleep(Duration::from_secs(60)).await;
        let updates = sink.task_updates();
        assert_eq!(
            statuses(&updates),
            vec![
                TaskStatus::Running,
                TaskStatus::Retrying,
                TaskStatus::Running,
                TaskStatus::Retrying,
                TaskStatus::Running,
                TaskStatus::Failed,
            ]
        );
        let failed = updates.last().unwrap();
        assert_eq!(failed.error.as_deref(), Some("reset #2"));
        assert!(engine.active().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_fails_immediately() {
        let (engine, sink) = engine(policy(5, 1, 10));
        let work = WorkFn::arc("bad", |_ctx: AttemptContext| async {
            Err::<Value, _>(TaskError::kind("validation", "bad input"))
        });
        let snap = engine
            .submit(Submission::new("agent", work))
            .unwrap()
            .wait()
            .await;

        assert_eq!(snap.state, TaskStatus::Failed);
        assert_eq!(snap.attempts, 1);
        assert_eq!(
            statuses(&sink.task_updates()),
            vec![TaskStatus::Running, TaskStatus::Failed]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_is_immediate_and_final() {
        let (engine, sink) = engine(policy(5, 10, 30));
        let handle = engine
            .submit(Submission::new("agent", flaky(u32::MAX)).with_task_id("t1"))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(engine.status(&"t1".into()).unwrap().state, TaskStatus::Retrying);
        assert!(engine.cancel(&"t1".into()));

        let snap = handle.wait().await;
        assert_eq!(snap.state, TaskStatus::Cancelled);
        assert_eq!(snap.attempts, 1);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(
            statuses(&sink.task_updates()),
            vec![TaskStatus::Running, TaskStatus::Retrying, TaskStatus::Cancelled]
        );
        assert!(!engine.cancel(&"t1".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_running_discards_outcome() {
        let (engine, sink) = engine(policy(0, 1, 10));
        let work = WorkFn::arc("slow", |ctx: AttemptContext| async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            ctx.report_progress(90.0, None);
            Ok::<_, TaskError>(json!("done"))
        });
        let handle = engine
            .submit(Submission::new("agent", work).with_task_id("t1"))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.cancel();
        let snap = handle.wait().await;

        assert_eq!(snap.state, TaskStatus::Cancelled);
        assert!(snap.result.is_none());
        assert_eq!(
            statuses(&sink.task_updates()),
            vec![TaskStatus::Running, TaskStatus::Cancelled]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_and_closed_submissions_rejected() {
        let (engine, _sink) = engine(policy(0, 1, 10));
        let work = WorkFn::arc("wait", |ctx: AttemptContext| async move {
            ctx.cancelled().await;
            Err::<Value, _>(TaskError::Canceled)
        });

        engine
            .submit(Submission::new("agent", work.clone()).with_task_id("t1"))
            .unwrap();
        let dup = engine
            .submit(Submission::new("agent", work.clone()).with_task_id("t1"))
            .unwrap_err();
        assert_eq!(dup, SubmitError::Duplicate("t1".into()));
        assert_eq!(engine.active(), vec![TaskId::from("t1")]);

        engine.shutdown(Duration::from_secs(1)).await.unwrap();
        assert!(engine.is_closed());
        assert_eq!(
            engine.submit(Submission::new("agent", work)).unwrap_err(),
            SubmitError::Closed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_reports_stuck_executions() {
        let (engine, sink) = engine(policy(0, 1, 10));
        let stubborn = WorkFn::arc("stubborn", |_ctx: AttemptContext| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<_, TaskError>(Value::Null)
        });
        let handle = engine
            .submit(Submission::new("agent", stubborn).with_task_id("stuck"))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let err = engine.shutdown(Duration::from_secs(2)).await.unwrap_err();
        match err {
            RuntimeError::GraceExceeded { stuck, .. } => assert_eq!(stuck, vec!["stuck".to_string()]),
        }

        let snap = handle.wait().await;
        assert_eq!(snap.state, TaskStatus::Cancelled);
        assert!(engine.active().is_empty());
        let updates = sink.task_updates();
        assert_eq!(statuses(&updates), vec![TaskStatus::Running, TaskStatus::Cancelled]);
        assert_eq!(updates[1].attempt, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_leaked_context_cannot_report_after_outcome() {
        let (engine, sink) = engine(policy(1, 1, 10));
        let calls = Arc::new(AtomicU32::new(0));
        let work = WorkFn::arc("leaky", move |ctx: AttemptContext| {
            let calls = Arc::clone(&calls);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                let kept = ctx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    kept.report_progress(50.0, Some("late"));
                });
                if n == 0 {
                    Err(TaskError::kind("timeout", "slow"))
                } else {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    Ok(json!("done"))
                }
            }
        });

        let snap = engine
            .submit(Submission::new("agent", work))
            .unwrap()
            .wait()
            .await;
        assert_eq!(snap.state, TaskStatus::Completed);

        tokio::time::sleep(Duration::from_secs(10)).await;
        let updates = sink.task_updates();
        assert_eq!(
            statuses(&updates),
            vec![
                TaskStatus::Running,
                TaskStatus::Retrying,
                TaskStatus::Running,
                TaskStatus::Running,
                TaskStatus::Completed,
            ]
        );
        assert_eq!(updates[3].attempt, Some(2));
        assert_eq!(updates[3].message.as_deref(), Some("late"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_id_can_be_resubmitted_after_terminal() {
        let (engine, _sink) = engine(policy(0, 1, 10));
        let ok = WorkFn::arc("ok", |_ctx: AttemptContext| async { Ok::<_, TaskError>(Value::Null) });

        let first = engine
            .submit(Submission::new("agent", ok.clone()).with_task_id("t1"))
            .unwrap();
        first.wait().await;
        tokio::task::yield_now().await;

        let second = engine
            .submit(Submission::new("agent", ok).with_task_id("t1"))
            .unwrap();
        assert_eq!(second.wait().await.state, TaskStatus::Completed);
    }
}
