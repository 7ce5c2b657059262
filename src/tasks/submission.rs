use crate::ids::{SubjectId, TaskId};
use crate::policies::RetryPolicy;
use crate::tasks::work_fn::WorkRef;

/// Request to run a unit of work on behalf of a subject.
///
/// Bundles together:
/// - the work itself ([`WorkRef`])
/// - the subject whose observers receive its updates
/// - an optional task id (generated when absent)
/// - an optional retry policy (the engine default when absent)
///
/// ## Example
/// ```rust
/// use serde_json::Value;
/// use taskpulse::{AttemptContext, BackoffPolicy, RetryPolicy, Submission, TaskError, WorkFn};
///
/// let work = WorkFn::arc("sync", |_ctx: AttemptContext| async { Ok::<_, TaskError>(Value::Null) });
/// let sub = Submission::new("agent-1", work)
///     .with_task_id("sync-42")
///     .with_retry(RetryPolicy::new(5, BackoffPolicy::default()));
///
/// assert_eq!(sub.subject().as_str(), "agent-1");
/// assert_eq!(sub.task_id().map(|t| t.as_str()), Some("sync-42"));
/// ```
#[derive(Clone)]
pub struct Submission {
    work: WorkRef,
    subject: SubjectId,
    task_id: Option<TaskId>,
    retry: Option<RetryPolicy>,
}

impl Submission {
    /// Creates a submission with a generated task id and the engine's retry policy.
    pub fn new(subject: impl Into<SubjectId>, work: WorkRef) -> Self {
        Self {
            work,
            subject: subject.into(),
            task_id: None,
            retry: None,
        }
    }

    /// Uses an explicit task id.
    pub fn with_task_id(mut self, task_id: impl Into<TaskId>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Overrides the retry policy for this execution.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Returns the work.
    pub fn work(&self) -> &WorkRef {
        &self.work
    }

    /// Returns the subject.
    pub fn subject(&self) -> &SubjectId {
        &self.subject
    }

    /// Returns the explicit task id, if any.
    pub fn task_id(&self) -> Option<&TaskId> {
        self.task_id.as_ref()
    }

    /// Returns the retry override, if any.
    pub fn retry(&self) -> Option<&RetryPolicy> {
        self.retry.as_ref()
    }

    pub(crate) fn into_parts(self) -> (WorkRef, SubjectId, Option<TaskId>, Option<RetryPolicy>) {
        (self.work, self.subject, self.task_id, self.retry)
    }
}
