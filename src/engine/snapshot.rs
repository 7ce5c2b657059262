use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::ids::{SubjectId, TaskId};
use crate::updates::TaskStatus;

/// One failed attempt in an execution's error history.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AttemptError {
    /// Attempt number (1-based).
    pub attempt: u32,
    /// Error label (see [`TaskError::as_label`](crate::TaskError::as_label)).
    pub label: String,
    /// Error message.
    pub message: String,
    /// When the attempt failed.
    pub at: DateTime<Utc>,
}

/// Point-in-time view of a task execution.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaskSnapshot {
    /// Execution id.
    pub task_id: TaskId,
    /// Subject the execution reports to.
    pub subject: SubjectId,
    /// Current state.
    pub state: TaskStatus,
    /// Attempts started so far.
    pub attempts: u32,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
    /// When the next attempt is due (`retrying` only).
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Every failed attempt, oldest first.
    pub errors: Vec<AttemptError>,
    /// Final result (`completed` only).
    pub result: Option<Value>,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// Time of the last state change.
    pub updated_at: DateTime<Utc>,
}

impl TaskSnapshot {
    pub(crate) fn pending(task_id: TaskId, subject: SubjectId) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            subject,
            state: TaskStatus::Pending,
            attempts: 0,
            last_error: None,
            next_retry_at: None,
            errors: Vec::new(),
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns `true` once the execution reached a final state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
