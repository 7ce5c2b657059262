//! # Execution state as reported to observers.
//!
//! [`TaskStatus`] is also the state machine of a task execution:
//!
//! ```text
//! pending ──► running ──► completed
//!                │  ├───► failed
//!                │  └───► retrying ──► running
//!                ▼
//!            cancelled   (from any non-terminal state)
//! ```

use serde::{Deserialize, Serialize};

use crate::ids::TaskId;

/// State of a task execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Submitted, first attempt not started yet.
    Pending,
    /// An attempt is in flight.
    Running,
    /// Last attempt failed transiently; next attempt is scheduled.
    Retrying,
    /// Finished successfully (terminal).
    Completed,
    /// Failed fatally or exhausted its retries (terminal).
    Failed,
    /// Cancelled on request (terminal).
    Cancelled,
}

impl TaskStatus {
    /// Returns `true` for `completed`, `failed` and `cancelled`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Returns whether the state machine allows `self → next`.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (Pending, Running) => true,
            (Running, Completed | Retrying | Failed) => true,
            (Retrying, Running) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Returns the wire name (`"running"`, `"failed"`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Retrying => "retrying",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

/// `execution_status` payload of a `status_update` message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStatus {
    /// Current execution state.
    pub state: TaskStatus,
    /// Task the status refers to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    /// Progress in percent (`0.0..=100.0`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// Free-form progress message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ExecutionStatus {
    /// Creates a status with only the state set.
    pub fn new(state: TaskStatus) -> Self {
        Self {
            state,
            task_id: None,
            progress: None,
            message: None,
        }
    }

    /// Attaches the task id.
    pub fn with_task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    /// Attaches a progress value (clamped to `0..=100`).
    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress.clamp(0.0, 100.0));
        self
    }

    /// Attaches a message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Cancelled] {
            for next in [
                TaskStatus::Pending,
                TaskStatus::Running,
                TaskStatus::Retrying,
                TaskStatus::Completed,
                TaskStatus::Failed,
                TaskStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next), "{terminal:?} -> {next:?}");
            }
        }
    }

    #[test]
    fn test_retry_cycle_is_allowed() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Retrying));
        assert!(TaskStatus::Retrying.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Retrying.can_transition_to(TaskStatus::Cancelled));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Retrying.can_transition_to(TaskStatus::Failed));
    }
}
