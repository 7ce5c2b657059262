//! # Server → client update messages.
//!
//! [`Update`] is a tagged enum; serde writes the variant as the `type` field:
//!
//! ```text
//! {"type":"connection_established","agent_id":"a1","timestamp":"..."}
//! {"type":"task_update","agent_id":"a1","task_id":"t1","status":"retrying","attempt":1,"delay_ms":1000,"error":"...","timestamp":"..."}
//! {"type":"batch_update","agent_id":"a1","updates":[...],"timestamp":"..."}
//! {"type":"ping","timestamp":"..."}
//! ```
//!
//! Updates are immutable once created; the builders below consume `self`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{SubjectId, TaskId};
use crate::updates::status::{ExecutionStatus, TaskStatus};

/// Message delivered to an observer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Update {
    /// Handshake sent once when an observer connects.
    ConnectionEstablished {
        agent_id: SubjectId,
        timestamp: DateTime<Utc>,
    },
    /// Coarse status of the subject.
    StatusUpdate {
        agent_id: SubjectId,
        status: String,
        execution_status: ExecutionStatus,
        timestamp: DateTime<Utc>,
    },
    /// Progress or outcome of one task execution.
    TaskUpdate(TaskUpdate),
    /// Several updates coalesced into one delivery, in publish order.
    BatchUpdate {
        agent_id: SubjectId,
        updates: Vec<Update>,
        timestamp: DateTime<Utc>,
    },
    /// Liveness probe.
    Ping { timestamp: DateTime<Utc> },
    /// Reply to a client `ping`.
    Pong { timestamp: DateTime<Utc> },
}

impl Update {
    /// Creates a `connection_established` handshake.
    pub fn connection_established(subject: SubjectId) -> Self {
        Update::ConnectionEstablished {
            agent_id: subject,
            timestamp: Utc::now(),
        }
    }

    /// Creates a `status_update`.
    pub fn status(
        subject: SubjectId,
        status: impl Into<String>,
        execution_status: ExecutionStatus,
    ) -> Self {
        Update::StatusUpdate {
            agent_id: subject,
            status: status.into(),
            execution_status,
            timestamp: Utc::now(),
        }
    }

    /// Creates a `batch_update` wrapping `updates` in order.
    pub fn batch(subject: SubjectId, updates: Vec<Update>) -> Self {
        Update::BatchUpdate {
            agent_id: subject,
            updates,
            timestamp: Utc::now(),
        }
    }

    /// Creates a `ping`.
    pub fn ping() -> Self {
        Update::Ping {
            timestamp: Utc::now(),
        }
    }

    /// Creates a `pong`.
    pub fn pong() -> Self {
        Update::Pong {
            timestamp: Utc::now(),
        }
    }

    /// Returns the wire `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Update::ConnectionEstablished { .. } => "connection_established",
            Update::StatusUpdate { .. } => "status_update",
            Update::TaskUpdate(_) => "task_update",
            Update::BatchUpdate { .. } => "batch_update",
            Update::Ping { .. } => "ping",
            Update::Pong { .. } => "pong",
        }
    }

    /// Returns the subject the update belongs to, if any.
    pub fn subject(&self) -> Option<&SubjectId> {
        match self {
            Update::ConnectionEstablished { agent_id, .. }
            | Update::StatusUpdate { agent_id, .. }
            | Update::BatchUpdate { agent_id, .. } => Some(agent_id),
            Update::TaskUpdate(t) => Some(&t.agent_id),
            Update::Ping { .. } | Update::Pong { .. } => None,
        }
    }

    /// Returns the creation timestamp.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Update::ConnectionEstablished { timestamp, .. }
            | Update::StatusUpdate { timestamp, .. }
            | Update::BatchUpdate { timestamp, .. }
            | Update::Ping { timestamp }
            | Update::Pong { timestamp } => *timestamp,
            Update::TaskUpdate(t) => t.timestamp,
        }
    }

    /// Returns the inner updates of a `batch_update`.
    pub fn batch_items(&self) -> Option<&[Update]> {
        match self {
            Update::BatchUpdate { updates, .. } => Some(updates),
            _ => None,
        }
    }

    /// Returns the payload of a `task_update`.
    pub fn as_task_update(&self) -> Option<&TaskUpdate> {
        match self {
            Update::TaskUpdate(t) => Some(t),
            _ => None,
        }
    }
}

impl From<TaskUpdate> for Update {
    fn from(t: TaskUpdate) -> Self {
        Update::TaskUpdate(t)
    }
}

/// Payload of a `task_update` message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    /// Subject the task belongs to.
    pub agent_id: SubjectId,
    /// Task execution id.
    pub task_id: TaskId,
    /// Execution state after this update.
    pub status: TaskStatus,
    /// Progress in percent, when reported by the work.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// Free-form message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Final result (`completed` only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure description (`retrying` / `failed`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Attempt number (1-based) the update refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    /// Scheduled delay before the next attempt in milliseconds (`retrying` only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl TaskUpdate {
    /// Creates an update with only the status set.
    pub fn new(subject: SubjectId, task_id: TaskId, status: TaskStatus) -> Self {
        Self {
            agent_id: subject,
            task_id,
            status,
            progress: None,
            message: None,
            result: None,
            error: None,
            attempt: None,
            delay_ms: None,
            timestamp: Utc::now(),
        }
    }

    /// Attaches a progress value (clamped to `0..=100`).
    #[inline]
    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress.clamp(0.0, 100.0));
        self
    }

    /// Attaches a message.
    #[inline]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attaches the final result.
    #[inline]
    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    /// Attaches an error description.
    #[inline]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Attaches the attempt number.
    #[inline]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    /// Attaches the retry delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = Some(delay.as_millis().min(u128::from(u64::MAX)) as u64);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_update_wire_shape() {
        let update: Update = TaskUpdate::new("a1".into(), "t1".into(), TaskStatus::Retrying)
            .with_attempt(1)
            .with_delay(Duration::from_secs(2))
            .with_error("connection reset")
            .into();

        let v = serde_json::to_value(&update).unwrap();
        assert_eq!(v["type"], "task_update");
        assert_eq!(v["agent_id"], "a1");
        assert_eq!(v["task_id"], "t1");
        assert_eq!(v["status"], "retrying");
        assert_eq!(v["delay_ms"], 2000);
        assert_eq!(v["error"], "connection reset");
        assert!(v.get("result").is_none());
        assert!(v["timestamp"].as_str().is_some());
    }

    #[test]
    fn test_batch_nests_updates_in_order() {
        let subject = SubjectId::from("a1");
        let batch = Update::batch(
            subject.clone(),
            vec![
                Update::status(
                    subject.clone(),
                    "working",
                    ExecutionStatus::new(TaskStatus::Running).with_progress(50.0),
                ),
                TaskUpdate::new(subject, "t1".into(), TaskStatus::Completed)
                    .with_result(json!({"answer": 42}))
                    .into(),
            ],
        );

        let v = serde_json::to_value(&batch).unwrap();
        assert_eq!(v["type"], "batch_update");
        assert_eq!(v["updates"][0]["type"], "status_update");
        assert_eq!(v["updates"][0]["execution_status"]["state"], "running");
        assert_eq!(v["updates"][0]["execution_status"]["progress"], 50.0);
        assert_eq!(v["updates"][1]["result"]["answer"], 42);

        let back: Update = serde_json::from_value(v).unwrap();
        assert_eq!(back, batch);
    }

    #[test]
    fn test_ping_has_no_subject() {
        let ping = Update::ping();
        assert_eq!(ping.kind(), "ping");
        assert!(ping.subject().is_none());
        assert_eq!(serde_json::to_value(&ping).unwrap()["type"], "ping");
    }
}
