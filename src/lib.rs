//! # taskpulse
//!
//! **Taskpulse** delivers the progress of long-running, retryable background work to
//! remote observers in near-real-time.
//!
//! It tolerates disconnects (per-subject offline queues), slow consumers (per-observer
//! batching) and dead clients (heartbeat eviction), and ships the retrying execution
//! engine that produces the updates.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   Submission ──► Engine ──► ExecutionActor (one per execution, retry loop)
//!                                 │ task_update (running / retrying / completed / failed / cancelled)
//!                                 ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Registry (per-subject lock)                                       │
//! │  - observers present → BatchBuffer of each observer                │
//! │  - no observer       → OfflineQueue (bounded, oldest evicted)      │
//! │  - Stats (connections, messages, errors, evictions)               │
//! └──────┬──────────────────────────────┬─────────────────────────────┘
//!        ▼                              ▼
//!   dispatcher worker              heartbeat worker        (one each per observer)
//!   batch_update every interval    ping every interval,
//!   or at batch_max_size           evict after 2 × interval
//!        │                              │
//!        └──────────► ObserverSink ◄────┘  (implemented by the transport)
//!
//! Engine / Registry ── Event ──► Bus ──► listener ──► SubscriberSet ──► LogWriter, RetryMetrics, ...
//! ```
//!
//! ### Observer lifecycle
//! ```text
//! connect(subject, sink)
//!   ├─► connection_established
//!   ├─► batch_update([queued updates])   (only if the offline queue was not empty)
//!   └─► batch_update(...) ...             (periodic flushes)
//!
//! disconnect(id) | send failure | silence > 2 × heartbeat_interval
//!   └─► removed exactly once, workers stopped
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                          |
//! |-------------------|---------------------------------------------------------------|---------------------------------------------|
//! | **Delivery**      | Observer registry, offline queues, batching, heartbeats.     | [`Registry`], [`ObserverSink`], [`ChannelSink`] |
//! | **Execution**     | Retrying task executions with state snapshots.                | [`Engine`], [`Submission`], [`Work`], [`WorkFn`] |
//! | **Policies**      | Exponential backoff with jitter, retry classification.        | [`BackoffPolicy`], [`JitterPolicy`], [`RetryPolicy`] |
//! | **Wire messages** | Tagged JSON updates and client messages.                      | [`Update`], [`TaskUpdate`], [`ClientMessage`] |
//! | **Diagnostics**   | Internal events fanned out to subscribers.                    | [`Subscribe`], [`LogWriter`], [`RetryMetrics`] |
//! | **Errors**        | Typed errors with stable labels.                              | [`TaskError`], [`SendError`], [`RuntimeError`] |
//! | **Configuration** | Defaults, JSON / env loading, validation.                     | [`Config`]                                  |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use serde_json::json;
//! use taskpulse::{AttemptContext, ChannelSink, Config, Runtime, Submission, TaskError, TaskStatus, WorkFn};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = Config::default();
//!     cfg.backoff.base = Duration::from_millis(10);
//!     let rt = Runtime::builder(cfg).start()?;
//!
//!     let (sink, _rx) = ChannelSink::new(64);
//!     rt.connect("agent-1".into(), Arc::new(sink));
//!
//!     let work = WorkFn::arc("hello", |ctx: AttemptContext| async move {
//!         ctx.report_progress(50.0, Some("halfway"));
//!         Ok::<_, TaskError>(json!({"greeting": "hello"}))
//!     });
//!     let snap = rt.submit(Submission::new("agent-1", work))?.wait().await;
//!     assert_eq!(snap.state, TaskStatus::Completed);
//!
//!     rt.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod core;
mod engine;
mod error;
mod events;
mod hub;
mod ids;
mod policies;
mod subscribers;
mod tasks;
mod updates;

// ---- Public re-exports ----

pub use core::{Config, Runtime, RuntimeBuilder};
pub use engine::{AttemptError, Engine, ExecutionHandle, TaskSnapshot};
pub use error::{ConfigError, RuntimeError, SendError, SubmitError, TaskError};
pub use events::{Bus, Event, EventKind};
pub use hub::{ChannelSink, Counters, Delivery, ObserverInfo, ObserverSink, Registry, UpdateSink};
pub use ids::{ObserverId, SubjectId, TaskId};
pub use policies::{BackoffPolicy, FailureClass, JitterPolicy, RetryPolicy, default_retry_on};
pub use subscribers::{
    LogWriter, RetryMetrics, RetryStats, Subscribe, SubscriberHealth, SubscriberMonitor, SubscriberSet,
};
pub use tasks::{AttemptContext, Submission, Work, WorkFn, WorkRef};
pub use updates::{ClientMessage, ExecutionStatus, TaskStatus, TaskUpdate, Update};
