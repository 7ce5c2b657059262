//! # Retrying task-execution engine.
//!
//! - [`Engine`]: submission, cancellation, status and shutdown of executions
//! - [`ExecutionHandle`]: caller-side view of one execution
//! - [`TaskSnapshot`] / [`AttemptError`]: execution state and error history
//!
//! Each execution runs in its own actor task which drives the
//! `pending → running → {completed | retrying | failed | cancelled}` state machine
//! and publishes every change to an [`UpdateSink`](crate::UpdateSink).

mod actor;
mod executor;
mod handle;
mod snapshot;

pub use executor::Engine;
pub use handle::ExecutionHandle;
pub use snapshot::{AttemptError, TaskSnapshot};
