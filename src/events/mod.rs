//! Runtime diagnostics: event types and broadcast bus.
//!
//! This module groups the **diagnostic** event model and the **bus** used to publish
//! them. Diagnostic events describe what the runtime did (attempt started, retry
//! scheduled, observer evicted, queue overflow); they are not delivered to remote
//! observers, which receive [`Update`](crate::Update)s instead.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `ExecutionActor`, `Engine`, `Registry`, dispatcher and heartbeat
//!   workers, `SubscriberSet` workers (overflow/panic), `Runtime` (shutdown).
//! - **Consumers**: `Runtime::subscriber_listener()` fans out to the `SubscriberSet`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
