//! Wire messages exchanged with remote observers.
//!
//! ## Contents
//! - [`Update`] server → client message (tagged by `type`)
//! - [`TaskUpdate`] payload of `task_update` messages
//! - [`TaskStatus`], [`ExecutionStatus`] execution state as reported on the wire
//! - [`ClientMessage`] client → server liveness messages
//!
//! All messages serialize to JSON objects carrying a `type` tag and an RFC 3339 `timestamp`.

mod client;
mod status;
mod update;

pub use client::ClientMessage;
pub use status::{ExecutionStatus, TaskStatus};
pub use update::{TaskUpdate, Update};
