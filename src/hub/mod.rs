//! # Real-time update delivery.
//!
//! - [`Registry`]: subject → observers map, offline queues, stats.
//! - `dispatcher`: one worker per observer coalescing updates into `batch_update`s.
//! - `heartbeat`: one worker per observer probing liveness.
//! - [`ObserverSink`] / [`ChannelSink`] / [`UpdateSink`]: delivery seams.

mod dispatcher;
mod heartbeat;
mod observer;
mod queue;
mod registry;
mod sink;
mod stats;

pub use observer::ObserverInfo;
pub use registry::{Delivery, Registry};
pub use sink::{ChannelSink, ObserverSink, UpdateSink};
pub use stats::Counters;

#[cfg(test)]
pub(crate) use sink::testing;
