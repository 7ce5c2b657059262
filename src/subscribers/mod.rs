//! # Diagnostic event subscribers.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out and the
//! built-in subscribers for events broadcast through the [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! ExecutionActor / Registry ── publish(Event) ──► Bus ──► Runtime listener
//!                                                            │
//!                                                            ▼
//!                                                     SubscriberSet::emit
//!                                                  ┌────────┼──────────┐
//!                                                  ▼        ▼          ▼
//!                                              LogWriter RetryMetrics Custom
//! ```

mod log;
mod retry_metrics;
mod subscriber;
mod subscriber_set;

pub use log::LogWriter;
pub use retry_metrics::{RetryMetrics, RetryStats};
pub use subscriber::Subscribe;
pub use subscriber_set::{SubscriberHealth, SubscriberMonitor, SubscriberSet};
