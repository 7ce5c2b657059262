//! Retry policies.
//!
//! This module groups the knobs that control **whether** a failed execution is retried
//! and **how long** to wait between attempts.
//!
//! ## Contents
//! - [`RetryPolicy`]   retry budget and transient/fatal classification
//! - [`BackoffPolicy`] how retry delays evolve (base / multiplier / max + jitter)
//! - [`JitterPolicy`]  randomization strategy to avoid synchronized retries
//!
//! ## Quick wiring
//! ```text
//! Config { max_retries, backoff_*, retry_on } ──► RetryPolicy
//!      └─► engine::actor::ExecutionActor uses:
//!           - classify(err) to pick transient / fatal / cancelled
//!           - next_delay(retries_used) to schedule the next attempt
//! ```
//!
//! ## Defaults
//! - `max_retries = 3`
//! - `BackoffPolicy::default()` → base=1s, multiplier=2.0, max=30s, jitter=None.

mod backoff;
mod jitter;
mod retry;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use retry::{FailureClass, RetryPolicy, default_retry_on};
