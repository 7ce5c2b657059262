//! # Retry policy for task executions.
//!
//! [`RetryPolicy`] decides, after a failed attempt, whether the execution gets another
//! attempt and how long to wait for it.
//!
//! ## Classification
//! ```text
//! TaskError::Transient            → transient
//! TaskError::Fatal                → fatal
//! TaskError::Kind { kind, .. }    → transient if kind ∈ retry_on, else fatal
//! TaskError::Canceled             → cancelled (never retried, not a failure)
//! ```
//!
//! ## Budget
//! With `max_retries = r` an always-failing transient execution makes exactly `r + 1`
//! attempts. The delay before retry `k` (0-indexed) is `backoff.delay(k)`.

use std::sync::Arc;
use std::time::Duration;

use crate::error::TaskError;
use crate::policies::backoff::BackoffPolicy;

/// Error kinds retried by default.
pub fn default_retry_on() -> Vec<String> {
    [
        "rate_limit",
        "timeout",
        "connection",
        "server_error",
        "resource_exhausted",
        "temporary_failure",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Outcome class of a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    /// May succeed on a later attempt.
    Transient,
    /// Terminal; no further attempts.
    Fatal,
    /// The work stopped because cancellation was requested.
    Cancelled,
}

/// Retry budget, backoff schedule and error classification.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay schedule between attempts.
    pub backoff: BackoffPolicy,
    /// Error kinds (see [`TaskError::Kind`]) that count as transient.
    pub retry_on: Arc<[String]>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffPolicy::default(),
            retry_on: default_retry_on().into(),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the default retryable kinds.
    pub fn new(max_retries: u32, backoff: BackoffPolicy) -> Self {
        Self {
            max_retries,
            backoff,
            ..Self::default()
        }
    }

    /// Returns a copy with a different list of retryable kinds.
    pub fn with_retry_on<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retry_on = kinds.into_iter().map(Into::into).collect::<Vec<_>>().into();
        self
    }

    /// Classifies a failed attempt.
    pub fn classify(&self, err: &TaskError) -> FailureClass {
        match err {
            TaskError::Transient { .. } => FailureClass::Transient,
            TaskError::Fatal { .. } => FailureClass::Fatal,
            TaskError::Kind { kind, .. } => {
                if self.retry_on.iter().any(|k| k == kind) {
                    FailureClass::Transient
                } else {
                    FailureClass::Fatal
                }
            }
            TaskError::Canceled => FailureClass::Cancelled,
        }
    }

    /// Returns the delay before the next attempt, or `None` when the budget is spent.
    ///
    /// `retries_used` is the number of retries already scheduled for this execution.
    pub fn next_delay(&self, retries_used: u32) -> Option<Duration> {
        (retries_used < self.max_retries).then(|| self.backoff.delay(retries_used))
    }
}
