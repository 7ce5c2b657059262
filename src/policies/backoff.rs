//! # Backoff policy for retrying task executions.
//!
//! [`BackoffPolicy`] computes the delay before retry number `k` (0-indexed):
//!
//! ```text
//! delay(k) = min(max, base × multiplier^k)   then jitter (never above max)
//! ```
//!
//! The base delay is derived purely from `k`, so jitter output never feeds back into
//! later delays. Without jitter the sequence is non-decreasing and saturates at `max`.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use taskpulse::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     base: Duration::from_secs(1),
//!     multiplier: 2.0,
//!     max: Duration::from_secs(10),
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.delay(0), Duration::from_secs(1));
//! assert_eq!(backoff.delay(2), Duration::from_secs(4));
//! assert_eq!(backoff.delay(8), Duration::from_secs(10));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Exponential retry backoff.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry (`> 0`).
    pub base: Duration,
    /// Multiplicative growth factor (`> 1.0`).
    pub multiplier: f64,
    /// Upper bound for every delay (`>= base`).
    pub max: Duration,
    /// Randomization applied to each computed delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// `base = 1s`, `multiplier = 2.0`, `max = 30s`, no jitter.
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            multiplier: 2.0,
            max: Duration::from_secs(30),
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Computes the delay before retry `attempt` (0-indexed).
    ///
    /// Non-finite or overflowing intermediate values saturate at [`BackoffPolicy::max`].
    pub fn delay(&self, attempt: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = attempt.min(i32::MAX as u32) as i32;
        let raw = self.base.as_secs_f64() * self.multiplier.powi(exp);

        let capped = if !raw.is_finite() || raw < 0.0 || raw > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(raw)
        };

        let jittered = match self.jitter {
            JitterPolicy::Decorrelated => {
                self.jitter
                    .apply_decorrelated(self.base.min(self.max), capped, self.max)
            }
            _ => self.jitter.apply(capped),
        };
        jittered.min(self.max)
    }

    /// Returns the first `n` delays (handy for logging a schedule).
    pub fn schedule(&self, n: u32) -> Vec<Duration> {
        (0..n).map(|k| self.delay(k)).collect()
    }
}
