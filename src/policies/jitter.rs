//! # Jitter policy for retry delays.
//!
//! [`JitterPolicy`] adds randomness to backoff delays so that many executions failing at
//! once (an upstream outage, a rate limit) do not retry in lockstep.
//!
//! - [`JitterPolicy::None`] no randomization, predictable delays
//! - [`JitterPolicy::Full`] random delay in `[0, d]`
//! - [`JitterPolicy::Equal`] `d/2 + random[0, d/2]`
//! - [`JitterPolicy::Decorrelated`] random delay in `[base, min(3d, max)]`

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Randomization strategy applied to a computed backoff delay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterPolicy {
    /// Exact backoff delay (deterministic).
    #[default]
    None,
    /// Random delay in `[0, d]`.
    Full,
    /// `d/2 + random[0, d/2]`; keeps roughly 75% of the delay on average.
    Equal,
    /// Random delay in `[base, min(3d, max)]`.
    ///
    /// Needs extra context, see [`apply_decorrelated`](Self::apply_decorrelated).
    Decorrelated,
}

impl JitterPolicy {
    /// Applies jitter to `delay`.
    ///
    /// `Decorrelated` returns the input unchanged here; the backoff policy calls
    /// [`apply_decorrelated`](Self::apply_decorrelated) for it.
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            JitterPolicy::None | JitterPolicy::Decorrelated => delay,
            JitterPolicy::Full => full_jitter(delay),
            JitterPolicy::Equal => equal_jitter(delay),
        }
    }

    /// Applies decorrelated jitter: random in `[base, min(prev * 3, max)]`.
    ///
    /// Falls back to [`apply`](Self::apply) for the other policies.
    pub fn apply_decorrelated(&self, base: Duration, prev: Duration, max: Duration) -> Duration {
        if !matches!(self, JitterPolicy::Decorrelated) {
            return self.apply(prev);
        }

        let base_ms = base.as_millis() as u64;
        let upper = (prev.as_millis() as u64)
            .saturating_mul(3)
            .min(max.as_millis() as u64)
            .max(base_ms);

        if base_ms >= upper {
            return base;
        }
        Duration::from_millis(rand::rng().random_range(base_ms..=upper))
    }
}

fn full_jitter(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=ms))
}

fn equal_jitter(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    let half = ms / 2;
    if half == 0 {
        return delay;
    }
    Duration::from_millis(half + rand::rng().random_range(0..=half))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_is_identity() {
        let d = Duration::from_millis(1234);
        assert_eq!(JitterPolicy::None.apply(d), d);
    }

    #[test]
    fn test_full_jitter_bounds() {
        for _ in 0..200 {
            assert!(JitterPolicy::Full.apply(Duration::from_millis(1000)) <= Duration::from_millis(1000));
        }
        assert_eq!(JitterPolicy::Full.apply(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_decorrelated_collapses_when_base_reaches_cap() {
        let base = Duration::from_secs(5);
        let d = JitterPolicy::Decorrelated.apply_decorrelated(base, base, Duration::from_secs(5));
        assert_eq!(d, base);
    }

    #[test]
    fn test_deserializes_snake_case() {
        let j: JitterPolicy = serde_json::from_str("\"equal\"").unwrap();
        assert_eq!(j, JitterPolicy::Equal);
    }
}
