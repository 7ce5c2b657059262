//! # Global runtime configuration.
//!
//! Provides [`Config`], centralized settings for the registry, the dispatcher, the
//! heartbeat monitor and the execution engine.
//!
//! Config can be built three ways:
//! 1. **In code**: `Config::default()` and field overrides
//! 2. **From JSON**: [`Config::from_json_str`] (durations in seconds, floats allowed)
//! 3. **From the environment**: [`Config::from_env`] reads `TASKPULSE_*` variables
//!
//! Every loader runs [`Config::validate`].
//!
//! ## Recognized options
//! | option               | env                              | default |
//! |----------------------|----------------------------------|---------|
//! | `heartbeat_interval` | `TASKPULSE_HEARTBEAT_INTERVAL`   | 30s     |
//! | `max_queue_size`     | `TASKPULSE_MAX_QUEUE_SIZE`       | 100     |
//! | `batch_interval`     | `TASKPULSE_BATCH_INTERVAL`       | 0.1s    |
//! | `batch_max_size`     | `TASKPULSE_BATCH_MAX_SIZE`       | 50      |
//! | `max_retries`        | `TASKPULSE_MAX_RETRIES`          | 3       |
//! | `backoff_base`       | `TASKPULSE_BACKOFF_BASE`         | 1s      |
//! | `backoff_multiplier` | `TASKPULSE_BACKOFF_MULTIPLIER`   | 2.0     |
//! | `backoff_max_delay`  | `TASKPULSE_BACKOFF_MAX_DELAY`    | 30s     |
//! | `backoff_jitter`     | `TASKPULSE_BACKOFF_JITTER`       | none    |
//! | `retry_on`           | `TASKPULSE_RETRY_ON` (comma list)| see [`default_retry_on`] |
//! | `bus_capacity`       | `TASKPULSE_BUS_CAPACITY`         | 1024    |
//! | `grace`              | `TASKPULSE_GRACE`                | 30s     |

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::policies::{BackoffPolicy, JitterPolicy, RetryPolicy, default_retry_on};

/// Global configuration for the taskpulse runtime.
///
/// ## Field semantics
/// - `heartbeat_interval`: ping period; observers silent for twice this long are evicted
/// - `max_queue_size`: offline queue capacity per subject (oldest evicted beyond it)
/// - `batch_interval`: flush period of each observer's batch buffer
/// - `batch_max_size`: buffer length that triggers an early flush
/// - `max_retries`, `backoff`, `retry_on`: retry behaviour of the execution engine
/// - `bus_capacity`: diagnostic bus ring buffer size (min 1; clamped by `Bus`)
/// - `grace`: how long shutdown waits for running executions
#[derive(Clone, Debug)]
pub struct Config {
    /// Interval between heartbeat pings.
    pub heartbeat_interval: Duration,
    /// Offline queue capacity per subject.
    pub max_queue_size: usize,
    /// Batch flush period.
    pub batch_interval: Duration,
    /// Batch size that triggers an immediate flush.
    pub batch_max_size: usize,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay schedule between attempts.
    pub backoff: BackoffPolicy,
    /// Error kinds treated as transient.
    pub retry_on: Vec<String>,
    /// Diagnostic bus capacity.
    pub bus_capacity: usize,
    /// Shutdown grace period.
    pub grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            max_queue_size: 100,
            batch_interval: Duration::from_millis(100),
            batch_max_size: 50,
            max_retries: 3,
            backoff: BackoffPolicy::default(),
            retry_on: default_retry_on(),
            bus_capacity: 1024,
            grace: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Silence after which an observer is considered dead (`2 × heartbeat_interval`).
    #[inline]
    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_interval.saturating_mul(2)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Builds the engine's retry policy from the retry fields.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.backoff).with_retry_on(self.retry_on.iter().cloned())
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_interval.is_zero() {
            return Err(invalid("heartbeat_interval", "must be > 0"));
        }
        if self.max_queue_size == 0 {
            return Err(invalid("max_queue_size", "must be >= 1"));
        }
        if self.batch_interval.is_zero() {
            return Err(invalid("batch_interval", "must be > 0"));
        }
        if self.batch_max_size == 0 {
            return Err(invalid("batch_max_size", "must be >= 1"));
        }
        if self.backoff.base.is_zero() {
            return Err(invalid("backoff_base", "must be > 0"));
        }
        if !self.backoff.multiplier.is_finite() || self.backoff.multiplier <= 1.0 {
            return Err(invalid("backoff_multiplier", "must be a finite number > 1"));
        }
        if self.backoff.max < self.backoff.base {
            return Err(invalid("backoff_max_delay", "must be >= backoff_base"));
        }
        Ok(())
    }

    /// Parses a JSON document (all keys optional, durations in seconds).
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(json)?;
        raw.into_config()
    }

    /// Reads `TASKPULSE_*` environment variables on top of the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut raw = RawConfig::default();
        let get = |name: &'static str| lookup(&format!("TASKPULSE_{name}")).map(|v| (name, v));

        if let Some((k, v)) = get("HEARTBEAT_INTERVAL") {
            raw.heartbeat_interval = parse(k, &v)?;
        }
        if let Some((k, v)) = get("MAX_QUEUE_SIZE") {
            raw.max_queue_size = parse(k, &v)?;
        }
        if let Some((k, v)) = get("BATCH_INTERVAL") {
            raw.batch_interval = parse(k, &v)?;
        }
        if let Some((k, v)) = get("BATCH_MAX_SIZE") {
            raw.batch_max_size = parse(k, &v)?;
        }
        if let Some((k, v)) = get("MAX_RETRIES") {
            raw.max_retries = parse(k, &v)?;
        }
        if let Some((k, v)) = get("BACKOFF_BASE") {
            raw.backoff_base = parse(k, &v)?;
        }
        if let Some((k, v)) = get("BACKOFF_MULTIPLIER") {
            raw.backoff_multiplier = parse(k, &v)?;
        }
        if let Some((k, v)) = get("BACKOFF_MAX_DELAY") {
            raw.backoff_max_delay = parse(k, &v)?;
        }
        if let Some((k, v)) = get("BACKOFF_JITTER") {
            raw.backoff_jitter = serde_json::from_value(serde_json::Value::String(v.trim().to_lowercase()))
                .map_err(|_| parse_error(k, &v))?;
        }
        if let Some((_, v)) = get("RETRY_ON") {
            raw.retry_on = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some((k, v)) = get("BUS_CAPACITY") {
            raw.bus_capacity = parse(k, &v)?;
        }
        if let Some((k, v)) = get("GRACE") {
            raw.grace = parse(k, &v)?;
        }
        raw.into_config()
    }
}

/// Serialized form of [`Config`]: flat keys, durations as seconds.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    heartbeat_interval: f64,
    max_queue_size: usize,
    batch_interval: f64,
    batch_max_size: usize,
    max_retries: u32,
    backoff_base: f64,
    backoff_multiplier: f64,
    backoff_max_delay: f64,
    backoff_jitter: JitterPolicy,
    retry_on: Vec<String>,
    bus_capacity: usize,
    grace: f64,
}

impl Default for RawConfig {
    fn default() -> Self {
        let cfg = Config::default();
        Self {
            heartbeat_interval: cfg.heartbeat_interval.as_secs_f64(),
            max_queue_size: cfg.max_queue_size,
            batch_interval: cfg.batch_interval.as_secs_f64(),
            batch_max_size: cfg.batch_max_size,
            max_retries: cfg.max_retries,
            backoff_base: cfg.backoff.base.as_secs_f64(),
            backoff_multiplier: cfg.backoff.multiplier,
            backoff_max_delay: cfg.backoff.max.as_secs_f64(),
            backoff_jitter: cfg.backoff.jitter,
            retry_on: cfg.retry_on,
            bus_capacity: cfg.bus_capacity,
            grace: cfg.grace.as_secs_f64(),
        }
    }
}

impl RawConfig {
    fn into_config(self) -> Result<Config, ConfigError> {
        let cfg = Config {
            heartbeat_interval: seconds("heartbeat_interval", self.heartbeat_interval)?,
            max_queue_size: self.max_queue_size,
            batch_interval: seconds("batch_interval", self.batch_interval)?,
            batch_max_size: self.batch_max_size,
            max_retries: self.max_retries,
            backoff: BackoffPolicy {
                base: seconds("backoff_base", self.backoff_base)?,
                multiplier: self.backoff_multiplier,
                max: seconds("backoff_max_delay", self.backoff_max_delay)?,
                jitter: self.backoff_jitter,
            },
            retry_on: self.retry_on,
            bus_capacity: self.bus_capacity,
            grace: seconds("grace", self.grace)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

fn seconds(field: &'static str, secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|_| invalid(field, "must be a non-negative number of seconds"))
}

fn parse<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| parse_error(name, value))
}

fn parse_error(name: &str, value: &str) -> ConfigError {
    ConfigError::Parse {
        key: format!("TASKPULSE_{name}"),
        value: value.to_string(),
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = Config::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.heartbeat_timeout(), Duration::from_secs(60));
        assert_eq!(cfg.batch_interval, Duration::from_millis(100));
        assert_eq!(cfg.max_queue_size, 100);
    }

    #[test]
    fn test_json_overrides_and_fractional_seconds() {
        let cfg = Config::from_json_str(
            r#"{"heartbeat_interval": 1, "batch_interval": 0.05, "max_queue_size": 2,
                "backoff_base": 1, "backoff_multiplier": 2, "backoff_max_delay": 10,
                "backoff_jitter": "full"}"#,
        )
        .unwrap();
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(1));
        assert_eq!(cfg.batch_interval, Duration::from_millis(50));
        assert_eq!(cfg.max_queue_size, 2);
        assert_eq!(cfg.backoff.max, Duration::from_secs(10));
        assert_eq!(cfg.backoff.jitter, JitterPolicy::Full);
    }

    #[test]
    fn test_unknown_json_key_is_rejected() {
        let err = Config::from_json_str(r#"{"heartbeat": 3}"#).unwrap_err();
        assert_eq!(err.as_label(), "config_json");
    }

    #[test]
    fn test_invalid_backoff_is_rejected() {
        let err = Config::from_json_str(r#"{"backoff_multiplier": 1.0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "backoff_multiplier", .. }));

        let err = Config::from_json_str(r#"{"backoff_base": 5, "backoff_max_delay": 1}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "backoff_max_delay", .. }));

        let err = Config::from_json_str(r#"{"max_queue_size": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "max_queue_size", .. }));
    }

    #[test]
    fn test_env_lookup() {
        let vars: HashMap<&str, &str> = [
            ("TASKPULSE_MAX_RETRIES", "5"),
            ("TASKPULSE_BATCH_INTERVAL", "0.25"),
            ("TASKPULSE_RETRY_ON", "timeout, flaky ,"),
            ("TASKPULSE_BACKOFF_JITTER", "Equal"),
        ]
        .into_iter()
        .collect();

        let cfg = Config::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.max_retries, 5);
        assert_eq!(cfg.batch_interval, Duration::from_millis(250));
        assert_eq!(cfg.retry_on, vec!["timeout".to_string(), "flaky".to_string()]);
        assert_eq!(cfg.backoff.jitter, JitterPolicy::Equal);
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_env_parse_error_names_variable() {
        let err = Config::from_lookup(|k| (k == "TASKPULSE_MAX_QUEUE_SIZE").then(|| "lots".to_string()))
            .unwrap_err();
        match err {
            ConfigError::Parse { key, value } => {
                assert_eq!(key, "TASKPULSE_MAX_QUEUE_SIZE");
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_retry_policy_carries_kinds() {
        let mut cfg = Config::default();
        cfg.retry_on = vec!["flaky".into()];
        cfg.max_retries = 1;
        let policy = cfg.retry_policy();
        assert_eq!(policy.max_retries, 1);
        assert_eq!(&*policy.retry_on, &["flaky".to_string()]);
    }
}
