//! # Per-subject retry statistics.
//!
//! [`RetryMetrics`] folds `RetryScheduled`, `TaskCompleted` and `TaskFailed` events into
//! one [`RetryStats`] record per subject. Executions that succeed or fail on their first
//! attempt do not count as retried.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Retry counters of one subject.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RetryStats {
    /// Retries scheduled.
    pub total_retries: u64,
    /// Executions that completed after at least one retry.
    pub successful_retries: u64,
    /// Executions that failed after at least one retry.
    pub failed_retries: u64,
    /// Sum of all scheduled retry delays.
    #[serde(serialize_with = "serialize_secs")]
    pub total_delay: Duration,
    /// Retries per error label.
    pub error_counts: BTreeMap<String, u64>,
    /// Time of the last change.
    pub last_updated: Option<DateTime<Utc>>,
}

impl RetryStats {
    /// Share of retried executions that eventually completed, if any ended.
    pub fn success_rate(&self) -> Option<f64> {
        let ended = self.successful_retries + self.failed_retries;
        (ended > 0).then(|| self.successful_retries as f64 / ended as f64)
    }

    /// Mean scheduled delay per retry.
    pub fn average_delay(&self) -> Duration {
        match u32::try_from(self.total_retries) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total_delay / n,
            Err(_) => Duration::ZERO,
        }
    }

    fn merge(&mut self, other: &RetryStats) {
        self.total_retries += other.total_retries;
        self.successful_retries += other.successful_retries;
        self.failed_retries += other.failed_retries;
        self.total_delay += other.total_delay;
        for (k, v) in &other.error_counts {
            *self.error_counts.entry(k.clone()).or_default() += v;
        }
        self.last_updated = self.last_updated.max(other.last_updated);
    }
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Subscriber collecting [`RetryStats`] per subject.
///
/// Cheap to clone; clones share the same table, so keep one clone for reading and hand
/// the other to the runtime.
#[derive(Clone, Default)]
pub struct RetryMetrics {
    by_subject: Arc<DashMap<String, RetryStats>>,
}

impl RetryMetrics {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the statistics of one subject.
    pub fn get(&self, subject: &str) -> Option<RetryStats> {
        self.by_subject.get(subject).map(|s| s.clone())
    }

    /// Returns statistics aggregated over all subjects.
    pub fn summary(&self) -> RetryStats {
        let mut total = RetryStats::default();
        for entry in self.by_subject.iter() {
            total.merge(entry.value());
        }
        total
    }

    /// Forgets everything collected so far.
    pub fn reset(&self) {
        self.by_subject.clear();
    }

    fn record(&self, e: &Event) {
        let Some(subject) = e.subject.as_deref() else {
            return;
        };
        let retried = e.attempt.is_some_and(|a| a > 1);

        match e.kind {
            EventKind::RetryScheduled => {
                let mut stats = self.by_subject.entry(subject.to_string()).or_default();
                stats.total_retries += 1;
                stats.total_delay += Duration::from_millis(e.delay_ms.unwrap_or(0));
                let label = e.reason.as_deref().unwrap_or("unknown");
                *stats.error_counts.entry(label.to_string()).or_default() += 1;
                stats.last_updated = Some(Utc::now());
            }
            EventKind::TaskCompleted if retried => {
                let mut stats = self.by_subject.entry(subject.to_string()).or_default();
                stats.successful_retries += 1;
                stats.last_updated = Some(Utc::now());
            }
            EventKind::TaskFailed if retried => {
                let mut stats = self.by_subject.entry(subject.to_string()).or_default();
                stats.failed_retries += 1;
                stats.last_updated = Some(Utc::now());
            }
            _ => {}
        }
    }
}

#[async_trait]
impl Subscribe for RetryMetrics {
    async fn on_event(&self, event: &Event) {
        self.record(event);
    }

    fn name(&self) -> &'static str {
        "retry_metrics"
    }

    fn accepts(&self, kind: EventKind) -> bool {
        matches!(
            kind,
            EventKind::RetryScheduled | EventKind::TaskCompleted | EventKind::TaskFailed
        )
    }
}
