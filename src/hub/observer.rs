//! Per-observer state shared by the registry and the observer's workers.

use std::mem;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::hub::sink::ObserverSink;
use crate::ids::{ObserverId, SubjectId};
use crate::updates::Update;

/// Timer resolution; silence is detected strictly after the timeout.
const TICK: Duration = Duration::from_millis(1);

/// Outbound batch buffer.
///
/// `push` wakes the dispatcher once the buffer reaches its size threshold; `take`
/// swaps the whole buffer out under the lock.
pub(crate) struct BatchBuffer {
    items: Mutex<Vec<Update>>,
    max: usize,
    full: Notify,
}

impl BatchBuffer {
    pub(crate) fn new(max: usize) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            max: max.max(1),
            full: Notify::new(),
        }
    }

    pub(crate) fn push(&self, update: Update) {
        let len = {
            let mut items = self.items.lock();
            items.push(update);
            items.len()
        };
        if len >= self.max {
            self.full.notify_one();
        }
    }

    pub(crate) fn take(&self) -> Vec<Update> {
        mem::take(&mut *self.items.lock())
    }

    pub(crate) fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub(crate) async fn filled(&self) {
        self.full.notified().await;
    }
}

/// Live connection bound to one subject.
pub(crate) struct ObserverEntry {
    pub(crate) id: ObserverId,
    pub(crate) subject: SubjectId,
    pub(crate) connected_at: DateTime<Utc>,
    pub(crate) sink: Arc<dyn ObserverSink>,
    pub(crate) buffer: BatchBuffer,
    pub(crate) token: CancellationToken,
    silence_timeout: Duration,
    last_contact: Mutex<Instant>,
}

impl ObserverEntry {
    pub(crate) fn new(
        subject: SubjectId,
        sink: Arc<dyn ObserverSink>,
        batch_max_size: usize,
        silence_timeout: Duration,
        token: CancellationToken,
    ) -> Self {
        Self {
            id: ObserverId::generate(),
            subject,
            connected_at: Utc::now(),
            sink,
            buffer: BatchBuffer::new(batch_max_size),
            token,
            silence_timeout,
            last_contact: Mutex::new(Instant::now()),
        }
    }

    pub(crate) fn touch(&self) {
        *self.last_contact.lock() = Instant::now();
    }

    pub(crate) fn last_contact(&self) -> Instant {
        *self.last_contact.lock()
    }

    pub(crate) fn idle(&self) -> Duration {
        self.last_contact().elapsed()
    }

    /// Resolves once the observer has had no contact for longer than its silence timeout.
    ///
    /// The deadline is re-read after every wake-up, so contact recorded meanwhile
    /// pushes it back.
    pub(crate) async fn silenced(&self) {
        loop {
            sleep_until(self.last_contact() + self.silence_timeout + TICK).await;
            if self.idle() > self.silence_timeout {
                return;
            }
        }
    }

    pub(crate) fn info(&self) -> ObserverInfo {
        ObserverInfo {
            id: self.id,
            subject: self.subject.clone(),
            connected_at: self.connected_at,
            idle: self.idle(),
            buffered: self.buffer.len(),
        }
    }
}

/// Read-only view of a connected observer.
#[derive(Clone, Debug, Serialize)]
pub struct ObserverInfo {
    /// Observer id.
    pub id: ObserverId,
    /// Subject the observer is bound to.
    pub subject: SubjectId,
    /// Connection time.
    pub connected_at: DateTime<Utc>,
    /// Time since the last contact.
    pub idle: Duration,
    /// Updates waiting for the next flush.
    pub buffered: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_take_swaps_buffer() {
        let buf = BatchBuffer::new(10);
        buf.push(Update::ping());
        buf.push(Update::pong());
        assert_eq!(buf.take().len(), 2);
        assert!(buf.take().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silenced_waits_for_contact_gap() {
        let (sink, _rx) = crate::hub::ChannelSink::new(1);
        let entry = ObserverEntry::new(
            "A".into(),
            Arc::new(sink),
            10,
            Duration::from_secs(60),
            CancellationToken::new(),
        );

        tokio::time::sleep(Duration::from_secs(50)).await;
        entry.touch();
        let started = Instant::now();
        entry.silenced().await;
        assert!(started.elapsed() > Duration::from_secs(60));
        assert!(entry.idle() > Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_threshold_wakes_waiter() {
        let buf = BatchBuffer::new(2);
        buf.push(Update::ping());
        buf.push(Update::ping());
        tokio::time::timeout(Duration::from_millis(10), buf.filled())
            .await
            .unwrap();
    }
}
