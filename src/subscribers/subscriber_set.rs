//! # Fan-out of diagnostic events to subscribers.
//!
//! ```text
//! emit(event) ──► accepts(kind)? ──► try_send ──► [queue] ──► worker ──► on_event()
//!                     │ no               │ full/closed              └─► panic → SubscriberPanicked
//!                     ▼                  ▼
//!                  skipped        dropped += 1, SubscriberOverflow{count: dropped}
//! ```
//!
//! `emit` never waits. Each subscriber sees its accepted events in order; there is no
//! ordering between subscribers. [`SubscriberMonitor`] reads the per-subscriber
//! counters while the set is owned by the runtime's listener.
//!
//! Subscriber futures run under `AssertUnwindSafe`; a panic while holding a lock can
//! leave that subscriber's own state inconsistent.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::events::{Bus, Event, EventKind};
use crate::subscribers::Subscribe;

#[derive(Default)]
struct Tally {
    delivered: AtomicU64,
    dropped: AtomicU64,
    panics: AtomicU64,
}

struct Slot {
    name: &'static str,
    sub: Arc<dyn Subscribe>,
    sender: mpsc::Sender<Arc<Event>>,
    tally: Arc<Tally>,
}

/// Counters of one subscriber.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubscriberHealth {
    /// Subscriber name.
    pub name: &'static str,
    /// Events handled (including ones that panicked).
    pub delivered: u64,
    /// Events dropped because the queue was full or closed.
    pub dropped: u64,
    /// Panics caught in `on_event`.
    pub panics: u64,
}

/// Read-only handle on the counters of a [`SubscriberSet`].
#[derive(Clone, Default)]
pub struct SubscriberMonitor {
    tallies: Vec<(&'static str, Arc<Tally>)>,
}

impl SubscriberMonitor {
    /// Current counters, in registration order.
    pub fn health(&self) -> Vec<SubscriberHealth> {
        self.tallies
            .iter()
            .map(|(name, t)| SubscriberHealth {
                name: *name,
                delivered: t.delivered.load(Ordering::Relaxed),
                dropped: t.dropped.load(Ordering::Relaxed),
                panics: t.panics.load(Ordering::Relaxed),
            })
            .collect()
    }
}

/// Diagnostic subscribers with one bounded queue and worker each.
pub struct SubscriberSet {
    slots: Vec<Slot>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Spawns one worker per subscriber. Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let mut slots = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let name = sub.name();
            let tally = Arc::new(Tally::default());
            let (tx, rx) = mpsc::channel::<Arc<Event>>(sub.queue_capacity().max(1));
            workers.push(tokio::spawn(worker(
                Arc::clone(&sub),
                rx,
                Arc::clone(&tally),
                bus.clone(),
            )));
            slots.push(Slot {
                name,
                sub,
                sender: tx,
                tally,
            });
        }
        Self {
            slots,
            workers,
            bus,
        }
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no subscriber is registered.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Handle for reading the per-subscriber counters.
    pub fn monitor(&self) -> SubscriberMonitor {
        SubscriberMonitor {
            tallies: self
                .slots
                .iter()
                .map(|s| (s.name, Arc::clone(&s.tally)))
                .collect(),
        }
    }

    /// Queues `event` for every subscriber that accepts its kind.
    pub fn emit(&self, event: &Event) {
        self.emit_arc(Arc::new(event.clone()));
    }

    /// Same as [`emit`](Self::emit) without cloning the event.
    ///
    /// A dropped `SubscriberOverflow` is counted but not reported again.
    pub fn emit_arc(&self, event: Arc<Event>) {
        for slot in &self.slots {
            if !slot.sub.accepts(event.kind) {
                continue;
            }
            let reason = match slot.sender.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            let dropped = slot.tally.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if event.kind != EventKind::SubscriberOverflow {
                self.bus.publish(
                    Event::subscriber_overflow(slot.name, reason)
                        .with_count(usize::try_from(dropped).unwrap_or(usize::MAX)),
                );
            }
        }
    }

    /// Closes the queues and waits until every worker drained its backlog.
    pub async fn shutdown(self) {
        drop(self.slots);
        for h in self.workers {
            let _ = h.await;
        }
    }
}

async fn worker(
    sub: Arc<dyn Subscribe>,
    mut rx: mpsc::Receiver<Arc<Event>>,
    tally: Arc<Tally>,
    bus: Bus,
) {
    while let Some(ev) = rx.recv().await {
        let res = std::panic::AssertUnwindSafe(sub.on_event(ev.as_ref()))
            .catch_unwind()
            .await;
        tally.delivered.fetch_add(1, Ordering::Relaxed);
        if let Err(panic) = res {
            tally.panics.fetch_add(1, Ordering::Relaxed);
            bus.publish(Event::subscriber_panicked(sub.name(), panic_message(&*panic)));
        }
    }
}

fn panic_message(any: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct Recorder {
        seen: Arc<Mutex<Vec<EventKind>>>,
        only_tasks: bool,
    }

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, event: &Event) {
            self.seen.lock().push(event.kind);
        }

        fn name(&self) -> &'static str {
            "recorder"
        }

        fn accepts(&self, kind: EventKind) -> bool {
            !self.only_tasks || matches!(kind, EventKind::TaskSubmitted | EventKind::TaskCompleted)
        }
    }

    struct Panicker;

    #[async_trait]
    impl Subscribe for Panicker {
        async fn on_event(&self, _event: &Event) {
            panic!("boom");
        }

        fn name(&self) -> &'static str {
            "panicker"
        }
    }

    struct Stalled;

    #[async_trait]
    impl Subscribe for Stalled {
        async fn on_event(&self, _event: &Event) {
            std::future::pending::<()>().await;
        }

        fn name(&self) -> &'static str {
            "stalled"
        }

        fn queue_capacity(&self) -> usize {
            1
        }
    }

    #[tokio::test]
    async fn test_accepted_events_delivered_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let set = SubscriberSet::new(
            vec![Arc::new(Recorder {
                seen: seen.clone(),
                only_tasks: true,
            })],
            Bus::new(16),
        );
        let monitor = set.monitor();
        set.emit(&Event::new(EventKind::TaskSubmitted));
        set.emit(&Event::new(EventKind::ObserverConnected));
        set.emit(&Event::new(EventKind::TaskCompleted));
        set.shutdown().await;

        assert_eq!(
            *seen.lock(),
            vec![EventKind::TaskSubmitted, EventKind::TaskCompleted]
        );
        assert_eq!(monitor.health()[0].delivered, 2);
        assert_eq!(monitor.health()[0].dropped, 0);
    }

    #[tokio::test]
    async fn test_panic_is_reported_and_counted() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let set = SubscriberSet::new(vec![Arc::new(Panicker)], bus);
        let monitor = set.monitor();

        set.emit(&Event::new(EventKind::TaskSubmitted));
        set.shutdown().await;

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::SubscriberPanicked);
        assert_eq!(ev.task.as_deref(), Some("panicker"));
        assert_eq!(ev.reason.as_deref(), Some("boom"));
        assert_eq!(
            monitor.health(),
            vec![SubscriberHealth {
                name: "panicker",
                delivered: 1,
                dropped: 0,
                panics: 1,
            }]
        );
    }

    #[tokio::test]
    async fn test_overflow_reports_running_drop_count() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let set = SubscriberSet::new(vec![Arc::new(Stalled)], bus);
        let monitor = set.monitor();

        for _ in 0..5 {
            set.emit(&Event::new(EventKind::TaskSubmitted));
        }

        let dropped = monitor.health()[0].dropped;
        assert!(dropped >= 3);
        let mut last = None;
        while let Ok(ev) = rx.try_recv() {
            assert_eq!(ev.kind, EventKind::SubscriberOverflow);
            assert_eq!(ev.reason.as_deref(), Some("full"));
            last = ev.count;
        }
        assert_eq!(last, Some(dropped as usize));
    }
}
