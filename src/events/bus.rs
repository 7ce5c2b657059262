//! # Event bus for broadcasting diagnostic events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking publishing from many sources (execution actors, registry, workers).
//!
//! ## Architecture
//! ```text
//! Publishers (many):                 Subscriber (one):
//!   ExecutionActor ─┐
//!   Registry ───────┼────► Bus ───► subscriber_listener ───► SubscriberSet
//!   Dispatcher ─────┤  (broadcast)      (in Runtime)
//!   Heartbeat ──────┘
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks.
//! - **Bounded capacity**: one ring buffer shared by all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` items.
//! - **No persistence**: events are dropped if nobody listens.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for diagnostic events.
///
/// Cheap to clone (internally an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active receivers; dropped if there are none.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver observing events sent from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn test_publish_reaches_receiver() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::ShutdownRequested));
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::ShutdownRequested);
    }

    #[test]
    fn test_publish_without_receivers_is_noop() {
        Bus::new(0).publish(Event::new(EventKind::AllStoppedWithin));
    }
}
