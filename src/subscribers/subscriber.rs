//! # Diagnostic event subscriber trait.
//!
//! A [`Subscribe`] implementation consumes the runtime's diagnostic [`Event`]s: task
//! lifecycle (submitted, attempts, retries, outcome), observer churn (connect,
//! send failure, eviction) and offline-queue overflow.
//!
//! A subscriber declares which kinds it cares about with [`Subscribe::accepts`]; the
//! [`SubscriberSet`](crate::SubscriberSet) never queues the rest, so a narrow
//! subscriber cannot overflow on traffic it would ignore anyway.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use taskpulse::{Event, EventKind, Subscribe};
//!
//! struct EvictionAlerts;
//!
//! #[async_trait]
//! impl Subscribe for EvictionAlerts {
//!     async fn on_event(&self, ev: &Event) {
//!         // page whoever owns ev.subject
//!         let _ = ev.subject.as_deref();
//!     }
//!
//!     fn name(&self) -> &'static str { "eviction_alerts" }
//!
//!     fn accepts(&self, kind: EventKind) -> bool {
//!         matches!(kind, EventKind::ObserverEvicted | EventKind::ObserverSendFailed)
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};

/// Consumer of diagnostic events.
///
/// Runs on its own worker with a bounded queue; a slow or panicking subscriber only
/// loses its own events.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event, in publish order.
    async fn on_event(&self, event: &Event);

    /// Name used in overflow/panic events and in [`SubscriberHealth`](crate::SubscriberHealth).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Whether events of `kind` should be queued for this subscriber.
    ///
    /// Default: every kind.
    fn accepts(&self, kind: EventKind) -> bool {
        let _ = kind;
        true
    }

    /// Queue capacity (at least 1). Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
