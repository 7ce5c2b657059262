//! # Update channel registry.
//!
//! [`Registry`] maps each subject to its live observers and its offline queue.
//!
//! ## Architecture
//! ```text
//! publish(subject, update)
//!     │
//!     ▼
//! subjects: DashMap<SubjectId, Arc<Mutex<SubjectState>>>
//!     │  (one lock per subject)
//!     ├── observers present ──► BatchBuffer (each) ──► dispatcher ──► ObserverSink
//!     └── no observer ───────► OfflineQueue (bounded, oldest evicted)
//!
//! connect(subject, sink)
//!     ├── drain OfflineQueue into backlog (under the subject lock)
//!     ├── spawn dispatcher: connection_established → batch_update(backlog) → periodic batches
//!     └── spawn heartbeat: ping every interval, evict after 2 × interval of silence
//! ```
//!
//! ## Rules
//! - Only the registry mutates [`Counters`].
//! - Removal goes through the observer index, so each observer is removed exactly once
//!   no matter how many of disconnect / send failure / heartbeat timeout race.
//! - A subject with neither observers nor queued updates is dropped on the removal that
//!   empties it; publishers that catch a retired subject retry on a fresh one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::Config;
use crate::error::SendError;
use crate::events::{Bus, Event, EventKind};
use crate::hub::observer::{ObserverEntry, ObserverInfo};
use crate::hub::queue::OfflineQueue;
use crate::hub::sink::{ObserverSink, UpdateSink};
use crate::hub::stats::{Counters, Stats};
use crate::hub::{dispatcher, heartbeat};
use crate::ids::{ObserverId, SubjectId};
use crate::updates::{ClientMessage, Update};

/// Why an observer left the registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum DisconnectReason {
    /// The transport asked for it.
    Client,
    /// Delivery failed.
    SendFailed(SendError),
    /// No contact for more than twice the heartbeat interval.
    HeartbeatTimeout,
    /// The registry is closing.
    Shutdown,
}

/// Where a published update went.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Appended to the batch buffers of this many observers.
    Observers(usize),
    /// Appended to the offline queue; `evicted` if the oldest entry was dropped.
    Queued {
        /// Whether the queue was full.
        evicted: bool,
    },
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct HubSettings {
    pub(crate) heartbeat_interval: Duration,
    pub(crate) batch_interval: Duration,
    pub(crate) batch_max_size: usize,
    pub(crate) max_queue_size: usize,
}

/// Smallest timer period the workers accept; zero periods would spin or panic.
const MIN_PERIOD: Duration = Duration::from_millis(1);

impl HubSettings {
    fn clamped(self) -> Self {
        Self {
            heartbeat_interval: self.heartbeat_interval.max(MIN_PERIOD),
            batch_interval: self.batch_interval.max(MIN_PERIOD),
            batch_max_size: self.batch_max_size.max(1),
            max_queue_size: self.max_queue_size.max(1),
        }
    }
}

impl From<&Config> for HubSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            heartbeat_interval: cfg.heartbeat_interval,
            batch_interval: cfg.batch_interval,
            batch_max_size: cfg.batch_max_size,
            max_queue_size: cfg.max_queue_size,
        }
    }
}

struct SubjectState {
    observers: HashMap<ObserverId, Arc<ObserverEntry>>,
    queue: OfflineQueue,
    retired: bool,
}

impl SubjectState {
    fn new(capacity: usize) -> Self {
        Self {
            observers: HashMap::new(),
            queue: OfflineQueue::new(capacity),
            retired: false,
        }
    }
}

struct Inner {
    subjects: DashMap<SubjectId, Arc<Mutex<SubjectState>>>,
    index: DashMap<ObserverId, Arc<ObserverEntry>>,
    stats: Stats,
    bus: Bus,
    settings: HubSettings,
    token: CancellationToken,
}

/// Subject → observers map with offline queuing.
///
/// Cheap to clone; clones share state. Observer workers hold a clone until their
/// observer is removed or the registry is closed.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

impl Registry {
    /// Creates an empty registry.
    ///
    /// Zero periods and sizes in `config` are raised to their minimum; use
    /// [`Config::validate`] to reject them instead.
    pub fn new(config: &Config, bus: Bus) -> Self {
        Self::with_settings(HubSettings::from(config), bus)
    }

    pub(crate) fn with_settings(settings: HubSettings, bus: Bus) -> Self {
        Self {
            inner: Arc::new(Inner {
                subjects: DashMap::new(),
                index: DashMap::new(),
                stats: Stats::default(),
                bus,
                settings: settings.clamped(),
                token: CancellationToken::new(),
            }),
        }
    }

    /// Registers a new observer for `subject`.
    ///
    /// The observer first receives `connection_established`, then the subject's queued
    /// updates as one `batch_update` (if any), then regular batches. Must be called
    /// inside a tokio runtime.
    pub fn connect(&self, subject: SubjectId, sink: Arc<dyn ObserverSink>) -> ObserverId {
        let settings = self.inner.settings;
        let entry = Arc::new(ObserverEntry::new(
            subject.clone(),
            sink,
            settings.batch_max_size,
            settings.heartbeat_interval.saturating_mul(2),
            self.inner.token.child_token(),
        ));
        let id = entry.id;

        let backlog = self.with_subject(&subject, |st| {
            st.observers.insert(id, Arc::clone(&entry));
            st.queue.drain()
        });
        self.inner.index.insert(id, Arc::clone(&entry));
        self.inner.stats.connected();

        info!(subject = %subject, observer = %id, backlog = backlog.len(), "observer connected");
        self.inner.bus.publish(
            Event::new(EventKind::ObserverConnected)
                .with_subject(&subject)
                .with_observer(id)
                .with_count(backlog.len()),
        );

        tokio::spawn(dispatcher::run(
            self.clone(),
            Arc::clone(&entry),
            backlog,
            settings.batch_interval,
        ));
        tokio::spawn(heartbeat::run(self.clone(), entry, settings.heartbeat_interval));
        id
    }

    /// Removes an observer. Returns `false` if it was not connected.
    pub fn disconnect(&self, id: ObserverId) -> bool {
        self.remove(id, DisconnectReason::Client)
    }

    /// Routes an update to every observer of `subject`, or to its offline queue.
    pub fn publish(&self, subject: &SubjectId, update: Update) -> Delivery {
        let delivery = self.with_subject(subject, |st| {
            if st.observers.is_empty() {
                let evicted = st.queue.push(update).is_some();
                return (Delivery::Queued { evicted }, st.queue.len());
            }
            for entry in st.observers.values() {
                entry.buffer.push(update.clone());
            }
            (Delivery::Observers(st.observers.len()), 0)
        });

        match delivery {
            (Delivery::Observers(n), _) => {
                for _ in 0..n {
                    self.inner.stats.message_sent();
                }
            }
            (Delivery::Queued { evicted }, len) => {
                self.inner.stats.message_sent();
                if evicted {
                    self.inner.stats.queue_eviction();
                    warn!(subject = %subject, len, "offline queue full, dropped oldest update");
                    self.inner.bus.publish(
                        Event::new(EventKind::QueueOverflow)
                            .with_subject(subject)
                            .with_count(len),
                    );
                }
            }
        }
        delivery.0
    }

    /// Refreshes an observer's liveness. Returns `false` for unknown observers.
    pub fn record_contact(&self, id: ObserverId) -> bool {
        match self.inner.index.get(&id) {
            Some(entry) => {
                entry.touch();
                true
            }
            None => false,
        }
    }

    /// Handles a message received from an observer's client.
    ///
    /// Any message counts as contact; a `ping` is answered with a `pong` right away.
    /// Returns `false` for unknown observers or if the reply could not be sent.
    pub async fn handle_client_message(&self, id: ObserverId, msg: ClientMessage) -> bool {
        let Some(entry) = self.inner.index.get(&id).map(|e| Arc::clone(e.value())) else {
            return false;
        };
        entry.touch();

        match msg {
            ClientMessage::Pong => true,
            ClientMessage::Ping => dispatcher::deliver(self, &entry, Update::pong()).await,
        }
    }

    /// Returns the connected observers of `subject`.
    pub fn observers(&self, subject: &SubjectId) -> Vec<ObserverInfo> {
        self.existing(subject)
            .map(|state| state.lock().observers.values().map(|o| o.info()).collect())
            .unwrap_or_default()
    }

    /// Returns the number of updates waiting in the offline queue of `subject`.
    pub fn queued(&self, subject: &SubjectId) -> usize {
        self.existing(subject)
            .map(|state| state.lock().queue.len())
            .unwrap_or(0)
    }

    /// Number of subjects currently tracked.
    pub fn subject_count(&self) -> usize {
        self.inner.subjects.len()
    }

    /// Snapshot of the delivery counters.
    pub fn stats(&self) -> Counters {
        self.inner.stats.snapshot()
    }

    /// Disconnects every observer and stops their workers.
    pub fn close(&self) {
        let ids: Vec<ObserverId> = self.inner.index.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.remove(id, DisconnectReason::Shutdown);
        }
        self.inner.token.cancel();
    }

    /// Removes an observer exactly once; later calls for the same id return `false`.
    pub(crate) fn remove(&self, id: ObserverId, reason: DisconnectReason) -> bool {
        let Some((_, entry)) = self.inner.index.remove(&id) else {
            return false;
        };
        entry.token.cancel();

        if let Some(state) = self.existing(&entry.subject) {
            let mut st = state.lock();
            st.observers.remove(&id);
            if st.observers.is_empty() && st.queue.is_empty() {
                st.retired = true;
                self.inner
                    .subjects
                    .remove_if(&entry.subject, |_, v| Arc::ptr_eq(v, &state));
            }
        }
        self.inner.stats.disconnected();

        let subject = &entry.subject;
        let event = match &reason {
            DisconnectReason::Client | DisconnectReason::Shutdown => {
                debug!(subject = %subject, observer = %id, ?reason, "observer disconnected");
                Event::new(EventKind::ObserverDisconnected)
            }
            DisconnectReason::SendFailed(err) => {
                self.inner.stats.error();
                warn!(subject = %subject, observer = %id, error = %err, "observer send failed, disconnecting");
                Event::new(EventKind::ObserverSendFailed).with_reason(err.as_label())
            }
            DisconnectReason::HeartbeatTimeout => {
                self.inner.stats.error();
                warn!(subject = %subject, observer = %id, "observer missed heartbeats, evicting");
                Event::new(EventKind::ObserverEvicted)
            }
        };
        self.inner
            .bus
            .publish(event.with_subject(subject).with_observer(id));
        true
    }

    fn existing(&self, subject: &SubjectId) -> Option<Arc<Mutex<SubjectState>>> {
        self.inner.subjects.get(subject).map(|s| Arc::clone(s.value()))
    }

    /// Runs `f` under the lock of a live (non-retired) state for `subject`.
    fn with_subject<R>(&self, subject: &SubjectId, f: impl FnOnce(&mut SubjectState) -> R) -> R {
        let capacity = self.inner.settings.max_queue_size;
        loop {
            let state = Arc::clone(
                self.inner
                    .subjects
                    .entry(subject.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(SubjectState::new(capacity))))
                    .value(),
            );
            let mut guard = state.lock();
            if guard.retired {
                continue;
            }
            return f(&mut guard);
        }
    }
}

impl UpdateSink for Registry {
    fn publish(&self, subject: &SubjectId, update: Update) {
        Registry::publish(self, subject, update);
    }
}
