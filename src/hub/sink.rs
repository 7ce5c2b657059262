//! # Delivery seams.
//!
//! - [`ObserverSink`]: implemented by the transport; delivers one update to one client.
//! - [`ChannelSink`]: an `mpsc`-backed sink for transports that pump a channel.
//! - [`UpdateSink`]: what the execution engine publishes into (the [`Registry`](crate::Registry)
//!   in production, a recorder in tests).

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::SendError;
use crate::ids::SubjectId;
use crate::updates::Update;

/// Transport end of one observer connection.
///
/// Called from the observer's dispatcher and heartbeat workers, possibly concurrently.
/// Any error marks the observer as dead.
#[async_trait]
pub trait ObserverSink: Send + Sync + 'static {
    /// Delivers one update.
    async fn send(&self, update: Update) -> Result<(), SendError>;
}

/// Sink forwarding updates into a bounded channel.
///
/// A full channel applies backpressure to this observer's workers only.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<Update>,
}

impl ChannelSink {
    /// Creates a sink and the receiving half the transport reads from.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Update>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ObserverSink for ChannelSink {
    async fn send(&self, update: Update) -> Result<(), SendError> {
        self.tx.send(update).await.map_err(|_| SendError::Closed)
    }
}

/// Destination of updates produced by the execution engine.
pub trait UpdateSink: Send + Sync + 'static {
    /// Routes an update to the subject's observers (or its offline queue).
    fn publish(&self, subject: &SubjectId, update: Update);
}

#[cfg(test)]
pub(crate) mod testing {
    use parking_lot::Mutex;

    use super::*;

    /// Records every published update.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub(crate) updates: Mutex<Vec<(SubjectId, Update)>>,
    }

    impl RecordingSink {
        pub(crate) fn task_updates(&self) -> Vec<crate::updates::TaskUpdate> {
            self.updates
                .lock()
                .iter()
                .filter_map(|(_, u)| u.as_task_update().cloned())
                .collect()
        }
    }

    impl UpdateSink for RecordingSink {
        fn publish(&self, subject: &SubjectId, update: Update) {
            self.updates.lock().push((subject.clone(), update));
        }
    }

    /// Sink that always fails.
    pub(crate) struct BrokenSink;

    #[async_trait]
    impl ObserverSink for BrokenSink {
        async fn send(&self, _update: Update) -> Result<(), SendError> {
            Err(SendError::Failed("broken pipe".into()))
        }
    }
}
