//! # Per-observer batch dispatcher.
//!
//! ```text
//! connection_established ──► batch_update(backlog)? ──► loop {
//!     wait: flush timer | buffer reached batch_max_size | cancelled
//!     take buffer ──► empty? skip : sink.send(batch_update)
//! }
//! ```
//!
//! Any send error removes the observer through the registry and ends the worker. A send
//! that is still pending when the observer's silence deadline passes evicts it instead.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::error::SendError;
use crate::hub::observer::ObserverEntry;
use crate::hub::registry::{DisconnectReason, Registry};
use crate::updates::Update;

pub(crate) async fn run(
    registry: Registry,
    observer: Arc<ObserverEntry>,
    backlog: Vec<Update>,
    interval: Duration,
) {
    let subject = observer.subject.clone();

    if !deliver(&registry, &observer, Update::connection_established(subject.clone())).await {
        return;
    }
    if !backlog.is_empty() && !deliver(&registry, &observer, Update::batch(subject.clone(), backlog)).await {
        return;
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = observer.token.cancelled() => return,
            _ = observer.buffer.filled() => {}
            _ = ticker.tick() => {}
        }

        let items = observer.buffer.take();
        if items.is_empty() {
            continue;
        }
        if !deliver(&registry, &observer, Update::batch(subject.clone(), items)).await {
            return;
        }
    }
}

/// Sends one update unless the observer is cancelled or goes silent first.
///
/// Returns `false` when the worker should stop.
pub(crate) async fn deliver(registry: &Registry, observer: &ObserverEntry, update: Update) -> bool {
    let res: Result<(), SendError> = tokio::select! {
        biased;
        _ = observer.token.cancelled() => return false,
        _ = observer.silenced() => {
            registry.remove(observer.id, DisconnectReason::HeartbeatTimeout);
            return false;
        }
        res = observer.sink.send(update) => res,
    };
    match res {
        Ok(()) => true,
        Err(err) => {
            registry.remove(observer.id, DisconnectReason::SendFailed(err));
            false
        }
    }
}
