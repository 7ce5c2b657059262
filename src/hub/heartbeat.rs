//! # Per-observer heartbeat monitor.
//!
//! Sends a `ping` every `interval` and evicts the observer once it has been silent for
//! more than `2 × interval`. Contact is refreshed by the registry on any inbound traffic.
//! A ping stuck behind a full transport does not hold off eviction: [`deliver`] races
//! every send against the same silence deadline.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep_until};

use crate::hub::dispatcher::deliver;
use crate::hub::observer::ObserverEntry;
use crate::hub::registry::{DisconnectReason, Registry};
use crate::updates::Update;

pub(crate) async fn run(registry: Registry, observer: Arc<ObserverEntry>, interval: Duration) {
    let mut next_ping = Instant::now() + interval;

    loop {
        tokio::select! {
            biased;
            _ = observer.token.cancelled() => return,
            _ = observer.silenced() => {
                registry.remove(observer.id, DisconnectReason::HeartbeatTimeout);
                return;
            }
            _ = sleep_until(next_ping) => {
                next_ping += interval;
                if !deliver(&registry, &observer, Update::ping()).await {
                    return;
                }
            }
        }
    }
}
