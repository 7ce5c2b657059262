use std::sync::Arc;

use crate::core::{Config, Runtime};
use crate::error::ConfigError;
use crate::events::Bus;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for configuring and starting a [`Runtime`].
pub struct RuntimeBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl RuntimeBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Sets diagnostic subscribers, replacing any added before.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Adds one diagnostic subscriber.
    pub fn with_subscriber(mut self, subscriber: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Validates the configuration and starts the runtime.
    ///
    /// Spawns the subscriber workers and the bus listener, so it must be called
    /// inside a tokio runtime.
    pub fn start(self) -> Result<Runtime, ConfigError> {
        self.cfg.validate()?;
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = SubscriberSet::new(self.subscribers, bus.clone());
        Ok(Runtime::start_internal(self.cfg, bus, subs))
    }
}
