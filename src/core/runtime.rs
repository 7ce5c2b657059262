//! # Runtime: owner of the delivery hub, the engine and diagnostics.
//!
//! [`Runtime`] wires the components together and drives their lifecycle:
//!
//! ```text
//! RuntimeBuilder::start()
//!     ├─► Bus (diagnostic events)
//!     ├─► SubscriberSet (one worker per subscriber) ◄── listener ◄── Bus
//!     ├─► Registry (observers, offline queues, stats)
//!     └─► Engine ── publishes task updates ──► Registry
//!
//! shutdown()
//!     ├─► publish ShutdownRequested
//!     ├─► Engine::shutdown(grace) ──► AllStoppedWithin | GraceExceeded
//!     ├─► Registry::close()       (disconnect observers, stop their workers)
//!     └─► drain listener, stop subscriber workers
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use taskpulse::{AttemptContext, ChannelSink, Config, LogWriter, Runtime, Submission, TaskError, WorkFn};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let rt = Runtime::builder(Config::default())
//!         .with_subscriber(Arc::new(LogWriter::new()))
//!         .start()?;
//!
//!     let (sink, mut rx) = ChannelSink::new(64);
//!     rt.connect("agent-1".into(), Arc::new(sink));
//!
//!     let work = WorkFn::arc("index", |_ctx: AttemptContext| async { Ok::<_, TaskError>(json!(1)) });
//!     rt.submit(Submission::new("agent-1", work))?.wait().await;
//!
//!     while let Ok(update) = rx.try_recv() {
//!         println!("{}", serde_json::to_string(&update)?);
//!     }
//!     rt.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::builder::RuntimeBuilder;
use crate::core::config::Config;
use crate::engine::{Engine, ExecutionHandle, TaskSnapshot};
use crate::error::{RuntimeError, SubmitError};
use crate::events::{Bus, Event, EventKind};
use crate::hub::{Counters, Delivery, ObserverSink, Registry};
use crate::ids::{ObserverId, SubjectId, TaskId};
use crate::subscribers::{SubscriberHealth, SubscriberMonitor, SubscriberSet};
use crate::tasks::Submission;
use crate::updates::Update;

struct Listener {
    token: CancellationToken,
    join: JoinHandle<SubscriberSet>,
}

/// Explicitly constructed owner of all taskpulse components.
///
/// Share it behind an `Arc` between the transport and API layers.
pub struct Runtime {
    cfg: Config,
    bus: Bus,
    registry: Registry,
    engine: Engine,
    monitor: SubscriberMonitor,
    listener: Mutex<Option<Listener>>,
}

impl Runtime {
    /// Returns a builder for configuring and starting a runtime.
    pub fn builder(cfg: Config) -> RuntimeBuilder {
        RuntimeBuilder::new(cfg)
    }

    pub(crate) fn start_internal(cfg: Config, bus: Bus, subs: SubscriberSet) -> Self {
        let registry = Registry::new(&cfg, bus.clone());
        let engine = Engine::new(cfg.retry_policy(), Arc::new(registry.clone()), bus.clone());
        let monitor = subs.monitor();
        let listener = Self::subscriber_listener(&bus, subs);

        info!(
            heartbeat = ?cfg.heartbeat_interval,
            batch = ?cfg.batch_interval,
            max_queue = cfg.max_queue_size,
            max_retries = cfg.max_retries,
            "runtime started"
        );
        Self {
            cfg,
            bus,
            registry,
            engine,
            monitor,
            listener: Mutex::new(Some(listener)),
        }
    }

    /// Forwards bus events to the subscriber set until stopped, then hands the set back.
    fn subscriber_listener(bus: &Bus, subs: SubscriberSet) -> Listener {
        let mut rx = bus.subscribe();
        let token = CancellationToken::new();
        let stop = token.clone();

        let join = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    msg = rx.recv() => match msg {
                        Ok(ev) => subs.emit(&ev),
                        Err(RecvError::Lagged(n)) => warn!(skipped = n, "subscriber listener lagged"),
                        Err(RecvError::Closed) => break,
                    },
                    _ = stop.cancelled() => {
                        while let Ok(ev) = rx.try_recv() {
                            subs.emit(&ev);
                        }
                        break;
                    }
                }
            }
            subs
        });
        Listener { token, join }
    }

    /// Active configuration.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Diagnostic event bus.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Update channel registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Execution engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// See [`Engine::submit`].
    pub fn submit(&self, submission: Submission) -> Result<ExecutionHandle, SubmitError> {
        self.engine.submit(submission)
    }

    /// See [`Engine::cancel`].
    pub fn cancel(&self, task_id: &TaskId) -> bool {
        self.engine.cancel(task_id)
    }

    /// See [`Engine::status`].
    pub fn status(&self, task_id: &TaskId) -> Option<TaskSnapshot> {
        self.engine.status(task_id)
    }

    /// See [`Registry::connect`].
    pub fn connect(&self, subject: SubjectId, sink: Arc<dyn ObserverSink>) -> ObserverId {
        self.registry.connect(subject, sink)
    }

    /// See [`Registry::disconnect`].
    pub fn disconnect(&self, id: ObserverId) -> bool {
        self.registry.disconnect(id)
    }

    /// See [`Registry::publish`].
    pub fn publish(&self, subject: &SubjectId, update: Update) -> Delivery {
        self.registry.publish(subject, update)
    }

    /// See [`Registry::stats`].
    pub fn stats(&self) -> Counters {
        self.registry.stats()
    }

    /// Per-subscriber delivered / dropped / panic counters.
    pub fn subscriber_health(&self) -> Vec<SubscriberHealth> {
        self.monitor.health()
    }

    /// Stops the runtime.
    ///
    /// Cancels every execution and waits up to `grace` for them, then disconnects all
    /// observers and stops the subscriber workers after they drained their queues.
    /// Calling it again is a no-op.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let Some(listener) = self.listener.lock().take() else {
            return Ok(());
        };
        info!("shutdown requested");
        self.bus.publish(Event::new(EventKind::ShutdownRequested));

        let res = self.engine.shutdown(self.cfg.grace).await;
        match &res {
            Ok(()) => self.bus.publish(Event::new(EventKind::AllStoppedWithin)),
            Err(_) => self.bus.publish(Event::new(EventKind::GraceExceeded)),
        }
        self.registry.close();

        listener.token.cancel();
        if let Ok(subs) = listener.join.await {
            subs.shutdown().await;
        }
        res
    }

    /// Waits for a termination signal (Ctrl-C, `SIGTERM`), then shuts down.
    pub async fn run_until_signal(&self) -> Result<(), RuntimeError> {
        if let Err(err) = wait_for_signal().await {
            warn!(error = %err, "signal handler unavailable, shutting down");
        }
        self.shutdown().await
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = sigterm.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{Value, json};

    use super::*;
    use crate::error::TaskError;
    use crate::hub::ChannelSink;
    use crate::subscribers::RetryMetrics;
    use crate::tasks::{AttemptContext, WorkFn};
    use crate::updates::TaskStatus;

    fn config() -> Config {
        let mut cfg = Config::default();
        cfg.max_retries = 2;
        cfg.grace = Duration::from_secs(1);
        cfg
    }

    fn collect_task_updates(rx: &mut tokio::sync::mpsc::Receiver<Update>) -> Vec<(TaskStatus, Option<u64>)> {
        let mut out = Vec::new();
        while let Ok(u) = rx.try_recv() {
            for item in u.batch_items().unwrap_or_default() {
                if let Some(t) = item.as_task_update() {
                    out.push((t.status, t.delay_ms));
                }
            }
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_updates_reach_connected_observer() {
        let metrics = RetryMetrics::new();
        let rt = Runtime::builder(config())
            .with_subscriber(Arc::new(metrics.clone()))
            .start()
            .unwrap();

        let (sink, mut rx) = ChannelSink::new(64);
        rt.connect("agent".into(), Arc::new(sink));

        let work = WorkFn::arc("always-timeout", |_ctx: AttemptContext| async {
            Err::<Value, _>(TaskError::kind("timeout", "upstream slow"))
        });
        let snap = rt
            .submit(Submission::new("agent", work).with_task_id("t1"))
            .unwrap()
            .wait()
            .await;
        assert_eq!(snap.state, TaskStatus::Failed);
        assert_eq!(snap.attempts, 3);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let updates = collect_task_updates(&mut rx);
        assert_eq!(
            updates,
            vec![
                (TaskStatus::Running, None),
                (TaskStatus::Retrying, Some(1000)),
                (TaskStatus::Running, None),
                (TaskStatus::Retrying, Some(2000)),
                (TaskStatus::Running, None),
                (TaskStatus::Failed, None),
            ]
        );

        rt.shutdown().await.unwrap();
        let health = rt.subscriber_health();
        assert_eq!(health[0].name, "retry_metrics");
        assert_eq!(health[0].dropped, 0);
        assert_eq!(health[0].delivered, 3);
        let stats = metrics.get("agent").unwrap();
        assert_eq!(stats.total_retries, 2);
        assert_eq!(stats.failed_retries, 1);
        assert_eq!(stats.error_counts["timeout"], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_queue_until_observer_connects() {
        let rt = Runtime::builder(config()).start().unwrap();
        let work = WorkFn::arc("ok", |_ctx: AttemptContext| async { Ok::<_, TaskError>(json!("done")) });
        rt.submit(Submission::new("offline", work)).unwrap().wait().await;
        assert_eq!(rt.registry().queued(&"offline".into()), 2);

        let (sink, mut rx) = ChannelSink::new(16);
        rt.connect("offline".into(), Arc::new(sink));
        assert_eq!(rx.recv().await.unwrap().kind(), "connection_established");
        let backlog = rx.recv().await.unwrap();
        let statuses: Vec<TaskStatus> = backlog
            .batch_items()
            .unwrap_or_default()
            .iter()
            .filter_map(|u| u.as_task_update().map(|t| t.status))
            .collect();
        assert_eq!(statuses, vec![TaskStatus::Running, TaskStatus::Completed]);
        assert_eq!(rt.registry().queued(&"offline".into()), 0);

        rt.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_is_idempotent_and_closes_everything() {
        let rt = Runtime::builder(config()).start().unwrap();
        let (sink, _rx) = ChannelSink::new(16);
        rt.connect("a".into(), Arc::new(sink));

        rt.shutdown().await.unwrap();
        rt.shutdown().await.unwrap();
        assert_eq!(rt.stats().active_connections, 0);
        assert!(rt.engine().is_closed());

        let work = WorkFn::arc("late", |_ctx: AttemptContext| async { Ok::<_, TaskError>(Value::Null) });
        assert_eq!(
            rt.submit(Submission::new("a", work)).unwrap_err(),
            SubmitError::Closed
        );
    }
}
