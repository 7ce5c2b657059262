//! # Demo: a flaky task reported to a live observer
//!
//! A task fails twice with a retryable `connection` error and then succeeds.
//! An observer connected through a [`ChannelSink`] prints every frame it receives,
//! while [`LogWriter`] renders diagnostic events and [`RetryMetrics`] sums retries.
//!
//! ## Run
//! ```bash
//! RUST_LOG=info cargo run --example retry_updates
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use serde_json::json;
use taskpulse::{
    AttemptContext, ChannelSink, Config, LogWriter, RetryMetrics, Runtime, Submission, TaskError,
    WorkFn,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut cfg = Config::from_env()?;
    cfg.backoff.base = Duration::from_millis(200);
    cfg.backoff.max = Duration::from_secs(2);
    cfg.batch_interval = Duration::from_millis(50);

    let metrics = RetryMetrics::new();
    let rt = Runtime::builder(cfg)
        .with_subscriber(Arc::new(LogWriter::new()))
        .with_subscriber(Arc::new(metrics.clone()))
        .start()?;

    let (sink, mut rx) = ChannelSink::new(128);
    let observer = rt.connect("agent-7".into(), Arc::new(sink));
    let printer = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            match serde_json::to_string(&update) {
                Ok(line) => println!("{line}"),
                Err(err) => eprintln!("encode error: {err}"),
            }
        }
    });

    let calls = Arc::new(AtomicU32::new(0));
    let work = WorkFn::arc("sync-inventory", move |ctx: AttemptContext| {
        let calls = Arc::clone(&calls);
        async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            ctx.report_progress(25.0, Some("fetching"));
            tokio::time::sleep(Duration::from_millis(100)).await;
            if n < 2 {
                return Err(TaskError::kind("connection", "upstream reset"));
            }
            ctx.report_progress(100.0, Some("done"));
            Ok(json!({"items": 42}))
        }
    });

    let snap = rt
        .submit(Submission::new("agent-7", work).with_task_id("sync-1"))?
        .wait()
        .await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    println!("final: {}", serde_json::to_string_pretty(&snap)?);
    println!("stats: {}", serde_json::to_string(&rt.stats())?);

    rt.disconnect(observer);
    rt.shutdown().await?;
    printer.await?;
    println!("retries: {}", serde_json::to_string(&metrics.summary())?);
    Ok(())
}
