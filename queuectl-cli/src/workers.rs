//! Worker commands: the supervising pool and the per-process entry point.

use std::path::Path;
use std::sync::atomic::Ordering;

use anyhow::Context;

use queuectl_common::config::Config;
use queuectl_common::retry::RetryPolicy;
use queuectl_common::store::JobStore;
use queuectl_worker::pool::WorkerPool;
use queuectl_worker::runner::ShellRunner;
use queuectl_worker::signals::wait_for_shutdown_signal;
use queuectl_worker::worker::Worker;

pub async fn start(config: &Config, config_path: &Path, count: u32) -> anyhow::Result<()> {
    // Open the store once up front so a bad db path fails here instead of
    // in every child.
    JobStore::new(config.db_path())
        .await
        .with_context(|| format!("failed to open the job store at {}", config.db_path()))?;

    println!("Starting {count} worker(s). Press Ctrl+C to stop.");
    let pool = WorkerPool::spawn(count, config_path).context("failed to spawn workers")?;
    pool.run().await;
    Ok(())
}

/// The hidden `worker run` entry point: one worker loop, wired to the
/// process's own shutdown signals.
pub async fn run(config: &Config, worker_id: &str) -> anyhow::Result<()> {
    let store = JobStore::new(config.db_path())
        .await
        .with_context(|| format!("failed to open the job store at {}", config.db_path()))?;

    let worker = Worker::new(
        worker_id,
        store,
        ShellRunner::new(),
        RetryPolicy::new(config.backoff_base()),
    );
    let shutdown = worker.shutdown_handle();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        shutdown.store(true, Ordering::SeqCst);
    });

    worker.run().await;
    Ok(())
}
