//! The worker pool: N worker loops in separate OS processes.
//!
//! Workers live in their own address spaces on purpose: the store's
//! transactional semantics are the only coordination between them, which
//! is exactly the contract production deployments run under. Each child
//! re-invokes the current executable's internal `worker run` entry point
//! and opens its own database handle.

use std::io;
use std::path::Path;
use std::process::ExitStatus;
use std::time::Duration;

use futures::future::select_all;
use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::signals::wait_for_shutdown_signal;

/// How long a child gets to finish its in-flight job after shutdown is
/// requested, before it is killed outright.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

struct PoolWorker {
    worker_id: String,
    child: Child,
}

pub struct WorkerPool {
    children: Vec<PoolWorker>,
}

impl WorkerPool {
    /// Spawn `count` worker processes sharing the configuration at
    /// `config_path`.
    pub fn spawn(count: u32, config_path: &Path) -> io::Result<Self> {
        let exe = std::env::current_exe()?;
        let mut children = Vec::with_capacity(count as usize);

        for i in 0..count {
            let worker_id = format!("worker-{}", i + 1);
            let child = spawn_worker(&exe, config_path, &worker_id)?;
            info!(worker_id, pid = child.id(), "started worker");
            children.push(PoolWorker { worker_id, child });
        }

        Ok(Self { children })
    }

    /// Supervise the pool: wait for a shutdown signal (forwarding it to
    /// every child, with a grace period each) or for all children to exit
    /// on their own. Children are not restarted.
    pub async fn run(mut self) {
        let shutdown = wait_for_shutdown_signal();
        tokio::pin!(shutdown);

        while !self.children.is_empty() {
            let exited = tokio::select! {
                _ = &mut shutdown => None,
                exited = wait_any(&mut self.children) => Some(exited),
            };

            match exited {
                Some((index, result)) => {
                    let worker = self.children.remove(index);
                    report_exit(&worker.worker_id, result);
                }
                None => {
                    info!("shutting down workers");
                    self.shutdown().await;
                    return;
                }
            }
        }

        info!("all workers exited");
    }

    async fn shutdown(&mut self) {
        for worker in &mut self.children {
            terminate(&mut worker.child);
        }

        for worker in &mut self.children {
            match tokio::time::timeout(SHUTDOWN_GRACE, worker.child.wait()).await {
                Ok(result) => report_exit(&worker.worker_id, result),
                Err(_) => {
                    warn!(worker_id = %worker.worker_id, "worker did not stop in time, killing it");
                    if let Err(error) = worker.child.kill().await {
                        warn!(worker_id = %worker.worker_id, %error, "failed to kill worker");
                    }
                }
            }
        }

        info!("all workers stopped");
    }
}

fn spawn_worker(exe: &Path, config_path: &Path, worker_id: &str) -> io::Result<Child> {
    Command::new(exe)
        .arg("--config")
        .arg(config_path)
        .arg("worker")
        .arg("run")
        .arg("--worker-id")
        .arg(worker_id)
        .spawn()
}

/// Wait for any child to exit, yielding its index.
async fn wait_any(children: &mut [PoolWorker]) -> (usize, io::Result<ExitStatus>) {
    let waits = children
        .iter_mut()
        .map(|worker| Box::pin(worker.child.wait()));
    let (result, index, _) = select_all(waits).await;
    (index, result)
}

fn report_exit(worker_id: &str, result: io::Result<ExitStatus>) {
    match result {
        Ok(status) if status.success() => info!(worker_id, "worker exited"),
        Ok(status) => warn!(worker_id, %status, "worker exited abnormally"),
        Err(error) => warn!(worker_id, %error, "failed to wait for worker"),
    }
}

/// Ask a child to stop gracefully. The child's own signal handler flips
/// its worker's shutdown flag, so an in-flight job still completes.
#[cfg(unix)]
fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        // SAFETY: sending SIGTERM to a pid we just spawned and still own.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    child.start_kill().ok();
}
