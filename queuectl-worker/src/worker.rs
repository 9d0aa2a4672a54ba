//! The worker loop: continuously turn eligible jobs into outcomes.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tracing::{error, info, warn};

use queuectl_common::job::{Job, JobState};
use queuectl_common::retry::RetryPolicy;
use queuectl_common::store::{JobStore, StoreError};

use crate::runner::{CommandRunner, RunOutcome};

/// How long to sleep when the queue has nothing for us.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A single serial consumer: one `Worker` never runs more than one job at
/// a time. It owns its store handle; nothing is shared with sibling
/// workers except the database file itself.
pub struct Worker<R> {
    worker_id: String,
    store: JobStore,
    runner: R,
    retry_policy: RetryPolicy,
    poll_interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl<R: CommandRunner> Worker<R> {
    pub fn new(
        worker_id: impl Into<String>,
        store: JobStore,
        runner: R,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            store,
            runner,
            retry_policy,
            poll_interval: POLL_INTERVAL,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Handle for requesting a graceful stop: set it to true and the loop
    /// exits at the top of its next cycle, after any in-flight job has
    /// finished.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Run until a shutdown request is observed. Never returns early: a
    /// store hiccup is logged and retried on the next cycle rather than
    /// crashing the worker.
    pub async fn run(&self) {
        info!(worker_id = %self.worker_id, "worker started");

        while !self.shutdown.load(Ordering::SeqCst) {
            match self.tick().await {
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(self.poll_interval).await,
                Err(error) => {
                    error!(worker_id = %self.worker_id, %error, "store error, retrying next cycle");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        // Defensive: acquire and reap would recover these leases anyway.
        if let Err(error) = self.store.release_worker(&self.worker_id).await {
            warn!(worker_id = %self.worker_id, %error, "failed to release leases on shutdown");
        }
        info!(worker_id = %self.worker_id, "worker stopped");
    }

    /// One cycle: acquire at most one job and see it through to an
    /// outcome. Returns whether a job was processed.
    pub async fn tick(&self) -> Result<bool, StoreError> {
        let Some(mut job) = self.store.acquire(&self.worker_id).await? else {
            return Ok(false);
        };

        info!(
            worker_id = %self.worker_id,
            job_id = %job.id,
            command = %job.command,
            "processing job"
        );

        // A runner is supposed to be total, but a panicking implementation
        // must not leave the job stuck in processing until its lease
        // expires.
        let outcome = match AssertUnwindSafe(self.runner.execute(&job.command))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => RunOutcome::Failure(panic_message(panic)),
        };

        self.conclude(&mut job, outcome).await?;
        Ok(true)
    }

    /// Apply the outcome of a run: completed, scheduled for retry, or dead.
    async fn conclude(&self, job: &mut Job, outcome: RunOutcome) -> Result<(), StoreError> {
        let now = Utc::now();
        job.attempts += 1;
        job.updated_at = now;

        match outcome {
            RunOutcome::Success => {
                job.state = JobState::Completed;
                job.error_message = None;
                job.next_retry_at = None;
                info!(worker_id = %self.worker_id, job_id = %job.id, "job completed");
            }
            RunOutcome::Failure(diagnostic) => {
                job.error_message = Some(diagnostic.clone());
                if job.attempts >= job.max_retries {
                    job.state = JobState::Dead;
                    job.next_retry_at = None;
                    warn!(
                        worker_id = %self.worker_id,
                        job_id = %job.id,
                        attempts = job.attempts,
                        %diagnostic,
                        "job failed permanently, moved to dead letter queue"
                    );
                } else {
                    let next_retry_at = self.retry_policy.next_retry_at(job.attempts, now);
                    job.state = JobState::Failed;
                    job.next_retry_at = Some(next_retry_at);
                    warn!(
                        worker_id = %self.worker_id,
                        job_id = %job.id,
                        attempt = job.attempts,
                        max_retries = job.max_retries,
                        %next_retry_at,
                        %diagnostic,
                        "job failed, retry scheduled"
                    );
                }
            }
        }

        self.store.update(job).await?;
        Ok(())
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(message) => *message,
        Err(panic) => match panic.downcast::<&str>() {
            Ok(message) => (*message).to_owned(),
            Err(_) => "runner panicked".to_owned(),
        },
    }
}
