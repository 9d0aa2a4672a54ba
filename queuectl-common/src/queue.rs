//! Admission and query facade over the [`JobStore`].
//!
//! This is the surface the CLI talks to: it fills in defaults, turns the
//! store's booleans into user-level errors, and owns the dead letter queue
//! operations.

use std::collections::HashMap;

use thiserror::Error;
use uuid::Uuid;

use crate::job::{Job, JobRequest, JobState};
use crate::store::{JobStore, StoreError};

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("a job with id '{0}' already exists")]
    DuplicateId(String),
    #[error("job '{0}' not found")]
    NotFound(String),
    #[error("job '{id}' is not in the dead letter queue (state: {state})")]
    InvalidState { id: String, state: JobState },
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type QueueResult<T> = std::result::Result<T, QueueError>;

pub struct Queue {
    store: JobStore,
    default_max_retries: i32,
}

impl Queue {
    pub fn new(store: JobStore, default_max_retries: i32) -> Self {
        Self {
            store,
            default_max_retries,
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Admit a new job, generating an id when the descriptor omits one and
    /// defaulting `max_retries` from configuration.
    pub async fn submit(&self, request: JobRequest) -> QueueResult<Job> {
        let id = request.id.unwrap_or_else(generate_job_id);
        let max_retries = request.max_retries.unwrap_or(self.default_max_retries);
        let job = Job::new(id, request.command, max_retries);

        if self.store.enqueue(&job).await? {
            Ok(job)
        } else {
            Err(QueueError::DuplicateId(job.id))
        }
    }

    pub async fn get(&self, id: &str) -> QueueResult<Job> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| QueueError::NotFound(id.to_owned()))
    }

    pub async fn list(
        &self,
        state: Option<JobState>,
        limit: Option<u32>,
    ) -> QueueResult<Vec<Job>> {
        Ok(self.store.list(state, limit).await?)
    }

    /// Per-state counts, zero-filled so every state is present.
    pub async fn stats(&self) -> QueueResult<HashMap<JobState, u64>> {
        let mut stats = self.store.stats().await?;
        for state in JobState::ALL {
            stats.entry(state).or_insert(0);
        }
        Ok(stats)
    }

    pub async fn delete(&self, id: &str) -> QueueResult<()> {
        if self.store.delete(id).await? {
            Ok(())
        } else {
            Err(QueueError::NotFound(id.to_owned()))
        }
    }

    /// Give a dead job a fresh start: back to `pending` with its attempt
    /// counter and failure bookkeeping cleared.
    pub async fn requeue_from_dead(&self, id: &str) -> QueueResult<Job> {
        let mut job = self.get(id).await?;
        if job.state != JobState::Dead {
            return Err(QueueError::InvalidState {
                id: job.id,
                state: job.state,
            });
        }

        job.state = JobState::Pending;
        job.attempts = 0;
        job.error_message = None;
        job.next_retry_at = None;

        if self.store.update(&job).await? {
            Ok(job)
        } else {
            Err(QueueError::NotFound(id.to_owned()))
        }
    }

    /// Drop every job in the dead letter queue, returning how many went.
    pub async fn clear_dead(&self) -> QueueResult<usize> {
        let dead = self.store.list(Some(JobState::Dead), None).await?;
        let mut cleared = 0;
        for job in dead {
            if self.store.delete(&job.id).await? {
                cleared += 1;
            }
        }
        Ok(cleared)
    }
}

fn generate_job_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("job-{}", &uuid[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_queue() -> (tempfile::TempDir, Queue) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let store = JobStore::new(dir.path().join("test.db"))
            .await
            .expect("failed to open store");
        (dir, Queue::new(store, 3))
    }

    #[tokio::test]
    async fn test_submit_generates_id_and_defaults_max_retries() {
        let (_dir, queue) = test_queue().await;
        let job = queue
            .submit(JobRequest::from_command("echo hello"))
            .await
            .unwrap();

        assert!(job.id.starts_with("job-"));
        assert_eq!(job.id.len(), "job-".len() + 8);
        assert_eq!(job.max_retries, 3);
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(queue.get(&job.id).await.unwrap().command, "echo hello");
    }

    #[tokio::test]
    async fn test_submit_honours_explicit_fields() {
        let (_dir, queue) = test_queue().await;
        let request: JobRequest =
            serde_json::from_str(r#"{"id": "job1", "command": "echo hi", "max_retries": 5}"#)
                .unwrap();
        let job = queue.submit(request).await.unwrap();

        assert_eq!(job.id, "job1");
        assert_eq!(job.max_retries, 5);
    }

    #[tokio::test]
    async fn test_submit_rejects_duplicates() {
        let (_dir, queue) = test_queue().await;
        let mut request = JobRequest::from_command("x");
        request.id = Some("dup".to_owned());
        queue.submit(request.clone()).await.unwrap();

        request.command = "y".to_owned();
        let error = queue.submit(request).await.unwrap_err();
        assert!(matches!(error, QueueError::DuplicateId(id) if id == "dup"));
        // First submission wins.
        assert_eq!(queue.get("dup").await.unwrap().command, "x");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (_dir, queue) = test_queue().await;
        assert!(matches!(
            queue.get("nope").await.unwrap_err(),
            QueueError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_stats_is_zero_filled() {
        let (_dir, queue) = test_queue().await;
        queue
            .submit(JobRequest::from_command("echo"))
            .await
            .unwrap();

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.len(), JobState::ALL.len());
        assert_eq!(stats[&JobState::Pending], 1);
        assert_eq!(stats[&JobState::Dead], 0);
    }

    #[tokio::test]
    async fn test_requeue_from_dead_resets_the_job() {
        let (_dir, queue) = test_queue().await;
        let mut dead = Job::new("D", "false", 3);
        dead.state = JobState::Dead;
        dead.attempts = 3;
        dead.error_message = Some("Exit code 1".to_owned());
        queue.store().enqueue(&dead).await.unwrap();

        let requeued = queue.requeue_from_dead("D").await.unwrap();
        assert_eq!(requeued.state, JobState::Pending);
        assert_eq!(requeued.attempts, 0);
        assert!(requeued.error_message.is_none());
        assert!(requeued.next_retry_at.is_none());

        let stored = queue.get("D").await.unwrap();
        assert_eq!(stored.state, JobState::Pending);
        assert_eq!(stored.attempts, 0);
    }

    #[tokio::test]
    async fn test_requeue_rejects_non_dead_jobs() {
        let (_dir, queue) = test_queue().await;
        queue
            .submit(JobRequest {
                id: Some("alive".to_owned()),
                command: "echo".to_owned(),
                max_retries: None,
            })
            .await
            .unwrap();

        let error = queue.requeue_from_dead("alive").await.unwrap_err();
        assert!(matches!(
            error,
            QueueError::InvalidState {
                state: JobState::Pending,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_clear_dead_removes_only_dead_jobs() {
        let (_dir, queue) = test_queue().await;
        for id in ["d1", "d2"] {
            let mut job = Job::new(id, "false", 1);
            job.state = JobState::Dead;
            job.attempts = 1;
            queue.store().enqueue(&job).await.unwrap();
        }
        queue
            .submit(JobRequest::from_command("echo"))
            .await
            .unwrap();

        assert_eq!(queue.clear_dead().await.unwrap(), 2);
        let stats = queue.stats().await.unwrap();
        assert_eq!(stats[&JobState::Dead], 0);
        assert_eq!(stats[&JobState::Pending], 1);
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let (_dir, queue) = test_queue().await;
        assert!(matches!(
            queue.delete("nope").await.unwrap_err(),
            QueueError::NotFound(_)
        ));
    }
}
