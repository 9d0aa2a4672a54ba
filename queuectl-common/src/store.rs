//! # JobStore
//!
//! A job queue implementation backed by a single-file SQLite table.
//!
//! Every operation is a single statement (or a short idempotent sequence of
//! them), so SQLite's single-writer serialization doubles as the mutual
//! exclusion between worker processes: two concurrent `acquire` calls can
//! never lease the same job.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use thiserror::Error;

use crate::job::{format_timestamp, parse_timestamp, Job, JobState, ParseJobStateError};

/// How long a lease on a processing job remains valid. Leases older than
/// this are considered abandoned and may be stolen.
pub const LEASE_TTL: Duration = Duration::from_secs(5 * 60);

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Enumeration of errors for operations with the JobStore.
/// Errors that can originate from sqlx and are wrapped by us to provide additional context.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("connection failed with: {error}")]
    ConnectionError { error: sqlx::Error },
    #[error("{command} query failed with: {error}")]
    QueryError { command: String, error: sqlx::Error },
    #[error(transparent)]
    ParseJobStateError(#[from] ParseJobStateError),
    #[error("invalid timestamp in column {column}: {error}")]
    ParseTimestampError {
        column: &'static str,
        error: chrono::ParseError,
    },
}

/// Mirror of a `jobs` row. Timestamps stay TEXT here and are parsed into
/// `chrono` values when converting to a [`Job`], keeping the SQL
/// comparisons in `acquire` and `reap_leases` on the exact persisted form.
#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    command: String,
    state: String,
    attempts: i32,
    max_retries: i32,
    created_at: String,
    updated_at: String,
    next_retry_at: Option<String>,
    error_message: Option<String>,
    locked_by: Option<String>,
    locked_at: Option<String>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let parse = |column: &'static str, text: &str| {
            parse_timestamp(text).map_err(|error| StoreError::ParseTimestampError { column, error })
        };
        let parse_opt = |column: &'static str, text: Option<&str>| match text {
            Some(text) => parse(column, text).map(Some),
            None => Ok(None),
        };

        Ok(Job {
            state: row.state.parse::<JobState>()?,
            created_at: parse("created_at", &row.created_at)?,
            updated_at: parse("updated_at", &row.updated_at)?,
            next_retry_at: parse_opt("next_retry_at", row.next_retry_at.as_deref())?,
            locked_at: parse_opt("locked_at", row.locked_at.as_deref())?,
            id: row.id,
            command: row.command,
            attempts: row.attempts,
            max_retries: row.max_retries,
            error_message: row.error_message,
            locked_by: row.locked_by,
        })
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Durable, concurrency-safe repository of job records.
pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    /// Open (creating if missing) the database at `db_path` and ensure the
    /// schema exists. Safe to call from any number of processes.
    pub async fn new(db_path: impl AsRef<Path>) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|error| StoreError::ConnectionError { error })?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> StoreResult<()> {
        let statements = [
            r#"
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    command TEXT NOT NULL,
    state TEXT NOT NULL,
    attempts INTEGER DEFAULT 0,
    max_retries INTEGER DEFAULT 3,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    next_retry_at TEXT,
    error_message TEXT,
    locked_by TEXT,
    locked_at TEXT
)
            "#,
            "CREATE INDEX IF NOT EXISTS idx_jobs_state ON jobs (state)",
            "CREATE INDEX IF NOT EXISTS idx_jobs_next_retry ON jobs (next_retry_at)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|error| StoreError::QueryError {
                    command: "CREATE".to_owned(),
                    error,
                })?;
        }

        Ok(())
    }

    /// Insert a new job. Returns false without side effects when a job with
    /// the same id already exists; an existing record is never overwritten.
    pub async fn enqueue(&self, job: &Job) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
INSERT INTO jobs
    (id, command, state, attempts, max_retries, created_at, updated_at, next_retry_at, error_message, locked_by, locked_at)
VALUES
    (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&job.id)
        .bind(&job.command)
        .bind(job.state.as_str())
        .bind(job.attempts)
        .bind(job.max_retries)
        .bind(format_timestamp(job.created_at))
        .bind(format_timestamp(job.updated_at))
        .bind(job.next_retry_at.map(format_timestamp))
        .bind(&job.error_message)
        .bind(&job.locked_by)
        .bind(job.locked_at.map(format_timestamp))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => Ok(false),
            Err(error) => Err(StoreError::QueryError {
                command: "INSERT".to_owned(),
                error,
            }),
        }
    }

    /// Return a snapshot of the job with the given id.
    pub async fn get(&self, id: &str) -> StoreResult<Option<Job>> {
        let row: Option<JobRow> = sqlx::query_as("SELECT * FROM jobs WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| StoreError::QueryError {
                command: "SELECT".to_owned(),
                error,
            })?;

        row.map(Job::try_from).transpose()
    }

    /// Atomically select and lease the single most eligible job for
    /// `worker_id`, transitioning it to `processing`. Returns the updated
    /// snapshot, or `None` when nothing is eligible.
    ///
    /// Stale leases are swept back to `pending` first, so a job whose
    /// worker vanished becomes claimable here as soon as its lease expires.
    /// Eligibility is `pending`, or `failed` with `next_retry_at` due,
    /// ordered FIFO by `created_at` with `id` as the tie-break. `attempts`
    /// and `next_retry_at` are left untouched.
    pub async fn acquire(&self, worker_id: &str) -> StoreResult<Option<Job>> {
        let now = Utc::now();
        let threshold = now - LEASE_TTL;
        self.reap_leases(threshold).await?;

        let row: Option<JobRow> = sqlx::query_as(
            r#"
UPDATE jobs
SET
    state = 'processing',
    locked_by = ?1,
    locked_at = ?2,
    updated_at = ?2
WHERE id = (
    SELECT id FROM jobs
    WHERE
        (state = 'pending' AND (locked_by IS NULL OR locked_at < ?3))
        OR (state = 'failed' AND next_retry_at <= ?2 AND (locked_by IS NULL OR locked_at < ?3))
    ORDER BY created_at ASC, id ASC
    LIMIT 1
)
RETURNING *
            "#,
        )
        .bind(worker_id)
        .bind(format_timestamp(now))
        .bind(format_timestamp(threshold))
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| StoreError::QueryError {
            command: "UPDATE".to_owned(),
            error,
        })?;

        row.map(Job::try_from).transpose()
    }

    /// Replace the persistent record of `job.id` with the provided
    /// snapshot, clearing the lease unconditionally and stamping
    /// `updated_at`. Returns false when the id is absent.
    pub async fn update(&self, job: &Job) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
UPDATE jobs
SET
    command = ?2,
    state = ?3,
    attempts = ?4,
    max_retries = ?5,
    updated_at = ?6,
    next_retry_at = ?7,
    error_message = ?8,
    locked_by = NULL,
    locked_at = NULL
WHERE id = ?1
            "#,
        )
        .bind(&job.id)
        .bind(&job.command)
        .bind(job.state.as_str())
        .bind(job.attempts)
        .bind(job.max_retries)
        .bind(format_timestamp(Utc::now()))
        .bind(job.next_retry_at.map(format_timestamp))
        .bind(&job.error_message)
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::QueryError {
            command: "UPDATE".to_owned(),
            error,
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// List jobs ordered by `created_at` descending, optionally filtered by
    /// state and capped at `limit`.
    pub async fn list(
        &self,
        state: Option<JobState>,
        limit: Option<u32>,
    ) -> StoreResult<Vec<Job>> {
        let limit = limit.map(i64::from).unwrap_or(-1);

        let rows: Vec<JobRow> = match state {
            Some(state) => {
                sqlx::query_as(
                    "SELECT * FROM jobs WHERE state = ?1 ORDER BY created_at DESC LIMIT ?2",
                )
                .bind(state.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as("SELECT * FROM jobs ORDER BY created_at DESC LIMIT ?1")
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(|error| StoreError::QueryError {
            command: "SELECT".to_owned(),
            error,
        })?;

        rows.into_iter().map(Job::try_from).collect()
    }

    /// Exact per-state counts over the full table, taken in one statement.
    pub async fn stats(&self) -> StoreResult<HashMap<JobState, u64>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM jobs GROUP BY state")
                .fetch_all(&self.pool)
                .await
                .map_err(|error| StoreError::QueryError {
                    command: "SELECT".to_owned(),
                    error,
                })?;

        let mut stats = HashMap::new();
        for (state, count) in rows {
            stats.insert(state.parse::<JobState>()?, count as u64);
        }
        Ok(stats)
    }

    /// Permanently remove a job. Returns false when the id is absent.
    pub async fn delete(&self, id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|error| StoreError::QueryError {
                command: "DELETE".to_owned(),
                error,
            })?;

        Ok(result.rows_affected() > 0)
    }

    /// Return every processing job whose lease was granted before
    /// `expired_before` to `pending`, clearing the lease. Idempotent.
    pub async fn reap_leases(&self, expired_before: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
UPDATE jobs
SET state = 'pending', locked_by = NULL, locked_at = NULL, updated_at = ?2
WHERE state = 'processing' AND locked_at < ?1
            "#,
        )
        .bind(format_timestamp(expired_before))
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::QueryError {
            command: "UPDATE".to_owned(),
            error,
        })?;

        Ok(result.rows_affected())
    }

    /// Surrender every lease held by `worker_id`, returning the affected
    /// jobs to `pending`. Called on voluntary worker shutdown.
    pub async fn release_worker(&self, worker_id: &str) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
UPDATE jobs
SET state = 'pending', locked_by = NULL, locked_at = NULL, updated_at = ?2
WHERE state = 'processing' AND locked_by = ?1
            "#,
        )
        .bind(worker_id)
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::QueryError {
            command: "UPDATE".to_owned(),
            error,
        })?;

        Ok(result.rows_affected())
    }
}
