//! The job record and its lifecycle states.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Persisted timestamp layout: ISO-8601 UTC with fixed-width microseconds,
/// so normalized values compare lexicographically in SQL.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

pub fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT).map(|naive| naive.and_utc())
}

/// Enumeration of possible states for a Job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Waiting in the queue to be picked up by a worker.
    Pending,
    /// Picked up by a worker and currently running under a lease.
    Processing,
    /// Successfully completed by a worker.
    Completed,
    /// Failed and scheduled for a retry.
    Failed,
    /// Out of attempts; parked in the dead letter queue.
    Dead,
}

impl JobState {
    /// All states, in lifecycle order. Drives stats rendering.
    pub const ALL: [JobState; 5] = [
        JobState::Pending,
        JobState::Processing,
        JobState::Completed,
        JobState::Failed,
        JobState::Dead,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Dead => "dead",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("{0} is not a valid job state")]
pub struct ParseJobStateError(pub String);

impl FromStr for JobState {
    type Err = ParseJobStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobState::Pending),
            "processing" => Ok(JobState::Processing),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            "dead" => Ok(JobState::Dead),
            invalid => Err(ParseJobStateError(invalid.to_owned())),
        }
    }
}

/// A background job as persisted in the store.
///
/// Workers hold short-lived copies obtained from `JobStore::acquire` and
/// submit them back via `JobStore::update`; the store owns the durable
/// record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique id, chosen by the submitter or generated at admission.
    pub id: String,
    /// Opaque shell command, passed verbatim to the runner.
    pub command: String,
    pub state: JobState,
    /// Count of execution attempts already completed.
    pub attempts: i32,
    /// Total number of attempts allowed before the job is declared dead.
    pub max_retries: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// When a failed job becomes eligible again; `None` in any other state.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Last failure's diagnostic.
    pub error_message: Option<String>,
    /// Identifier of the worker holding the lease.
    pub locked_by: Option<String>,
    /// When the lease was granted.
    pub locked_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Build a fresh pending job stamped with the current instant.
    pub fn new(id: impl Into<String>, command: impl Into<String>, max_retries: i32) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            command: command.into(),
            state: JobState::Pending,
            attempts: 0,
            max_retries,
            created_at: now,
            updated_at: now,
            next_retry_at: None,
            error_message: None,
            locked_by: None,
            locked_at: None,
        }
    }
}

/// The descriptor accepted by `enqueue`: either a JSON document carrying at
/// least `command`, or built from a bare command string.
#[derive(Debug, Clone, Deserialize)]
pub struct JobRequest {
    pub id: Option<String>,
    pub command: String,
    #[serde(default, alias = "max-retries")]
    pub max_retries: Option<i32>,
}

impl JobRequest {
    pub fn from_command(command: impl Into<String>) -> Self {
        Self {
            id: None,
            command: command.into(),
            max_retries: None,
        }
    }
}
