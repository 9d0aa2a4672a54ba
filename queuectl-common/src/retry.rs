use chrono::{DateTime, Duration, Utc};

/// The retry policy used to schedule `next_retry_at` when a job fails with
/// attempts remaining: a pure exponential backoff of `backoff_base^attempts`
/// seconds, no jitter, no cap. Whether the job instead dies is the worker's
/// call, made by comparing `attempts` to `max_retries`.
#[derive(Copy, Clone, Debug)]
pub struct RetryPolicy {
    backoff_base: u32,
}

impl RetryPolicy {
    /// Bases below 2 collapse the backoff, so they are bumped to the
    /// minimum.
    pub fn new(backoff_base: u32) -> Self {
        Self {
            backoff_base: backoff_base.max(2),
        }
    }

    pub fn backoff_base(&self) -> u32 {
        self.backoff_base
    }

    /// Calculate the instant at which the next retry becomes due,
    /// `attempts` being the count after the failed run.
    pub fn next_retry_at(&self, attempts: i32, now: DateTime<Utc>) -> DateTime<Utc> {
        let delay = i64::from(self.backoff_base).saturating_pow(attempts.max(0) as u32);
        now + Duration::seconds(delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { backoff_base: 2 }
    }
}
