//! Retry gate and backoff policy.
//!
//! Everything here is pure: callers pass the job snapshot and the clock
//! reading, nothing touches storage.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::job::{Job, JobStatus};

/// Retry limits and backoff for failed attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retry budget given to newly created jobs
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff after a transient (non rate-limit) failure
    #[serde(default = "default_initial_backoff_secs")]
    pub initial_backoff_secs: u64,
    /// Multiplier applied per consecutive failure
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    /// Upper bound for a single backoff
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    /// Floor for upstream-provided rate limit waits
    #[serde(default = "default_min_rate_limit_wait_secs")]
    pub min_rate_limit_wait_secs: u64,
    /// Ceiling for upstream-provided rate limit waits
    #[serde(default = "default_max_rate_limit_wait_secs")]
    pub max_rate_limit_wait_secs: u64,
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_backoff_secs() -> u64 {
    30
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_max_backoff_secs() -> u64 {
    900
}

fn default_min_rate_limit_wait_secs() -> u64 {
    1
}

fn default_max_rate_limit_wait_secs() -> u64 {
    3600
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_secs: default_initial_backoff_secs(),
            backoff_factor: default_backoff_factor(),
            max_backoff_secs: default_max_backoff_secs(),
            min_rate_limit_wait_secs: default_min_rate_limit_wait_secs(),
            max_rate_limit_wait_secs: default_max_rate_limit_wait_secs(),
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(Error::config("retry.max_retries must be >= 1"));
        }
        if self.backoff_factor < 1.0 {
            return Err(Error::config("retry.backoff_factor must be >= 1.0"));
        }
        if self.min_rate_limit_wait_secs == 0 {
            return Err(Error::config("retry.min_rate_limit_wait_secs must be >= 1"));
        }
        if self.max_rate_limit_wait_secs < self.min_rate_limit_wait_secs {
            return Err(Error::config(
                "retry.max_rate_limit_wait_secs must be >= retry.min_rate_limit_wait_secs",
            ));
        }
        Ok(())
    }

    /// Backoff before the next attempt after a transient failure.
    ///
    /// `failures_so_far` is 0 for the first failure.
    pub fn backoff_for(&self, failures_so_far: u32) -> Duration {
        let exp = failures_so_far.min(32) as i32;
        let secs = (self.initial_backoff_secs as f64 * self.backoff_factor.powi(exp)).ceil();
        let capped = secs.min(self.max_backoff_secs as f64).max(1.0) as u64;
        saturating_seconds(capped)
    }

    /// Wait to honour for a rate limit signal, clamped between the
    /// configured floor and ceiling. Never zero, so `retry_after` always
    /// lands strictly in the future.
    pub fn rate_limit_wait(&self, wait_seconds: u64) -> u64 {
        let ceiling = self.max_rate_limit_wait_secs.max(self.min_rate_limit_wait_secs);
        wait_seconds.clamp(self.min_rate_limit_wait_secs, ceiling)
    }
}

/// Whole seconds as a `Duration`, saturating instead of overflowing.
pub fn saturating_seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

/// `now + delay`, saturating at the latest representable instant.
pub fn retry_at(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    now.checked_add_signed(delay)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Whether a job that was backed off may be attempted again at `now`.
///
/// Holds when the job is `rate_limited` (or `pending` after a transient
/// failure), its `retry_after` has been reached, and retry budget remains.
pub fn is_eligible_for_retry(job: &Job, now: DateTime<Utc>) -> bool {
    let waiting = matches!(job.status, JobStatus::RateLimited | JobStatus::Pending);
    match job.retry_after {
        Some(retry_after) => waiting && retry_after <= now && job.retry_count < job.max_retries,
        None => false,
    }
}

/// Whether the scheduler should dispatch the job at `now`: either a fresh
/// `pending` job or one that passes the retry gate.
pub fn is_due(job: &Job, now: DateTime<Utc>) -> bool {
    match (job.status, job.retry_after) {
        (JobStatus::Pending, None) => job.retry_count < job.max_retries,
        _ => is_eligible_for_retry(job, now),
    }
}

/// Instant the job became (or becomes) due; used to order the due queue.
pub fn due_at(job: &Job) -> DateTime<Utc> {
    job.retry_after.unwrap_or(job.created_at)
}
