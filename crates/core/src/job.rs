//! Ingestion job record and its state machine.
//!
//! ```text
//! pending ──▶ running ──▶ completed
//!    ▲           │
//!    │           ├──▶ rate_limited ──▶ running (once retry_after passes)
//!    │           ├──▶ failed
//!    └───────────┘  (transient failure, backoff)
//!
//! any non-terminal ──▶ cancelled
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::outcome::{Outcome, ProgressDelta, SyncCursor};
use crate::retry::{retry_at, saturating_seconds, RetryPolicy};

/// Message recorded when rate limiting uses up the retry budget.
pub const RATE_LIMIT_EXHAUSTED: &str = "retries exhausted after rate limiting";

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    RateLimited,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RateLimited => "rate_limited",
            Self::Cancelled => "cancelled",
        }
    }

    /// Terminal states are never scheduled again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// States the scheduler may pick up.
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, Self::Pending | Self::RateLimited)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cumulative item counters across every attempt of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct JobProgress {
    pub items_fetched: u64,
    pub items_created: u64,
    pub items_updated: u64,
    pub items_unchanged: u64,
}

impl JobProgress {
    pub fn add(&mut self, delta: &ProgressDelta) {
        self.items_fetched += delta.fetched;
        self.items_created += delta.created;
        self.items_updated += delta.updated;
        self.items_unchanged += delta.unchanged;
    }
}

/// A supplier ingestion job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// Supplier categories to ingest, in order.
    pub categories: Vec<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Not dispatchable before this instant.
    pub retry_after: Option<DateTime<Utc>>,
    /// Backoff requested by the last rate limit signal.
    pub rate_limit_wait_seconds: Option<u64>,
    #[serde(default)]
    pub progress: JobProgress,
    /// Resume point left by the last unfinished attempt.
    pub cursor: Option<SyncCursor>,
    #[serde(default)]
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl Job {
    /// Creates a new pending job.
    pub fn new(categories: Vec<String>, max_retries: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            status: JobStatus::Pending,
            categories,
            retry_count: 0,
            max_retries,
            retry_after: None,
            rate_limit_wait_seconds: None,
            progress: JobProgress::default(),
            cursor: None,
            attempts: 0,
            created_at: now,
            started_at: None,
            last_activity_at: None,
            finished_at: None,
            error_message: None,
        }
    }

    /// `pending | rate_limited -> running`.
    pub fn start_attempt(&mut self, now: DateTime<Utc>) -> Result<()> {
        if !self.status.is_dispatchable() {
            return Err(Error::invalid_transition(self.id, self.status, "start"));
        }
        self.status = JobStatus::Running;
        self.started_at.get_or_insert(now);
        self.last_activity_at = Some(now);
        self.attempts += 1;
        Ok(())
    }

    /// Applies an executor outcome to a running job and returns the new status.
    ///
    /// Progress deltas are added to the totals regardless of the outcome.
    pub fn apply_outcome(
        &mut self,
        outcome: Outcome,
        now: DateTime<Utc>,
        policy: &RetryPolicy,
    ) -> Result<JobStatus> {
        if self.status != JobStatus::Running {
            return Err(Error::invalid_transition(self.id, self.status, "record an outcome"));
        }
        self.last_activity_at = Some(now);

        match outcome {
            Outcome::Success(progress) => {
                self.progress.add(&progress);
                self.cursor = None;
                self.error_message = None;
                self.finish(JobStatus::Completed, now);
            }
            Outcome::RateLimited {
                wait_seconds,
                progress,
            } => {
                self.record_partial(progress);
                self.retry_count += 1;
                if self.retry_count >= self.max_retries {
                    self.error_message = Some(RATE_LIMIT_EXHAUSTED.to_string());
                    self.finish(JobStatus::Failed, now);
                } else {
                    let wait = policy.rate_limit_wait(wait_seconds);
                    self.status = JobStatus::RateLimited;
                    self.rate_limit_wait_seconds = Some(wait);
                    self.retry_after = Some(retry_at(now, saturating_seconds(wait)));
                    self.error_message = Some(format!("rate limited, retrying in {}s", wait));
                }
            }
            Outcome::Failure {
                message,
                retryable: false,
                progress,
            } => {
                self.record_partial(progress);
                self.error_message = Some(message);
                self.finish(JobStatus::Failed, now);
            }
            Outcome::Failure {
                message,
                retryable: true,
                progress,
            } => {
                self.record_partial(progress);
                let failures_so_far = self.retry_count;
                self.retry_count += 1;
                if self.retry_count >= self.max_retries {
                    self.error_message = Some(format!("retries exhausted: {}", message));
                    self.finish(JobStatus::Failed, now);
                } else {
                    self.status = JobStatus::Pending;
                    self.retry_after = Some(retry_at(now, policy.backoff_for(failures_so_far)));
                    self.error_message = Some(message);
                }
            }
        }

        Ok(self.status)
    }

    /// Moves any non-terminal job to `cancelled`.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(Error::invalid_transition(self.id, self.status, "cancel"));
        }
        self.last_activity_at = Some(now);
        self.finish(JobStatus::Cancelled, now);
        Ok(())
    }

    /// Returns a job orphaned in `running` (the process died mid-attempt)
    /// to `pending` without charging its retry budget.
    pub fn requeue_interrupted(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != JobStatus::Running {
            return Err(Error::invalid_transition(self.id, self.status, "requeue"));
        }
        self.status = JobStatus::Pending;
        self.retry_after = None;
        self.last_activity_at = Some(now);
        self.error_message = Some("attempt interrupted by shutdown".to_string());
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn record_partial(&mut self, progress: ProgressDelta) {
        self.progress.add(&progress);
        if progress.cursor.is_some() {
            self.cursor = progress.cursor;
        }
    }

    fn finish(&mut self, status: JobStatus, now: DateTime<Utc>) {
        self.status = status;
        self.retry_after = None;
        self.finished_at = Some(now);
    }
}
