//! Attempt outcomes reported by executors.

use serde::{Deserialize, Serialize};

/// Position inside a multi-category fetch, used to resume a retried job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SyncCursor {
    /// Index into the job's category list.
    pub category_index: usize,
    /// Upstream page cursor within that category.
    pub page_cursor: Option<String>,
}

/// Counts reported by a single attempt.
///
/// These are deltas: the job record adds them to its running totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProgressDelta {
    pub fetched: u64,
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    /// Where the next attempt should pick up. `None` means start of the job.
    pub cursor: Option<SyncCursor>,
}

impl ProgressDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fetched == 0 && self.created == 0 && self.updated == 0 && self.unchanged == 0
    }
}

/// Result of one execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    /// Every category was fetched and persisted.
    Success(ProgressDelta),
    /// The upstream asked us to back off.
    RateLimited {
        wait_seconds: u64,
        progress: ProgressDelta,
    },
    /// The attempt failed. `retryable` separates transient faults from
    /// structurally invalid requests.
    Failure {
        message: String,
        retryable: bool,
        progress: ProgressDelta,
    },
}

impl Outcome {
    pub fn success(progress: ProgressDelta) -> Self {
        Self::Success(progress)
    }

    pub fn rate_limited(wait_seconds: u64) -> Self {
        Self::RateLimited {
            wait_seconds,
            progress: ProgressDelta::default(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
            retryable: false,
            progress: ProgressDelta::default(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
            retryable: true,
            progress: ProgressDelta::default(),
        }
    }

    /// Attach partial progress to this outcome.
    pub fn with_progress(mut self, delta: ProgressDelta) -> Self {
        match &mut self {
            Self::Success(progress)
            | Self::RateLimited { progress, .. }
            | Self::Failure { progress, .. } => *progress = delta,
        }
        self
    }

    pub fn progress(&self) -> &ProgressDelta {
        match self {
            Self::Success(progress)
            | Self::RateLimited { progress, .. }
            | Self::Failure { progress, .. } => progress,
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::RateLimited { .. } => "rate_limited",
            Self::Failure {
                retryable: true, ..
            } => "transient_failure",
            Self::Failure {
                retryable: false, ..
            } => "fatal_failure",
        }
    }
}
