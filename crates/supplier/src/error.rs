//! Upstream error classification.
//!
//! Transient faults (throttling, 5xx, timeouts, dropped connections) are
//! retried within the job's budget. Anything that will fail the same way
//! again (auth, other 4xx, unparseable payloads, query errors) ends the job.

use sync_core::{Outcome, ProgressDelta};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupplierError {
    /// Upstream asked us to slow down.
    #[error("throttled by supplier (retry after {retry_after_secs:?}s)")]
    Throttled { retry_after_secs: Option<u64> },

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Http(String),

    #[error("supplier returned HTTP {status}")]
    Server { status: u16 },

    #[error("supplier rejected credentials (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("supplier rejected request (HTTP {status})")]
    Client { status: u16 },

    #[error("malformed supplier response: {0}")]
    Malformed(String),

    #[error("supplier query error: {0}")]
    GraphQl(String),
}

impl SupplierError {
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(err.to_string())
        }
    }

    /// Maps a non-success HTTP status.
    pub fn from_status(status: u16, retry_after_secs: Option<u64>) -> Self {
        match status {
            429 => Self::Throttled { retry_after_secs },
            401 | 403 => Self::Unauthorized { status },
            500..=599 => Self::Server { status },
            _ => Self::Client { status },
        }
    }

    pub fn is_throttle(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Throttled { .. } | Self::Timeout | Self::Http(_) | Self::Server { .. }
        )
    }

    /// Converts the error into the attempt outcome, keeping partial progress.
    pub fn into_outcome(self, progress: ProgressDelta) -> Outcome {
        let outcome = match self {
            Self::Throttled { retry_after_secs } => {
                Outcome::rate_limited(retry_after_secs.unwrap_or(1).max(1))
            }
            ref err if err.is_retryable() => Outcome::transient(err.to_string()),
            err => Outcome::fatal(err.to_string()),
        };
        outcome.with_progress(progress)
    }
}
