//! Unified error types for the sync engine.
//!
//! Error codes:
//! - STORE_001-003: Job store errors
//! - JOB_001: State machine errors
//! - CONFIG_001: Configuration errors

use thiserror::Error;

use crate::job::{JobId, JobStatus};

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Job store error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    /// STORE_001: Failed to read job state
    ReadFailed,
    /// STORE_002: Failed to write job state
    WriteFailed,
    /// STORE_003: Job does not exist
    NotFound,
}

impl StoreErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ReadFailed => "STORE_001",
            Self::WriteFailed => "STORE_002",
            Self::NotFound => "STORE_003",
        }
    }
}

/// Unified error type for the sync engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Job store error with code.
    #[error("[{code}] {message}")]
    Store {
        code: &'static str,
        message: String,
    },

    /// A transition the state machine does not allow.
    #[error("[JOB_001] job {job_id} cannot {action} while {status}")]
    InvalidTransition {
        job_id: JobId,
        status: JobStatus,
        action: &'static str,
    },

    #[error("[CONFIG_001] invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a job store error.
    pub fn store(code: StoreErrorCode, msg: impl Into<String>) -> Self {
        Self::Store {
            code: code.code(),
            message: msg.into(),
        }
    }

    pub fn not_found(job_id: JobId) -> Self {
        Self::store(StoreErrorCode::NotFound, format!("job {} not found", job_id))
    }

    pub fn invalid_transition(job_id: JobId, status: JobStatus, action: &'static str) -> Self {
        Self::InvalidTransition {
            job_id,
            status,
            action,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Get the error code if this is a coded error.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::Store { code, .. } => Some(code),
            Self::InvalidTransition { .. } => Some("JOB_001"),
            Self::Config(_) => Some("CONFIG_001"),
            _ => None,
        }
    }

    /// Whether this error came from the job store.
    pub fn is_store_error(&self) -> bool {
        matches!(self, Self::Store { .. } | Self::Serialization(_))
    }
}
