//! Job table access for the sync engine.
//!
//! The scheduler only ever talks to [`JobStore`]; backends:
//! - [`MemoryJobStore`] (tests, ephemeral runs)
//! - [`FileJobStore`] (JSON snapshot on disk, atomic replace per write)

pub mod file;
pub mod memory;
pub mod query;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sync_core::{Job, JobId, JobStatus, Result};

pub use file::FileJobStore;
pub use memory::MemoryJobStore;
pub use query::select_due;

/// Persistent table of ingestion jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Adds a new job.
    async fn insert(&self, job: Job) -> Result<()>;

    /// Reads one job.
    async fn load(&self, id: JobId) -> Result<Option<Job>>;

    /// Overwrites an existing job record.
    async fn save(&self, job: &Job) -> Result<()>;

    /// Overwrites the record only while its stored status is still
    /// `expected`. Returns `false` and writes nothing otherwise.
    ///
    /// The check and the write happen under one lock, so a concurrent
    /// writer cannot slip between them.
    async fn save_if_status(&self, job: &Job, expected: JobStatus) -> Result<bool>;

    /// Ids of jobs due at `now`, oldest due time first.
    async fn due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<JobId>>;

    /// Every job in the table.
    async fn list(&self) -> Result<Vec<Job>>;
}

/// Shared job store handle.
pub type SharedJobStore = Arc<dyn JobStore>;
