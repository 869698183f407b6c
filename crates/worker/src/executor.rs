//! Executor seam between the scheduler and the actual ingestion work.

use std::sync::Arc;

use async_trait::async_trait;
use sync_core::{Job, Outcome};

/// Performs one attempt of a job.
///
/// Implementations never return errors: every fault is classified into an
/// [`Outcome`]. Request timeouts belong here too and surface as failures.
#[async_trait]
pub trait JobExecutor: Send + Sync + 'static {
    async fn execute(&self, job: &Job) -> Outcome;
}

/// Shared executor handle.
pub type SharedExecutor = Arc<dyn JobExecutor>;
