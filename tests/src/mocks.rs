//! Mock implementations for testing.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use job_store::{JobStore, MemoryJobStore};
use supplier::{CatalogSource, ProductPage, SupplierError};
use sync_core::{Error, Job, JobId, JobStatus, Outcome, ProgressDelta, Result, StoreErrorCode};
use worker::JobExecutor;

/// Executor that replays queued outcomes in order.
///
/// Once the script runs out every attempt succeeds with no progress.
#[derive(Clone, Default)]
pub struct ScriptedExecutor {
    outcomes: Arc<Mutex<VecDeque<Outcome>>>,
    calls: Arc<Mutex<Vec<JobId>>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcomes(outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        let executor = Self::new();
        executor.outcomes.lock().extend(outcomes);
        executor
    }

    pub fn push(&self, outcome: Outcome) {
        self.outcomes.lock().push_back(outcome);
    }

    /// Job ids in the order they were executed.
    pub fn calls(&self) -> Vec<JobId> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl JobExecutor for ScriptedExecutor {
    async fn execute(&self, job: &Job) -> Outcome {
        self.calls.lock().push(job.id);
        self.outcomes
            .lock()
            .pop_front()
            .unwrap_or_else(|| Outcome::success(ProgressDelta::new()))
    }
}

/// In-memory store that can be told to fail.
#[derive(Clone, Default)]
pub struct FlakyStore {
    inner: Arc<MemoryJobStore>,
    fail_due_jobs: Arc<Mutex<bool>>,
    fail_saves: Arc<Mutex<bool>>,
}

impl FlakyStore {
    pub fn new(inner: MemoryJobStore) -> Self {
        Self {
            inner: Arc::new(inner),
            ..Default::default()
        }
    }

    /// Make the due-job query fail.
    pub fn set_fail_due_jobs(&self, fail: bool) {
        *self.fail_due_jobs.lock() = fail;
    }

    /// Make every save fail.
    pub fn set_fail_saves(&self, fail: bool) {
        *self.fail_saves.lock() = fail;
    }

    pub fn inner(&self) -> &MemoryJobStore {
        &self.inner
    }
}

#[async_trait]
impl JobStore for FlakyStore {
    async fn insert(&self, job: Job) -> Result<()> {
        self.inner.insert(job).await
    }

    async fn load(&self, id: JobId) -> Result<Option<Job>> {
        self.inner.load(id).await
    }

    async fn save(&self, job: &Job) -> Result<()> {
        if *self.fail_saves.lock() {
            return Err(Error::store(StoreErrorCode::WriteFailed, "simulated write failure"));
        }
        self.inner.save(job).await
    }

    async fn save_if_status(&self, job: &Job, expected: JobStatus) -> Result<bool> {
        if *self.fail_saves.lock() {
            return Err(Error::store(StoreErrorCode::WriteFailed, "simulated write failure"));
        }
        self.inner.save_if_status(job, expected).await
    }

    async fn due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<JobId>> {
        if *self.fail_due_jobs.lock() {
            return Err(Error::store(StoreErrorCode::ReadFailed, "simulated query failure"));
        }
        self.inner.due_jobs(now).await
    }

    async fn list(&self) -> Result<Vec<Job>> {
        self.inner.list().await
    }
}

/// Catalog source that replays queued pages and errors.
#[derive(Default)]
pub struct ScriptedSource {
    responses: Mutex<VecDeque<std::result::Result<ProductPage, SupplierError>>>,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_page(&self, page: ProductPage) {
        self.responses.lock().push_back(Ok(page));
    }

    pub fn push_error(&self, err: SupplierError) {
        self.responses.lock().push_back(Err(err));
    }

    /// `(category, after)` for every fetch, in order.
    pub fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl CatalogSource for ScriptedSource {
    async fn fetch_page(
        &self,
        category: &str,
        after: Option<&str>,
        _first: u32,
    ) -> std::result::Result<ProductPage, SupplierError> {
        self.calls
            .lock()
            .push((category.to_string(), after.map(str::to_string)));
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(ProductPage::default()))
    }
}
