//! In-memory job table.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sync_core::{Error, Job, JobId, JobStatus, Result, StoreErrorCode};

use crate::query::select_due;
use crate::JobStore;

/// Job store backed by a `HashMap`. Contents are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_jobs(jobs: impl IntoIterator<Item = Job>) -> Self {
        Self {
            jobs: RwLock::new(jobs.into_iter().map(|job| (job.id, job)).collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: Job) -> Result<()> {
        let mut jobs = self.jobs.write();
        if jobs.contains_key(&job.id) {
            return Err(Error::store(
                StoreErrorCode::WriteFailed,
                format!("job {} already exists", job.id),
            ));
        }
        jobs.insert(job.id, job);
        Ok(())
    }

    async fn load(&self, id: JobId) -> Result<Option<Job>> {
        Ok(self.jobs.read().get(&id).cloned())
    }

    async fn save(&self, job: &Job) -> Result<()> {
        let mut jobs = self.jobs.write();
        match jobs.get_mut(&job.id) {
            Some(slot) => {
                *slot = job.clone();
                Ok(())
            }
            None => Err(Error::not_found(job.id)),
        }
    }

    async fn save_if_status(&self, job: &Job, expected: JobStatus) -> Result<bool> {
        let mut jobs = self.jobs.write();
        let slot = jobs.get_mut(&job.id).ok_or_else(|| Error::not_found(job.id))?;
        if slot.status != expected {
            return Ok(false);
        }
        *slot = job.clone();
        Ok(true)
    }

    async fn due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<JobId>> {
        Ok(select_due(self.jobs.read().values(), now))
    }

    async fn list(&self) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self.jobs.read().values().cloned().collect();
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }
}
