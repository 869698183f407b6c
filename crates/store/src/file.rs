//! JSON-file job table.
//!
//! The whole table is rewritten on every mutation: serialize to a sibling
//! temp file, then rename over the real one, so a crash leaves either the
//! old or the new snapshot on disk, never a torn one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sync_core::{Error, Job, JobId, JobStatus, Result, StoreErrorCode};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::query::select_due;
use crate::JobStore;

const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    schema_version: u32,
    jobs: Vec<Job>,
}

/// Job store persisted as a single JSON document.
#[derive(Debug)]
pub struct FileJobStore {
    path: PathBuf,
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl FileJobStore {
    /// Opens the store at `path`, loading existing jobs if the file exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let jobs = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
                if snapshot.schema_version != SCHEMA_VERSION {
                    return Err(Error::store(
                        StoreErrorCode::ReadFailed,
                        format!(
                            "unsupported job store schema {} (expected {})",
                            snapshot.schema_version, SCHEMA_VERSION
                        ),
                    ));
                }
                snapshot
                    .jobs
                    .into_iter()
                    .map(|job| (job.id, job))
                    .collect::<HashMap<_, _>>()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(Error::store(
                    StoreErrorCode::ReadFailed,
                    format!("failed to read {}: {}", path.display(), e),
                ))
            }
        };

        info!(path = %path.display(), jobs = jobs.len(), "Opened job store");

        Ok(Self {
            path,
            jobs: Mutex::new(jobs),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, jobs: &HashMap<JobId, Job>) -> Result<()> {
        let mut ordered: Vec<Job> = jobs.values().cloned().collect();
        ordered.sort_by_key(|job| (job.created_at, job.id));
        let snapshot = Snapshot {
            schema_version: SCHEMA_VERSION,
            jobs: ordered,
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| write_error(parent, e))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| write_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| write_error(&self.path, e))?;

        debug!(path = %self.path.display(), bytes = bytes.len(), "Persisted job store");
        Ok(())
    }
}

fn write_error(path: &Path, e: std::io::Error) -> Error {
    Error::store(
        StoreErrorCode::WriteFailed,
        format!("failed to write {}: {}", path.display(), e),
    )
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn insert(&self, job: Job) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&job.id) {
            return Err(Error::store(
                StoreErrorCode::WriteFailed,
                format!("job {} already exists", job.id),
            ));
        }
        let id = job.id;
        jobs.insert(id, job);
        if let Err(e) = self.persist(&jobs).await {
            jobs.remove(&id);
            return Err(e);
        }
        Ok(())
    }

    async fn load(&self, id: JobId) -> Result<Option<Job>> {
        Ok(self.jobs.lock().await.get(&id).cloned())
    }

    async fn save(&self, job: &Job) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let Some(previous) = jobs.insert(job.id, job.clone()) else {
            jobs.remove(&job.id);
            return Err(Error::not_found(job.id));
        };
        if let Err(e) = self.persist(&jobs).await {
            jobs.insert(job.id, previous);
            return Err(e);
        }
        Ok(())
    }

    async fn save_if_status(&self, job: &Job, expected: JobStatus) -> Result<bool> {
        let mut jobs = self.jobs.lock().await;
        let Some(slot) = jobs.get_mut(&job.id) else {
            return Err(Error::not_found(job.id));
        };
        if slot.status != expected {
            return Ok(false);
        }
        let previous = std::mem::replace(slot, job.clone());
        if let Err(e) = self.persist(&jobs).await {
            jobs.insert(job.id, previous);
            return Err(e);
        }
        Ok(true)
    }

    async fn due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<JobId>> {
        Ok(select_due(self.jobs.lock().await.values(), now))
    }

    async fn list(&self) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self.jobs.lock().await.values().cloned().collect();
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }
}
