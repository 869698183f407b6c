//! Job lifecycle operations outside the scheduler loop.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use job_store::JobStore;
use sync_core::{Error, Job, JobId, JobStatus, Result, RetryPolicy};

/// Creates a pending job for `categories` with the policy's retry budget.
pub async fn enqueue_job(
    store: &dyn JobStore,
    categories: Vec<String>,
    policy: &RetryPolicy,
    now: DateTime<Utc>,
) -> Result<JobId> {
    if categories.is_empty() {
        return Err(Error::config("a job needs at least one category"));
    }
    if policy.max_retries == 0 {
        return Err(Error::config("a job needs a retry budget of at least one attempt"));
    }
    let job = Job::new(categories, policy.max_retries, now);
    let id = job.id;
    info!(job_id = %id, categories = ?job.categories, max_retries = job.max_retries, "Enqueued job");
    store.insert(job).await?;
    Ok(id)
}

/// Cancels a non-terminal job. The scheduler skips it from then on, and an
/// attempt already in flight drops its outcome.
pub async fn cancel_job(store: &dyn JobStore, id: JobId, now: DateTime<Utc>) -> Result<Job> {
    loop {
        let mut job = store.load(id).await?.ok_or_else(|| Error::not_found(id))?;
        let seen = job.status;
        job.cancel(now)?;
        // Lost a race with the dispatcher; re-read and decide again
        if store.save_if_status(&job, seen).await? {
            info!(job_id = %id, previous = %seen, "Cancelled job");
            return Ok(job);
        }
    }
}

/// Returns jobs left `running` by a previous process to `pending`.
///
/// Only safe before the scheduler starts: at that point nothing in this
/// process can be mid-attempt.
pub async fn requeue_interrupted(store: &dyn JobStore, now: DateTime<Utc>) -> Result<usize> {
    let mut requeued = 0;
    for mut job in store.list().await? {
        if job.status != JobStatus::Running {
            continue;
        }
        job.requeue_interrupted(now)?;
        if !store.save_if_status(&job, JobStatus::Running).await? {
            continue;
        }
        warn!(job_id = %job.id, attempts = job.attempts, "Requeued job interrupted mid-attempt");
        requeued += 1;
    }
    Ok(requeued)
}

/// Whether any job is still pending, running, or waiting out a rate limit.
pub async fn has_active_job(store: &dyn JobStore) -> Result<bool> {
    Ok(store
        .list()
        .await?
        .iter()
        .any(|job| !job.status.is_terminal()))
}
