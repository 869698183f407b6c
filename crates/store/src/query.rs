//! Due-job selection shared by every backend.

use chrono::{DateTime, Utc};
use sync_core::{due_at, is_due, Job, JobId};

/// Jobs that are `pending` or `rate_limited`, whose `retry_after` is unset
/// or reached, and that still have retry budget; ordered by due time.
pub fn select_due<'a>(jobs: impl IntoIterator<Item = &'a Job>, now: DateTime<Utc>) -> Vec<JobId> {
    let mut due: Vec<&Job> = jobs.into_iter().filter(|job| is_due(job, now)).collect();
    due.sort_by_key(|job| (due_at(job), job.created_at, job.id));
    due.into_iter().map(|job| job.id).collect()
}
