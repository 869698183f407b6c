//! Single-attempt dispatch.
//!
//! One call to [`Dispatcher::dispatch`] claims a due job (`running` is
//! persisted before the executor starts), runs the executor on its own task,
//! and persists the resulting transition before returning. Both writes are
//! conditional on the stored status, so a concurrent cancel is never
//! overwritten. The scheduler
//! awaits each dispatch in turn, which is what keeps attempts per job at
//! most one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use job_store::SharedJobStore;
use sync_core::{is_due, Clock, Job, JobId, JobStatus, Outcome, Result, RetryPolicy};
use telemetry::metrics;

use crate::executor::SharedExecutor;

/// What happened to a job handed to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchResult {
    /// Not dispatched: missing, no longer due, or claimed elsewhere.
    Skipped,
    /// Attempt ran; the job now has this status. A job cancelled while its
    /// attempt ran reports `Cancelled` and the outcome is dropped.
    Finished(JobStatus),
}

/// Runs attempts and applies their outcomes.
pub struct Dispatcher {
    store: SharedJobStore,
    executor: SharedExecutor,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    /// Final states whose write failed; retried before the next poll.
    unsaved: Mutex<HashMap<JobId, Job>>,
}

impl Dispatcher {
    pub fn new(
        store: SharedJobStore,
        executor: SharedExecutor,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            executor,
            clock,
            policy,
            unsaved: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Number of outcomes still waiting to be written.
    pub fn unsaved_count(&self) -> usize {
        self.unsaved.lock().len()
    }

    /// Retries writes of outcomes that could not be persisted earlier.
    pub async fn flush_unsaved(&self) {
        let pending: Vec<Job> = self.unsaved.lock().values().cloned().collect();
        for job in pending {
            match self.store.save_if_status(&job, JobStatus::Running).await {
                Ok(true) => {
                    self.unsaved.lock().remove(&job.id);
                    info!(job_id = %job.id, status = %job.status, "Persisted deferred job outcome");
                }
                Ok(false) => {
                    self.unsaved.lock().remove(&job.id);
                    info!(job_id = %job.id, "Job changed since its attempt, dropping deferred outcome");
                }
                Err(e) => {
                    metrics().store_errors.inc();
                    warn!(job_id = %job.id, error = %e, "Deferred job outcome still not persisted");
                }
            }
        }
    }

    /// Runs one attempt of `id` if it is still due.
    pub async fn dispatch(&self, id: JobId) -> Result<DispatchResult> {
        let now = self.clock.now();

        let Some(mut job) = self.store.load(id).await? else {
            warn!(job_id = %id, "Due job vanished before dispatch");
            metrics().jobs_skipped.inc();
            return Ok(DispatchResult::Skipped);
        };

        if !is_due(&job, now) {
            debug!(job_id = %id, status = %job.status, "Job no longer due, skipping");
            metrics().jobs_skipped.inc();
            return Ok(DispatchResult::Skipped);
        }

        let claimed_from = job.status;
        job.start_attempt(now)?;
        if !self.store.save_if_status(&job, claimed_from).await? {
            debug!(job_id = %id, "Job changed before it could be claimed, skipping");
            metrics().jobs_skipped.inc();
            return Ok(DispatchResult::Skipped);
        }
        metrics().jobs_dispatched.inc();

        info!(
            job_id = %id,
            attempt = job.attempts,
            retry_count = job.retry_count,
            max_retries = job.max_retries,
            resume = job.cursor.is_some(),
            "Dispatching job"
        );

        let started = Instant::now();
        let outcome = self.execute(&job).await;
        metrics()
            .attempt_latency_ms
            .observe(started.elapsed().as_millis() as u64);

        let kind = outcome.kind();
        let status = job.apply_outcome(outcome, self.clock.now(), &self.policy)?;

        // Only a record still `running` takes the outcome; anything else was
        // written while the attempt ran (a cancellation) and wins.
        match self.store.save_if_status(&job, JobStatus::Running).await {
            Ok(true) => {}
            Ok(false) => {
                let current = match self.store.load(id).await {
                    Ok(Some(current)) => current.status,
                    Ok(None) | Err(_) => JobStatus::Cancelled,
                };
                info!(job_id = %id, outcome = kind, status = %current, "Job changed during attempt, dropping outcome");
                return Ok(DispatchResult::Finished(current));
            }
            Err(e) => {
                self.unsaved.lock().insert(job.id, job);
                return Err(e);
            }
        }

        record_transition(&job, kind);
        Ok(DispatchResult::Finished(status))
    }

    /// Runs the executor on its own task so a panic stays inside this job.
    async fn execute(&self, job: &Job) -> Outcome {
        let executor = self.executor.clone();
        let snapshot = job.clone();
        match tokio::spawn(async move { executor.execute(&snapshot).await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                metrics().executor_panics.inc();
                error!(job_id = %job.id, error = %e, "Executor panicked");
                Outcome::transient(format!("executor panicked: {}", e))
            }
        }
    }
}

fn record_transition(job: &Job, outcome: &'static str) {
    match job.status {
        JobStatus::Completed => {
            metrics().jobs_completed.inc();
            info!(
                job_id = %job.id,
                fetched = job.progress.items_fetched,
                created = job.progress.items_created,
                updated = job.progress.items_updated,
                unchanged = job.progress.items_unchanged,
                attempts = job.attempts,
                "Job completed"
            );
        }
        JobStatus::RateLimited => {
            metrics().jobs_rate_limited.inc();
            info!(
                job_id = %job.id,
                retry_count = job.retry_count,
                wait_seconds = job.rate_limit_wait_seconds.unwrap_or_default(),
                retry_after = ?job.retry_after,
                "Job rate limited"
            );
        }
        JobStatus::Pending => {
            metrics().jobs_retry_scheduled.inc();
            warn!(
                job_id = %job.id,
                retry_count = job.retry_count,
                retry_after = ?job.retry_after,
                error = job.error_message.as_deref().unwrap_or_default(),
                "Job attempt failed, retry scheduled"
            );
        }
        JobStatus::Failed => {
            metrics().jobs_failed.inc();
            error!(
                job_id = %job.id,
                outcome,
                retry_count = job.retry_count,
                error = job.error_message.as_deref().unwrap_or_default(),
                "Job failed"
            );
        }
        JobStatus::Running | JobStatus::Cancelled => {}
    }
}
