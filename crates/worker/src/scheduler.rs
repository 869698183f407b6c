//! Job scheduler loop.
//!
//! A single periodic timer polls the job store for due jobs and dispatches
//! them one after another. Per-job errors are logged and counted; neither a
//! failing job nor a failing poll stops the loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use job_store::SharedJobStore;
use sync_core::{Clock, JobStatus, RetryPolicy};
use telemetry::{health, metrics};

use crate::dispatch::{DispatchResult, Dispatcher};
use crate::executor::SharedExecutor;
use crate::task::RepeatingTask;

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Due-job poll interval in milliseconds
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
    /// Metrics snapshot log interval in milliseconds
    #[serde(default = "default_metrics_log_interval_ms")]
    pub metrics_log_interval_ms: u64,
}

fn default_check_interval_ms() -> u64 {
    30_000
}

fn default_metrics_log_interval_ms() -> u64 {
    300_000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: default_check_interval_ms(),
            metrics_log_interval_ms: default_metrics_log_interval_ms(),
        }
    }
}

impl SchedulerConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms.max(1))
    }

    pub fn metrics_log_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_log_interval_ms.max(1))
    }
}

/// Observable scheduler state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub interval: Duration,
    pub ticks: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
}

/// Per-tick tally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub due: usize,
    pub completed: usize,
    pub failed: usize,
    pub rate_limited: usize,
    pub retry_scheduled: usize,
    pub cancelled: usize,
    pub skipped: usize,
    pub errors: usize,
}

struct SchedulerInner {
    store: SharedJobStore,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
    ticks: AtomicU64,
    last_tick_at: Mutex<Option<DateTime<Utc>>>,
    /// Serializes loop ticks with manual `run_tick` calls.
    tick_lock: tokio::sync::Mutex<()>,
}

/// Periodic due-job poller. One per process, constructed and injected
/// explicitly.
pub struct JobScheduler {
    config: SchedulerConfig,
    inner: Arc<SchedulerInner>,
    task: Mutex<Option<RepeatingTask>>,
}

impl JobScheduler {
    pub fn new(
        config: SchedulerConfig,
        store: SharedJobStore,
        executor: SharedExecutor,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
    ) -> Self {
        let dispatcher = Dispatcher::new(store.clone(), executor, clock.clone(), policy);
        Self {
            config,
            inner: Arc::new(SchedulerInner {
                store,
                dispatcher,
                clock,
                ticks: AtomicU64::new(0),
                last_tick_at: Mutex::new(None),
                tick_lock: tokio::sync::Mutex::new(()),
            }),
            task: Mutex::new(None),
        }
    }

    /// Starts the loop: one check right away, then one per interval.
    ///
    /// Returns `false` without starting anything if the loop is already
    /// running. Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        let mut task = self.task.lock();
        if task.is_some() {
            info!("Job scheduler already running, ignoring start");
            return false;
        }

        let inner = self.inner.clone();
        *task = Some(RepeatingTask::spawn(
            "job-scheduler",
            self.config.check_interval(),
            move || {
                let inner = inner.clone();
                async move {
                    inner.run_tick().await;
                }
            },
        ));

        info!(
            interval_ms = self.config.check_interval_ms,
            "Job scheduler started"
        );
        true
    }

    /// Stops the loop after the in-flight tick, if any, completes.
    /// Stopping a stopped scheduler does nothing.
    pub async fn stop(&self) {
        let task = self.task.lock().take();
        match task {
            Some(task) => {
                task.stop().await;
                info!("Job scheduler stopped");
            }
            None => debug!("Job scheduler not running, ignoring stop"),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            running: self.is_running(),
            interval: self.config.check_interval(),
            ticks: self.inner.ticks.load(Ordering::SeqCst),
            last_tick_at: *self.inner.last_tick_at.lock(),
        }
    }

    /// Runs one poll-and-dispatch pass outside the timer.
    pub async fn run_tick(&self) -> TickReport {
        self.inner.run_tick().await
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }
}

impl SchedulerInner {
    async fn run_tick(&self) -> TickReport {
        let _guard = self.tick_lock.lock().await;
        metrics().scheduler_ticks.inc();

        let report = self.poll_and_dispatch().await;

        self.ticks.fetch_add(1, Ordering::SeqCst);
        *self.last_tick_at.lock() = Some(self.clock.now());

        if report.due > 0 || report.errors > 0 {
            info!(
                due = report.due,
                completed = report.completed,
                rate_limited = report.rate_limited,
                retry_scheduled = report.retry_scheduled,
                failed = report.failed,
                skipped = report.skipped,
                errors = report.errors,
                "Scheduler tick complete"
            );
        } else {
            debug!("Scheduler tick found no due jobs");
        }
        report
    }

    async fn poll_and_dispatch(&self) -> TickReport {
        let mut report = TickReport::default();

        self.dispatcher.flush_unsaved().await;

        let now = self.clock.now();
        let due = match self.store.due_jobs(now).await {
            Ok(due) => {
                health().job_store.set_healthy();
                due
            }
            Err(e) => {
                metrics().scheduler_tick_errors.inc();
                metrics().store_errors.inc();
                health().job_store.set_unhealthy(e.to_string());
                error!(error = %e, "Failed to query due jobs");
                report.errors += 1;
                return report;
            }
        };

        report.due = due.len();
        metrics().due_jobs.set(due.len() as u64);

        for id in due {
            match self.dispatcher.dispatch(id).await {
                Ok(DispatchResult::Skipped) => report.skipped += 1,
                Ok(DispatchResult::Finished(status)) => match status {
                    JobStatus::Completed => report.completed += 1,
                    JobStatus::Failed => report.failed += 1,
                    JobStatus::RateLimited => report.rate_limited += 1,
                    JobStatus::Pending => report.retry_scheduled += 1,
                    JobStatus::Cancelled => report.cancelled += 1,
                    JobStatus::Running => {}
                },
                Err(e) => {
                    if e.is_store_error() {
                        metrics().store_errors.inc();
                        health().job_store.set_unhealthy(e.to_string());
                    }
                    error!(job_id = %id, error = %e, "Job dispatch failed, skipping for this tick");
                    report.errors += 1;
                }
            }
        }

        report
    }
}
