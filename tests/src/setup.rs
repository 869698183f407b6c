//! Common test setup.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use job_store::{JobStore, MemoryJobStore, SharedJobStore};
use sync_core::{Job, JobId, ManualClock, RetryPolicy};
use worker::{JobExecutor, JobScheduler, SchedulerConfig};

/// Scheduler wired to an in-memory store and a manual clock.
pub struct TestContext<E> {
    pub store: Arc<MemoryJobStore>,
    pub clock: Arc<ManualClock>,
    pub executor: Arc<E>,
    pub scheduler: JobScheduler,
}

impl<E: JobExecutor> TestContext<E> {
    pub fn new(executor: E) -> Self {
        Self::with_policy(executor, RetryPolicy::default())
    }

    pub fn with_policy(executor: E, policy: RetryPolicy) -> Self {
        let store = Arc::new(MemoryJobStore::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let executor = Arc::new(executor);
        let scheduler = JobScheduler::new(
            test_scheduler_config(),
            store.clone(),
            executor.clone(),
            clock.clone(),
            policy,
        );
        Self {
            store,
            clock,
            executor,
            scheduler,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        sync_core::Clock::now(self.clock.as_ref())
    }

    pub async fn insert(&self, job: Job) -> JobId {
        let id = job.id;
        self.store.insert(job).await.expect("insert job");
        id
    }

    pub async fn job(&self, id: JobId) -> Job {
        self.store
            .load(id)
            .await
            .expect("load job")
            .expect("job exists")
    }
}

/// Scheduler over an arbitrary store.
pub fn scheduler_with_store(
    store: SharedJobStore,
    executor: Arc<dyn JobExecutor>,
    clock: Arc<ManualClock>,
) -> JobScheduler {
    JobScheduler::new(
        test_scheduler_config(),
        store,
        executor,
        clock,
        RetryPolicy::default(),
    )
}

pub fn test_scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        check_interval_ms: 1_000,
        ..Default::default()
    }
}

/// Fixed start time so due-time arithmetic is readable in assertions.
pub fn start_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
        .expect("valid timestamp")
        .with_timezone(&Utc)
}
