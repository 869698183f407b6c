//! Scheduler loop behaviour: start/stop idempotence and failure isolation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use integration_tests::fixtures::pending_job;
use integration_tests::mocks::{FlakyStore, ScriptedExecutor};
use integration_tests::setup::{scheduler_with_store, start_time, TestContext};
use job_store::{JobStore, MemoryJobStore};
use sync_core::{Job, JobStatus, ManualClock, Outcome, ProgressDelta};
use worker::JobExecutor;

#[tokio::test(start_paused = true)]
async fn test_double_start_runs_one_loop() {
    let ctx = TestContext::new(ScriptedExecutor::new());
    let id = ctx.insert(pending_job(&["tools"], 3, ctx.now())).await;

    assert!(ctx.scheduler.start());
    assert!(!ctx.scheduler.start());
    tokio::time::sleep(Duration::from_millis(10)).await;

    // One immediate check, one dispatch
    assert_eq!(ctx.scheduler.status().ticks, 1);
    assert_eq!(ctx.executor.calls(), vec![id]);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(ctx.scheduler.status().ticks, 2);

    ctx.scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent_and_halts_ticks() {
    let ctx = TestContext::new(ScriptedExecutor::new());

    ctx.scheduler.start();
    tokio::time::sleep(Duration::from_millis(10)).await;
    ctx.scheduler.stop().await;
    ctx.scheduler.stop().await;

    let ticks = ctx.scheduler.status().ticks;
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(ctx.scheduler.status().ticks, ticks);
    assert!(!ctx.scheduler.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_loop_survives_failing_due_query() {
    let now = start_time();
    let job = pending_job(&["tools"], 3, now);
    let id = job.id;
    let store = FlakyStore::new(MemoryJobStore::with_jobs([job]));
    store.set_fail_due_jobs(true);

    let executor = ScriptedExecutor::new();
    let scheduler = scheduler_with_store(
        Arc::new(store.clone()),
        Arc::new(executor.clone()),
        Arc::new(ManualClock::new(now)),
    );

    scheduler.start();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(scheduler.status().ticks, 1);
    assert_eq!(executor.call_count(), 0);

    store.set_fail_due_jobs(false);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(scheduler.status().ticks, 2);
    assert_eq!(executor.calls(), vec![id]);

    let stored = store.load(id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    scheduler.stop().await;
}

#[tokio::test]
async fn test_save_failures_are_isolated_per_job() {
    let now = start_time();
    let jobs = [pending_job(&["a"], 3, now), pending_job(&["b"], 3, now)];
    let store = FlakyStore::new(MemoryJobStore::with_jobs(jobs.clone()));
    store.set_fail_saves(true);

    let executor = ScriptedExecutor::new();
    let scheduler = scheduler_with_store(
        Arc::new(store.clone()),
        Arc::new(executor.clone()),
        Arc::new(ManualClock::new(now)),
    );

    let report = scheduler.run_tick().await;
    assert_eq!(report.due, 2);
    assert_eq!(report.errors, 2);
    // Claiming failed, so nothing ran
    assert_eq!(executor.call_count(), 0);

    store.set_fail_saves(false);
    let report = scheduler.run_tick().await;
    assert_eq!(report.completed, 2);
    for job in jobs {
        let stored = store.load(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
    }
}

/// Panics on its first call, succeeds afterwards.
#[derive(Default)]
struct PanicsOnce {
    panicked: AtomicBool,
}

#[async_trait]
impl JobExecutor for PanicsOnce {
    async fn execute(&self, _job: &Job) -> Outcome {
        if !self.panicked.swap(true, Ordering::SeqCst) {
            panic!("executor bug");
        }
        Outcome::success(ProgressDelta::new())
    }
}

#[tokio::test]
async fn test_executor_panic_does_not_stop_the_tick() {
    let ctx = TestContext::new(PanicsOnce::default());
    let first = ctx
        .insert(pending_job(&["a"], 3, ctx.now() - chrono::Duration::seconds(2)))
        .await;
    let second = ctx
        .insert(pending_job(&["b"], 3, ctx.now() - chrono::Duration::seconds(1)))
        .await;

    let report = ctx.scheduler.run_tick().await;
    assert_eq!(report.due, 2);
    assert_eq!(report.retry_scheduled, 1);
    assert_eq!(report.completed, 1);

    let first = ctx.job(first).await;
    assert_eq!(first.status, JobStatus::Pending);
    assert_eq!(first.retry_count, 1);
    assert!(first.retry_after.unwrap() > ctx.now());
    assert_eq!(ctx.job(second).await.status, JobStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_enormous_retry_after_does_not_stall_the_loop() {
    let executor = ScriptedExecutor::with_outcomes([
        Outcome::rate_limited(u64::MAX),
        Outcome::success(ProgressDelta::new()),
    ]);
    let ctx = TestContext::new(executor);
    let throttled = ctx
        .insert(pending_job(&["a"], 3, ctx.now() - chrono::Duration::seconds(2)))
        .await;
    let next = ctx
        .insert(pending_job(&["b"], 3, ctx.now() - chrono::Duration::seconds(1)))
        .await;

    ctx.scheduler.start();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let job = ctx.job(throttled).await;
    assert_eq!(job.status, JobStatus::RateLimited);
    assert!(job.retry_after.unwrap() > ctx.now());
    assert_eq!(ctx.job(next).await.status, JobStatus::Completed);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(ctx.scheduler.status().ticks >= 2);
    assert!(ctx.scheduler.is_running());

    ctx.scheduler.stop().await;
}
