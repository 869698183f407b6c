//! Job retry lifecycle driven through the scheduler with a manual clock.

use chrono::Duration;
use integration_tests::fixtures::{delta, pending_job};
use integration_tests::mocks::ScriptedExecutor;
use integration_tests::setup::TestContext;
use sync_core::{
    is_eligible_for_retry, JobStatus, Outcome, ProgressDelta, RetryPolicy, SyncCursor,
    RATE_LIMIT_EXHAUSTED,
};
use worker::cancel_job;

#[tokio::test]
async fn test_rate_limited_job_waits_then_completes() {
    let executor = ScriptedExecutor::with_outcomes([
        Outcome::rate_limited(60),
        Outcome::success(delta(5, 3, 1, 1)),
    ]);
    let ctx = TestContext::new(executor);
    let start = ctx.now();
    let id = ctx.insert(pending_job(&["tools"], 2, start)).await;

    // Tick 1: dispatched, rate limited
    let report = ctx.scheduler.run_tick().await;
    assert_eq!(report.rate_limited, 1);
    let job = ctx.job(id).await;
    assert_eq!(job.status, JobStatus::RateLimited);
    assert_eq!(job.retry_count, 1);
    assert_eq!(job.retry_after, Some(start + Duration::seconds(60)));
    assert_eq!(job.rate_limit_wait_seconds, Some(60));

    // Tick 2, before the wait elapses: not eligible
    ctx.clock.advance(Duration::seconds(59));
    let report = ctx.scheduler.run_tick().await;
    assert_eq!(report.due, 0);
    assert_eq!(ctx.executor.call_count(), 1);
    assert_eq!(ctx.job(id).await.status, JobStatus::RateLimited);

    // Exactly at retry_after: eligible, completes
    ctx.clock.advance(Duration::seconds(1));
    let report = ctx.scheduler.run_tick().await;
    assert_eq!(report.completed, 1);

    let job = ctx.job(id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.retry_after, None);
    assert_eq!(job.progress.items_fetched, 5);
    assert_eq!(job.progress.items_created, 3);
    assert_eq!(job.progress.items_updated, 1);
    assert_eq!(job.progress.items_unchanged, 1);
    assert_eq!(job.attempts, 2);
    assert!(job.finished_at.is_some());
    assert_eq!(ctx.executor.calls(), vec![id, id]);
}

#[tokio::test]
async fn test_fails_exactly_on_third_rate_limit() {
    let executor = ScriptedExecutor::with_outcomes([
        Outcome::rate_limited(60),
        Outcome::rate_limited(60),
        Outcome::rate_limited(60),
        Outcome::success(ProgressDelta::new()),
    ]);
    let ctx = TestContext::new(executor);
    let id = ctx.insert(pending_job(&["tools"], 3, ctx.now())).await;

    for expected_count in 1..=2 {
        ctx.scheduler.run_tick().await;
        let job = ctx.job(id).await;
        assert_eq!(job.status, JobStatus::RateLimited);
        assert_eq!(job.retry_count, expected_count);
        ctx.clock.advance(Duration::seconds(60));
    }

    let report = ctx.scheduler.run_tick().await;
    assert_eq!(report.failed, 1);
    let job = ctx.job(id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retry_count, 3);
    assert_eq!(job.error_message.as_deref(), Some(RATE_LIMIT_EXHAUSTED));
    assert_eq!(job.retry_after, None);

    ctx.clock.advance(Duration::hours(1));
    let report = ctx.scheduler.run_tick().await;
    assert_eq!(report.due, 0);
    assert_eq!(ctx.executor.call_count(), 3);
}

#[tokio::test]
async fn test_non_retryable_failure_keeps_retry_count() {
    let executor = ScriptedExecutor::with_outcomes([
        Outcome::rate_limited(30),
        Outcome::fatal("supplier rejected credentials (HTTP 401)"),
    ]);
    let ctx = TestContext::new(executor);
    let id = ctx.insert(pending_job(&["tools"], 5, ctx.now())).await;

    ctx.scheduler.run_tick().await;
    assert_eq!(ctx.job(id).await.retry_count, 1);

    ctx.clock.advance(Duration::seconds(30));
    let report = ctx.scheduler.run_tick().await;
    assert_eq!(report.failed, 1);

    let job = ctx.job(id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retry_count, 1);
    assert_eq!(
        job.error_message.as_deref(),
        Some("supplier rejected credentials (HTTP 401)")
    );
}

#[tokio::test]
async fn test_transient_failure_backs_off_and_resumes_from_cursor() {
    let cursor = SyncCursor {
        category_index: 1,
        page_cursor: Some("page-4".into()),
    };
    let mut partial = delta(100, 100, 0, 0);
    partial.cursor = Some(cursor.clone());

    let executor = ScriptedExecutor::with_outcomes([
        Outcome::transient("supplier returned HTTP 503").with_progress(partial),
        Outcome::success(delta(20, 20, 0, 0)),
    ]);
    let policy = RetryPolicy::default();
    let ctx = TestContext::with_policy(executor, policy.clone());
    let start = ctx.now();
    let id = ctx.insert(pending_job(&["tools", "paint"], 5, start)).await;

    let report = ctx.scheduler.run_tick().await;
    assert_eq!(report.retry_scheduled, 1);

    let job = ctx.job(id).await;
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.retry_count, 1);
    assert_eq!(job.retry_after, Some(start + policy.backoff_for(0)));
    assert_eq!(job.cursor, Some(cursor));
    assert_eq!(job.progress.items_fetched, 100);

    // Still backing off
    ctx.clock.advance(Duration::seconds(1));
    assert_eq!(ctx.scheduler.run_tick().await.due, 0);

    ctx.clock.set(start + policy.backoff_for(0));
    let report = ctx.scheduler.run_tick().await;
    assert_eq!(report.completed, 1);

    let job = ctx.job(id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress.items_fetched, 120);
    assert_eq!(job.progress.items_created, 120);
    assert_eq!(job.cursor, None);
}

#[tokio::test]
async fn test_cancelled_job_is_never_dispatched() {
    let ctx = TestContext::new(ScriptedExecutor::with_outcomes([Outcome::rate_limited(60)]));
    let id = ctx.insert(pending_job(&["tools"], 3, ctx.now())).await;

    ctx.scheduler.run_tick().await;
    cancel_job(ctx.store.as_ref(), id, ctx.now()).await.unwrap();

    ctx.clock.advance(Duration::minutes(5));
    let report = ctx.scheduler.run_tick().await;
    assert_eq!(report.due, 0);
    assert_eq!(ctx.executor.call_count(), 1);
    assert_eq!(ctx.job(id).await.status, JobStatus::Cancelled);
}

#[tokio::test]
async fn test_eligibility_boundary() {
    let ctx = TestContext::new(ScriptedExecutor::new());
    let now = ctx.now();

    let job = integration_tests::fixtures::rate_limited_job(1, 3, now, Duration::milliseconds(1));
    assert!(!is_eligible_for_retry(&job, now));
    assert!(is_eligible_for_retry(&job, now + Duration::milliseconds(1)));

    let exhausted = integration_tests::fixtures::rate_limited_job(3, 3, now, Duration::zero());
    assert!(!is_eligible_for_retry(&exhausted, now));
}
