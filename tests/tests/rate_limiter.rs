//! Cost limiter accounting under paused tokio time.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use cost_limiter::{CostEnvelope, LimiterConfig, RateLimiter, ThrottleStatus};
use sync_core::ManualClock;
use tokio::time::Instant;

fn limiter() -> RateLimiter {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap());
    RateLimiter::with_clock(&LimiterConfig::default(), Arc::new(clock))
}

#[tokio::test(start_paused = true)]
async fn test_consumed_stays_within_capacity() {
    let limiter = limiter();
    let costs = [10.0, 50.0, 100.0, 700.0, 1_900.0, 5_000.0, 50.0, 3.5];

    for (i, cost) in costs.iter().cycle().take(40).enumerate() {
        limiter.wait_for_capacity(*cost).await;
        assert!(limiter.consumed() <= limiter.capacity_max());
        assert!(limiter.available_now() >= 0.0);

        if i % 7 == 0 {
            limiter.observe(
                &CostEnvelope {
                    requested_cost: Some(*cost),
                    actual_cost: Some(cost * 3.0),
                    throttle_status: None,
                },
                *cost,
            );
            assert!(limiter.consumed() <= limiter.capacity_max());
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_near_full_bucket_waits_at_least_half_a_second() {
    let limiter = limiter();
    assert_eq!(limiter.wait_for_capacity(1_900.0).await, Duration::ZERO);

    let estimate = limiter.estimate_wait(50.0).expect("must wait");
    assert!(estimate >= Duration::from_millis(500));

    let started = Instant::now();
    let waited = limiter.wait_for_capacity(50.0).await;
    assert!(waited >= Duration::from_millis(500));
    assert!(started.elapsed() >= Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn test_server_reconciliation_overrides_local_estimates() {
    let limiter = limiter();
    limiter.wait_for_capacity(300.0).await;
    limiter.wait_for_capacity(900.0).await;

    limiter.reconcile_from_server(1_800.0);
    assert_eq!(limiter.consumed(), 200.0);
    assert_eq!(limiter.available_now(), 1_700.0);
}

#[tokio::test(start_paused = true)]
async fn test_throttle_status_adopts_upstream_bucket() {
    let limiter = limiter();
    limiter.observe(
        &CostEnvelope {
            requested_cost: Some(50.0),
            actual_cost: Some(12.0),
            throttle_status: Some(ThrottleStatus {
                maximum_available: 1_000.0,
                currently_available: 400.0,
                restore_rate: 50.0,
            }),
        },
        50.0,
    );

    assert_eq!(limiter.capacity_max(), 1_000.0);
    assert_eq!(limiter.consumed(), 600.0);

    // 1000 - 600 - 100 = 300 available; 400 needs 100 more points at 50/s
    let wait = limiter.estimate_wait(400.0).expect("must wait");
    assert_eq!(wait, Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_oversized_request_is_clamped_and_completes() {
    let limiter = limiter();
    limiter.wait_for_capacity(1_000.0).await;

    let waited = limiter.wait_for_capacity(10_000.0).await;
    assert!(waited > Duration::ZERO);
    assert!(limiter.consumed() <= limiter.capacity_max());
}

#[tokio::test(start_paused = true)]
async fn test_independent_instances_do_not_share_budget() {
    let a = limiter();
    let b = limiter();
    a.wait_for_capacity(1_900.0).await;
    assert_eq!(b.available_now(), 1_900.0);
}
