//! Internal metrics collection.
//!
//! Collects metrics in-memory; the scheduler logs a snapshot periodically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Histogram for latency tracking.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 10s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for (i, &bound) in Self::BUCKET_BOUNDS.iter().enumerate() {
            if ms <= bound {
                self.buckets[i].fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        // Value exceeds all buckets, add to last
        self.buckets[10].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// Returns bucket counts.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the sync engine.
#[derive(Debug, Default)]
pub struct Metrics {
    // Scheduler metrics
    pub scheduler_ticks: Counter,
    pub scheduler_tick_errors: Counter,
    pub jobs_dispatched: Counter,
    pub jobs_completed: Counter,
    pub jobs_failed: Counter,
    pub jobs_rate_limited: Counter,
    pub jobs_retry_scheduled: Counter,
    pub jobs_skipped: Counter,
    pub executor_panics: Counter,
    pub store_errors: Counter,

    // Rate limiter metrics
    pub limiter_reservations: Counter,
    pub capacity_waits: Counter,
    pub limiter_reconciliations: Counter,

    // Upstream metrics
    pub upstream_requests: Counter,
    pub upstream_errors: Counter,
    pub upstream_throttled: Counter,
    pub items_fetched: Counter,

    // Latency histograms
    pub capacity_wait_ms: Histogram,
    pub attempt_latency_ms: Histogram,
    pub upstream_latency_ms: Histogram,

    // Gauges
    pub limiter_available: Gauge,
    pub due_jobs: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub scheduler_ticks: u64,
    pub scheduler_tick_errors: u64,
    pub jobs_dispatched: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_rate_limited: u64,
    pub jobs_retry_scheduled: u64,
    pub jobs_skipped: u64,
    pub executor_panics: u64,
    pub store_errors: u64,
    pub limiter_reservations: u64,
    pub capacity_waits: u64,
    pub limiter_reconciliations: u64,
    pub upstream_requests: u64,
    pub upstream_errors: u64,
    pub upstream_throttled: u64,
    pub items_fetched: u64,
    pub capacity_wait_mean_ms: f64,
    pub attempt_latency_mean_ms: f64,
    pub upstream_latency_mean_ms: f64,
    pub limiter_available: u64,
    pub due_jobs: u64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            scheduler_ticks: self.scheduler_ticks.get(),
            scheduler_tick_errors: self.scheduler_tick_errors.get(),
            jobs_dispatched: self.jobs_dispatched.get(),
            jobs_completed: self.jobs_completed.get(),
            jobs_failed: self.jobs_failed.get(),
            jobs_rate_limited: self.jobs_rate_limited.get(),
            jobs_retry_scheduled: self.jobs_retry_scheduled.get(),
            jobs_skipped: self.jobs_skipped.get(),
            executor_panics: self.executor_panics.get(),
            store_errors: self.store_errors.get(),
            limiter_reservations: self.limiter_reservations.get(),
            capacity_waits: self.capacity_waits.get(),
            limiter_reconciliations: self.limiter_reconciliations.get(),
            upstream_requests: self.upstream_requests.get(),
            upstream_errors: self.upstream_errors.get(),
            upstream_throttled: self.upstream_throttled.get(),
            items_fetched: self.items_fetched.get(),
            capacity_wait_mean_ms: self.capacity_wait_ms.mean(),
            attempt_latency_mean_ms: self.attempt_latency_ms.mean(),
            upstream_latency_mean_ms: self.upstream_latency_ms.mean(),
            limiter_available: self.limiter_available.get(),
            due_jobs: self.due_jobs.get(),
        }
    }
}

/// Writes a metrics snapshot to the log.
pub fn log_snapshot(snapshot: &MetricsSnapshot) {
    tracing::info!(
        ticks = snapshot.scheduler_ticks,
        tick_errors = snapshot.scheduler_tick_errors,
        dispatched = snapshot.jobs_dispatched,
        completed = snapshot.jobs_completed,
        failed = snapshot.jobs_failed,
        rate_limited = snapshot.jobs_rate_limited,
        retry_scheduled = snapshot.jobs_retry_scheduled,
        store_errors = snapshot.store_errors,
        capacity_waits = snapshot.capacity_waits,
        capacity_wait_mean_ms = snapshot.capacity_wait_mean_ms,
        reconciliations = snapshot.limiter_reconciliations,
        upstream_requests = snapshot.upstream_requests,
        upstream_errors = snapshot.upstream_errors,
        items_fetched = snapshot.items_fetched,
        limiter_available = snapshot.limiter_available,
        "Metrics snapshot"
    );
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
