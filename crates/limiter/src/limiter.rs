//! Shared rate limiter around the cost bucket.
//!
//! Two tracking modes run side by side: pre-flight estimates decide how long
//! to wait before a request, and throttle status from responses corrects the
//! bucket once the upstream reports its own numbers.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use sync_core::{Clock, SystemClock};
use telemetry::metrics;

use crate::bucket::{ClockReading, CostBucket};
use crate::config::LimiterConfig;
use crate::envelope::{CostEnvelope, ThrottleStatus};

/// Cost-based rate limiter shared by every upstream caller in the process.
pub struct RateLimiter {
    bucket: Mutex<CostBucket>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("bucket", &*self.bucket.lock())
            .finish_non_exhaustive()
    }
}

/// Shared rate limiter handle.
pub type SharedRateLimiter = Arc<RateLimiter>;

impl RateLimiter {
    pub fn new(config: &LimiterConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Restoration counts wall-clock time from `clock` as well as the
    /// monotonic clock, whichever has advanced further.
    pub fn with_clock(config: &LimiterConfig, clock: Arc<dyn Clock>) -> Self {
        let now = ClockReading::new(Instant::now(), clock.now());
        Self {
            bucket: Mutex::new(CostBucket::new(config, now)),
            clock,
        }
    }

    fn read_clock(&self) -> ClockReading {
        ClockReading::new(Instant::now(), self.clock.now())
    }

    /// Suspends until `requested_cost` points can be reserved, then reserves
    /// them. Returns the total time spent waiting.
    ///
    /// The bucket lock is never held across the sleep; after every wake-up the
    /// bucket is restored and checked again, so concurrent callers cannot both
    /// claim the same restored points.
    pub async fn wait_for_capacity(&self, requested_cost: f64) -> Duration {
        if !(requested_cost > 0.0) {
            return Duration::ZERO;
        }

        let mut waited = Duration::ZERO;
        loop {
            let wait = {
                let mut bucket = self.bucket.lock();
                bucket.restore(self.read_clock());

                let usable = bucket.usable_capacity();
                let cost = if requested_cost > usable {
                    warn!(
                        requested_cost,
                        usable_capacity = usable,
                        "Requested cost exceeds bucket capacity, clamping"
                    );
                    usable
                } else {
                    requested_cost
                };

                match bucket.wait_for(cost) {
                    None => {
                        bucket.reserve(cost);
                        metrics().limiter_reservations.inc();
                        metrics().limiter_available.set(bucket.available() as u64);
                        if !waited.is_zero() {
                            metrics()
                                .capacity_wait_ms
                                .observe(waited.as_millis() as u64);
                        }
                        return waited;
                    }
                    Some(wait) => {
                        debug!(
                            requested_cost = cost,
                            consumed = bucket.consumed(),
                            available = bucket.available(),
                            wait_ms = wait.as_millis() as u64,
                            "Waiting for rate limit capacity"
                        );
                        wait
                    }
                }
            };

            metrics().capacity_waits.inc();
            sleep(wait).await;
            waited += wait;
        }
    }

    /// Time a request of `cost` would have to wait right now, if any.
    pub fn estimate_wait(&self, cost: f64) -> Option<Duration> {
        let mut bucket = self.bucket.lock();
        bucket.restore(self.read_clock());
        bucket.wait_for(cost.min(bucket.usable_capacity()))
    }

    /// Overwrites local spend with the upstream's `currently_available`.
    pub fn reconcile_from_server(&self, server_available: f64) {
        let mut bucket = self.bucket.lock();
        let before = bucket.consumed();
        bucket.reconcile(server_available, self.read_clock());
        metrics().limiter_reconciliations.inc();
        metrics().limiter_available.set(bucket.available() as u64);
        debug!(
            server_available,
            consumed_before = before,
            consumed_after = bucket.consumed(),
            "Reconciled cost bucket from server"
        );
    }

    /// Adopts reported capacity and restore rate, then reconciles spend.
    pub fn apply_throttle_status(&self, status: &ThrottleStatus) {
        {
            let mut bucket = self.bucket.lock();
            if status.maximum_available != bucket.capacity_max() {
                debug!(
                    old = bucket.capacity_max(),
                    new = status.maximum_available,
                    "Upstream reported a different bucket capacity"
                );
                bucket.set_capacity(status.maximum_available);
            }
            if status.restore_rate != bucket.restore_rate() {
                bucket.set_restore_rate(status.restore_rate);
            }
        }
        self.reconcile_from_server(status.currently_available);
    }

    /// Feeds response cost metadata back into the bucket.
    ///
    /// Throttle status wins over everything else. Without it, an actual cost
    /// settles the difference against the `estimated` cost reserved before
    /// the request.
    pub fn observe(&self, envelope: &CostEnvelope, estimated: f64) {
        if let Some(status) = &envelope.throttle_status {
            self.apply_throttle_status(status);
        } else if let Some(actual) = envelope.actual_cost {
            let mut bucket = self.bucket.lock();
            bucket.restore(self.read_clock());
            bucket.settle(estimated, actual);
        }
    }

    /// Points reservable right now. Never negative.
    pub fn available_now(&self) -> f64 {
        let mut bucket = self.bucket.lock();
        bucket.restore(self.read_clock());
        bucket.available()
    }

    /// Points currently counted as spent.
    pub fn consumed(&self) -> f64 {
        let mut bucket = self.bucket.lock();
        bucket.restore(self.read_clock());
        bucket.consumed()
    }

    pub fn capacity_max(&self) -> f64 {
        self.bucket.lock().capacity_max()
    }

    /// Forgets all recorded spend. For recovery after suspected drift only.
    pub fn reset(&self) {
        let now = self.read_clock();
        self.bucket.lock().reset(now);
        warn!("Cost bucket reset");
    }
}
