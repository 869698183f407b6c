//! Leaky cost bucket.
//!
//! Pure accounting: callers pass the clock reading, nothing here sleeps.
//! `consumed` decays towards zero at `restore_rate` points per second and
//! "available" is always derived, never stored.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::config::LimiterConfig;

/// Monotonic and wall-clock time read together.
///
/// The monotonic instant drives sleeps; the wall clock also counts time the
/// monotonic clock skips, such as a system suspend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockReading {
    pub instant: Instant,
    pub wall: DateTime<Utc>,
}

impl ClockReading {
    pub fn new(instant: Instant, wall: DateTime<Utc>) -> Self {
        Self { instant, wall }
    }

    /// The later of the two clocks' elapsed time. A wall clock stepped
    /// backwards counts as zero.
    pub fn elapsed_since(&self, earlier: &ClockReading) -> Duration {
        let monotonic = self.instant.saturating_duration_since(earlier.instant);
        let wall = self
            .wall
            .signed_duration_since(earlier.wall)
            .to_std()
            .unwrap_or(Duration::ZERO);
        monotonic.max(wall)
    }

    /// Both clocks moved forward by `by`.
    pub fn advanced(&self, by: Duration) -> Self {
        let wall = chrono::Duration::from_std(by)
            .ok()
            .and_then(|d| self.wall.checked_add_signed(d))
            .unwrap_or(self.wall);
        Self {
            instant: self.instant + by,
            wall,
        }
    }
}

/// Decaying budget of upstream cost points.
#[derive(Debug, Clone)]
pub struct CostBucket {
    capacity_max: f64,
    consumed: f64,
    restore_rate: f64,
    safety_margin: f64,
    last_reconciled_at: ClockReading,
}

impl CostBucket {
    pub fn new(config: &LimiterConfig, now: ClockReading) -> Self {
        Self {
            capacity_max: config.max_cost,
            consumed: 0.0,
            restore_rate: config.restore_rate,
            safety_margin: config.safety_margin,
            last_reconciled_at: now,
        }
    }

    pub fn capacity_max(&self) -> f64 {
        self.capacity_max
    }

    pub fn consumed(&self) -> f64 {
        self.consumed
    }

    pub fn restore_rate(&self) -> f64 {
        self.restore_rate
    }

    pub fn safety_margin(&self) -> f64 {
        self.safety_margin
    }

    pub fn last_reconciled_at(&self) -> ClockReading {
        self.last_reconciled_at
    }

    /// Largest cost a single reservation can be granted.
    pub fn usable_capacity(&self) -> f64 {
        (self.capacity_max - self.safety_margin).max(0.0)
    }

    /// Credits points restored since the last reconciliation.
    ///
    /// A long pause, suspend included, restores at most everything;
    /// `consumed` clamps at zero.
    pub fn restore(&mut self, now: ClockReading) {
        let elapsed = now.elapsed_since(&self.last_reconciled_at).as_secs_f64();
        let restored = elapsed * self.restore_rate;
        self.consumed -= restored.min(self.consumed);
        self.last_reconciled_at = now;
    }

    /// Points that may be reserved right now. Never negative.
    pub fn available(&self) -> f64 {
        (self.capacity_max - self.consumed - self.safety_margin).max(0.0)
    }

    /// How long to wait before `cost` fits, or `None` if it fits already.
    ///
    /// Rounded up to the millisecond so a waiter never wakes early.
    pub fn wait_for(&self, cost: f64) -> Option<Duration> {
        let available = self.capacity_max - self.consumed - self.safety_margin;
        if cost <= available {
            return None;
        }
        let deficit = cost - available;
        let millis = (deficit / self.restore_rate * 1000.0).ceil() as u64;
        Some(Duration::from_millis(millis.max(1)))
    }

    /// Records spend. No upper clamp: callers wait for capacity first.
    pub fn reserve(&mut self, cost: f64) {
        self.consumed += cost;
    }

    /// Applies the difference between an actual and an estimated cost.
    pub fn settle(&mut self, estimated: f64, actual: f64) {
        self.consumed = (self.consumed + actual - estimated).clamp(0.0, self.capacity_max);
    }

    /// Replaces local estimates with the upstream's reported availability.
    pub fn reconcile(&mut self, server_available: f64, now: ClockReading) {
        let server_available = server_available.clamp(0.0, self.capacity_max);
        self.consumed = self.capacity_max - server_available;
        self.last_reconciled_at = now;
    }

    /// Adopts a capacity reported by the upstream.
    pub fn set_capacity(&mut self, capacity_max: f64) {
        if capacity_max > self.safety_margin {
            self.capacity_max = capacity_max;
            self.consumed = self.consumed.min(capacity_max);
        }
    }

    /// Adopts a restore rate reported by the upstream.
    pub fn set_restore_rate(&mut self, restore_rate: f64) {
        if restore_rate > 0.0 {
            self.restore_rate = restore_rate;
        }
    }

    /// Forgets all spend. Out-of-band recovery only.
    pub fn reset(&mut self, now: ClockReading) {
        self.consumed = 0.0;
        self.last_reconciled_at = now;
    }
}
