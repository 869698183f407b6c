//! Cost-based rate limiting for the supplier API.
//!
//! The bucket tracks estimated spend locally and is corrected whenever a
//! response carries the upstream's own view of the quota.

pub mod bucket;
pub mod config;
pub mod envelope;
pub mod limiter;

pub use bucket::{ClockReading, CostBucket};
pub use config::LimiterConfig;
pub use envelope::{CostEnvelope, ThrottleStatus};
pub use limiter::{RateLimiter, SharedRateLimiter};
