//! Internal telemetry for the supplier sync engine.
//!
//! Metrics live in process and are written to the log on a timer; job state
//! itself is the durable record.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
