//! Background job processing for the sync engine.
//!
//! - Scheduler (periodic due-job poll, sequential dispatch)
//! - Dispatcher (one attempt: claim, execute, record outcome)
//! - Repeating task (run now, then every interval, drained stop)
//! - Lifecycle helpers (enqueue, cancel, startup recovery)

pub mod dispatch;
pub mod executor;
pub mod lifecycle;
pub mod scheduler;
pub mod task;

pub use dispatch::{DispatchResult, Dispatcher};
pub use executor::{JobExecutor, SharedExecutor};
pub use lifecycle::*;
pub use scheduler::*;
pub use task::RepeatingTask;
