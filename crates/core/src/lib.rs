//! Core types for the supplier sync engine.
//!
//! Holds the job record, its state machine, the retry gate, and the
//! `Outcome` type every executor reports back to the scheduler.

pub mod clock;
pub mod error;
pub mod job;
pub mod outcome;
pub mod retry;

pub use clock::*;
pub use error::{Error, Result, StoreErrorCode};
pub use job::*;
pub use outcome::*;
pub use retry::*;
