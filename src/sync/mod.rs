//! Synchronization cycles.
//!
//! [`Orchestrator::run_cycle`] performs one pass over every subscription;
//! [`Scheduler`] repeats it on a timer.

mod orchestrator;
mod scheduler;

pub use orchestrator::{CycleReport, CycleState, Orchestrator, SyncError, SyncSettings};
pub use scheduler::{Scheduler, DEFAULT_SYNC_INTERVAL};
