//! Scheduling infrastructure for the request queue
//!
//! The [`QueueScheduler`] owns the timer-driven tick loop:
//! - Explicit lifecycle management (start/stop)
//! - Join handle for the spawned task
//! - Cancellation token support
//! - Join timeout on stop

pub mod error;
pub mod queue_scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use queue_scheduler::{QueueScheduler, QueueSchedulerConfig};
