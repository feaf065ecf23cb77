//! Domain types and models
//!
//! Everything here is plain data: serializable, free of I/O, and shared by
//! the core logic and the infrastructure adapters.

pub mod call_log;
pub mod request;
pub mod sync_task;
pub mod usage;

pub use call_log::CallLogEntry;
pub use request::{DispatchOutcome, DispatchResponse, HttpMethod, RequestSpec};
pub use sync_task::{SyncHandle, SyncOptions, SyncStatus, SyncTask, UnitError};
pub use usage::{GovernorStats, UsageCounters, UsageStats, WindowStats};
