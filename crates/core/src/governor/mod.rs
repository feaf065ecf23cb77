//! Rate-limited request governor
//!
//! [`UsageTracker`] gates dispatch, [`RequestQueue`] orders and drains work,
//! [`RetryClassifier`] decides the fate of each attempt and
//! [`BackgroundSyncManager`] runs multi-request jobs on top of the queue.

pub mod background;
pub mod queue;
pub mod retry;
pub mod service;
pub mod usage;

pub use background::BackgroundSyncManager;
pub use queue::{DrainReport, PendingDispatch, QueueItem, RequestQueue, TickOutcome};
pub use retry::{Classification, RetryClassifier, Verdict};
pub use service::{Governor, GovernorBuilder};
pub use usage::UsageTracker;
