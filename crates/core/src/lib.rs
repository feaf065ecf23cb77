//! # PaceGate Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - The request governor: usage tracking, retry classification, the
//!   throttled request queue and background sync jobs
//! - Port/adapter interfaces (traits)
//! - The wall-clock abstraction
//!
//! ## Architecture Principles
//! - Only depends on `pacegate-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits

pub mod governor;
pub mod ports;
pub mod time;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use governor::{
    BackgroundSyncManager, DrainReport, Governor, GovernorBuilder, PendingDispatch,
    RequestQueue, RetryClassifier, TickOutcome, UsageTracker,
};
pub use ports::{CallLogSink, StateStore, SyncResultSink, Transport};
pub use time::{Clock, SystemClock};
