//! # PaceGate Infrastructure
//!
//! Infrastructure implementations of core governor ports.
//!
//! This crate contains:
//! - The reqwest-backed provider transport
//! - SQLite and in-memory state stores
//! - Call-log sinks and tracing initialisation
//! - Configuration loading
//! - The queue scheduler lifecycle and production wiring
//!
//! ## Architecture
//! - Implements traits defined in `pacegate-core`
//! - Depends on `pacegate-domain` and `pacegate-core`
//! - Contains all "impure" code (I/O, timers, network)

pub mod config;
pub mod context;
pub mod errors;
pub mod http;
pub mod observability;
pub mod scheduling;
pub mod storage;

// Re-export commonly used items
pub use context::GovernorContext;
pub use errors::InfraError;
pub use http::{HttpClient, HttpClientBuilder, HttpTransport};
pub use observability::{init_tracing, CallMetricsSink, FanoutCallLogSink, TracingCallLogSink};
pub use scheduling::{QueueScheduler, QueueSchedulerConfig, SchedulerError, SchedulerResult};
pub use storage::{open_state_store, InMemoryStateStore, SqliteStateStore};
