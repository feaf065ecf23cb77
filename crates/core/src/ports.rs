//! Port interfaces for the governor
//!
//! Adapters live in `pacegate-infra`; the governor only sees these traits.

use std::time::Duration;

use async_trait::async_trait;
use pacegate_domain::{CallLogEntry, DispatchOutcome, RequestSpec, Result};

/// Performs one provider call
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request once. Failures are reported as a [`DispatchOutcome`]
    /// variant, never as an error; retries belong to the queue.
    async fn dispatch(&self, request: &RequestSpec) -> DispatchOutcome;
}

/// Durable key/value store shared with the rest of the application
///
/// Values are JSON documents. A `ttl` of `None` keeps the key until it is
/// overwritten or deleted.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// Receives one entry per dispatch attempt
///
/// Emission must not block the dispatch path; implementations buffer or log.
pub trait CallLogSink: Send + Sync {
    fn emit(&self, entry: CallLogEntry);
}

/// Downstream consumer of background sync units
///
/// Called once per successfully fetched unit. An error is recorded as a unit
/// error on the task and the sync continues.
#[async_trait]
pub trait SyncResultSink: Send + Sync {
    async fn on_unit(&self, owner_id: &str, unit_ref: &str, payload: &serde_json::Value)
        -> Result<()>;
}
