//! In-memory port doubles for tests
//!
//! Compiled for this crate's unit tests and, through the `test-utils`
//! feature, for integration tests in downstream crates.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pacegate_domain::{
    CallLogEntry, DispatchOutcome, PaceGateError, RequestSpec, Result,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use crate::governor::RequestQueue;
use crate::ports::{CallLogSink, StateStore, SyncResultSink, Transport};
use crate::time::Clock;

/* -------------------------------------------------------------------------- */
/* Clock */
/* -------------------------------------------------------------------------- */

/// Manually driven clock for deterministic tests
///
/// Clones share the same instant, so a test can hold one handle while the
/// code under test reads another.
#[derive(Debug, Clone)]
pub struct MockClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(start: DateTime<Utc>) -> Self {
        Self { now: Arc::new(Mutex::new(start)) }
    }

    /// Simulate time passing without waiting
    pub fn advance(&self, duration: Duration) {
        let Ok(delta) = chrono::Duration::from_std(duration) else {
            return;
        };
        let mut now = self.now.lock();
        if let Some(next) = now.checked_add_signed(delta) {
            *now = next;
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock() = instant;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/* -------------------------------------------------------------------------- */
/* Outcome helpers */
/* -------------------------------------------------------------------------- */

pub fn ok(payload: Value) -> DispatchOutcome {
    DispatchOutcome::Success { status: 200, payload }
}

pub fn rate_limited() -> DispatchOutcome {
    DispatchOutcome::RateLimited {
        status: 429,
        retry_after: None,
        message: "Rate Limit Exceeded".to_string(),
    }
}

pub fn auth_error() -> DispatchOutcome {
    DispatchOutcome::AuthError { status: 401, message: "Authorization Error".to_string() }
}

pub fn provider_error(status: u16) -> DispatchOutcome {
    DispatchOutcome::OtherError { status: Some(status), message: format!("HTTP {status}") }
}

/* -------------------------------------------------------------------------- */
/* Transport */
/* -------------------------------------------------------------------------- */

type Responder = Box<dyn Fn(&RequestSpec) -> DispatchOutcome + Send + Sync>;

/// Transport that replays scripted outcomes, then falls back to a responder
pub struct ScriptedTransport {
    script: Mutex<VecDeque<DispatchOutcome>>,
    responder: Responder,
    calls: Mutex<Vec<RequestSpec>>,
}

impl ScriptedTransport {
    /// Answers every request with `200` and `{"path": <request path>}`
    pub fn echo() -> Self {
        Self::from_fn(|request| ok(json!({ "path": request.path })))
    }

    pub fn always(outcome: DispatchOutcome) -> Self {
        Self::from_fn(move |_| outcome.clone())
    }

    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&RequestSpec) -> DispatchOutcome + Send + Sync + 'static,
    {
        Self {
            script: Mutex::new(VecDeque::new()),
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue an outcome returned before the responder is consulted
    pub fn then(self, outcome: DispatchOutcome) -> Self {
        self.script.lock().push_back(outcome);
        self
    }

    pub fn calls(&self) -> Vec<RequestSpec> {
        self.calls.lock().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.calls.lock().iter().map(|request| request.path.clone()).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn dispatch(&self, request: &RequestSpec) -> DispatchOutcome {
        self.calls.lock().push(request.clone());
        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| (self.responder)(request))
    }
}

/* -------------------------------------------------------------------------- */
/* State store */
/* -------------------------------------------------------------------------- */

/// Map-backed store with switchable write failures
#[derive(Default)]
pub struct MemoryStateStore {
    entries: Mutex<HashMap<String, (String, Option<Duration>)>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set` fail until switched back
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Successful writes so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        self.entries.lock().get(key).and_then(|(_, ttl)| *ttl)
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.entries.lock().insert(key.to_string(), (value.to_string(), None));
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PaceGateError::Storage("injected write failure".to_string()));
        }
        self.entries.lock().insert(key.to_string(), (value.to_string(), ttl));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/* -------------------------------------------------------------------------- */
/* Sinks */
/* -------------------------------------------------------------------------- */

#[derive(Default)]
pub struct RecordingCallLog {
    entries: Mutex<Vec<CallLogEntry>>,
}

impl RecordingCallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<CallLogEntry> {
        self.entries.lock().clone()
    }
}

impl CallLogSink for RecordingCallLog {
    fn emit(&self, entry: CallLogEntry) {
        self.entries.lock().push(entry);
    }
}

/// Collects unit payloads; rejects the unit refs it was told to reject
#[derive(Default)]
pub struct RecordingResultSink {
    units: Mutex<Vec<(String, String)>>,
    reject: Mutex<Vec<String>>,
}

impl RecordingResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(self, unit_ref: impl Into<String>) -> Self {
        self.reject.lock().push(unit_ref.into());
        self
    }

    /// `(owner_id, unit_ref)` pairs accepted so far
    pub fn units(&self) -> Vec<(String, String)> {
        self.units.lock().clone()
    }
}

#[async_trait]
impl SyncResultSink for RecordingResultSink {
    async fn on_unit(&self, owner_id: &str, unit_ref: &str, _payload: &Value) -> Result<()> {
        if self.reject.lock().iter().any(|r| r == unit_ref) {
            return Err(PaceGateError::Storage(format!("could not store unit {unit_ref}")));
        }
        self.units.lock().push((owner_id.to_string(), unit_ref.to_string()));
        Ok(())
    }
}

/* -------------------------------------------------------------------------- */
/* Drivers */
/* -------------------------------------------------------------------------- */

/// Tick the queue forever at `period`; abort the handle to stop
pub fn spawn_ticker(queue: Arc<RequestQueue>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            queue.tick().await;
            tokio::time::sleep(period).await;
        }
    })
}
