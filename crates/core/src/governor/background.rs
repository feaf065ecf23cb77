//! Background synchronization jobs
//!
//! A job fetches an activity index through the queue at priority, then
//! submits one detail request per activity in small groups. Progress is
//! persisted after every change so pollers see a monotonic snapshot.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use pacegate_domain::constants::sync_task_key;
use pacegate_domain::{
    BackgroundSyncConfig, DispatchResponse, PaceGateError, RequestSpec, Result, SyncHandle,
    SyncOptions, SyncTask, UnitError,
};
use serde_json::Value;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, instrument, warn};

use super::queue::RequestQueue;
use crate::ports::{StateStore, SyncResultSink};
use crate::time::Clock;

const INDEX_PATH: &str = "/athlete/activities";

/// Starts background jobs and serves their persisted snapshots
pub struct BackgroundSyncManager {
    queue: Arc<RequestQueue>,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    sink: Option<Arc<dyn SyncResultSink>>,
    settings: BackgroundSyncConfig,
    api: String,
}

impl BackgroundSyncManager {
    pub fn new(
        queue: Arc<RequestQueue>,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        settings: BackgroundSyncConfig,
        api: impl Into<String>,
    ) -> Self {
        Self { queue, store, clock, sink: None, settings, api: api.into() }
    }

    /// Hand each fetched unit to `sink`
    pub fn with_result_sink(mut self, sink: Arc<dyn SyncResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Options using the configured default limit
    pub fn default_options(&self) -> SyncOptions {
        SyncOptions::with_limit(self.settings.default_limit)
    }

    /// Persist a pending task and start the job in the background.
    ///
    /// Returns as soon as the pending snapshot is stored.
    #[instrument(skip(self, credential, options), fields(limit = options.limit))]
    pub async fn start_background_sync(
        &self,
        owner_id: &str,
        credential: &str,
        options: SyncOptions,
    ) -> Result<SyncHandle> {
        let task = SyncTask::pending(owner_id, self.clock.now());
        let handle = SyncHandle { task_id: task.task_id.clone(), status: task.status };

        let json = serde_json::to_string(&task)?;
        self.store.set(&sync_task_key(&task.task_id), &json, Some(self.settings.task_ttl())).await?;
        info!(task_id = %task.task_id, "background sync started");

        let job = SyncJob {
            queue: Arc::clone(&self.queue),
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            sink: self.sink.clone(),
            group_size: self.settings.group_size.max(1),
            group_pause: self.settings.group_pause(),
            ttl: self.settings.task_ttl(),
            api: self.api.clone(),
            credential: credential.to_string(),
            options,
            task,
        };
        tokio::spawn(job.run());

        Ok(handle)
    }

    /// Latest persisted snapshot of a task
    pub async fn get_sync_task_status(&self, task_id: &str) -> Result<SyncTask> {
        let raw = self
            .store
            .get(&sync_task_key(task_id))
            .await?
            .ok_or_else(|| PaceGateError::NotFound(format!("sync task {task_id}")))?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/* -------------------------------------------------------------------------- */
/* Job */
/* -------------------------------------------------------------------------- */

/// Sole owner of one task's state while the job runs
struct SyncJob {
    queue: Arc<RequestQueue>,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    sink: Option<Arc<dyn SyncResultSink>>,
    group_size: usize,
    group_pause: Duration,
    ttl: Duration,
    api: String,
    credential: String,
    options: SyncOptions,
    task: SyncTask,
}

impl SyncJob {
    #[instrument(skip_all, fields(task_id = %self.task.task_id, owner_id = %self.task.owner_id))]
    async fn run(mut self) {
        let unit_refs = match self.fetch_index().await {
            Ok(unit_refs) => unit_refs,
            Err(err) => {
                error!(error = %err, "activity index fetch failed");
                self.task.mark_failed(err.to_string(), self.clock.now());
                self.persist().await;
                return;
            }
        };

        let total = unit_refs.len();
        self.task.mark_running(total as u64);
        self.persist().await;
        info!(total_units = total, "activity index fetched");

        if total == 0 {
            self.task.mark_completed(self.clock.now());
            self.persist().await;
            return;
        }

        let owner_id = self.task.owner_id.clone();
        let mut groups = unit_refs.chunks(self.group_size).map(<[String]>::to_vec).peekable();
        let mut in_flight = FuturesUnordered::new();
        let mut next_group_at = Instant::now();

        loop {
            tokio::select! {
                _ = sleep_until(next_group_at), if groups.peek().is_some() => {
                    if let Some(group) = groups.next() {
                        debug!(group_len = group.len(), "submitting detail requests");
                        for unit_ref in group {
                            let pending = self.queue.submit_background(
                                self.detail_request(&unit_ref),
                                &owner_id,
                                false,
                            );
                            in_flight.push(async move { (unit_ref, pending.await) });
                        }
                    }
                    next_group_at = Instant::now() + self.group_pause;
                }
                Some((unit_ref, result)) = in_flight.next(), if !in_flight.is_empty() => {
                    self.record(unit_ref, result).await;
                }
                else => break,
            }
        }

        info!(
            completed_units = self.task.completed_units,
            unit_errors = self.task.errors.len(),
            "background sync completed"
        );
    }

    async fn fetch_index(&self) -> Result<Vec<String>> {
        let mut request = RequestSpec::get(&self.api, INDEX_PATH)
            .with_query("per_page", self.options.clamped_limit())
            .with_query("page", 1)
            .with_bearer(&self.credential);
        if let Some(after) = self.options.after {
            request = request.with_query("after", after.timestamp());
        }

        let response = self.queue.submit_background(request, &self.task.owner_id, true).await?;
        parse_index(&response.payload)
    }

    fn detail_request(&self, unit_ref: &str) -> RequestSpec {
        RequestSpec::get(&self.api, format!("/activities/{unit_ref}")).with_bearer(&self.credential)
    }

    async fn record(&mut self, unit_ref: String, result: Result<DispatchResponse>) {
        let failure = match result {
            Ok(response) => match &self.sink {
                Some(sink) => sink
                    .on_unit(&self.task.owner_id, &unit_ref, &response.payload)
                    .await
                    .err(),
                None => None,
            },
            Err(err) => Some(err),
        };

        let error = failure.map(|err| {
            warn!(unit_ref = %unit_ref, error = %err, "unit failed");
            UnitError { unit_ref, message: err.to_string() }
        });
        self.task.record_unit(error, self.clock.now());
        self.persist().await;
    }

    async fn persist(&self) {
        let key = sync_task_key(&self.task.task_id);
        let result = match serde_json::to_string(&self.task) {
            Ok(json) => self.store.set(&key, &json, Some(self.ttl)).await,
            Err(err) => Err(err.into()),
        };
        if let Err(err) = result {
            warn!(error = %err, status = %self.task.status, "failed to persist sync task");
        }
    }
}

/// Extract unit references from an index payload.
///
/// The payload must be an array whose elements carry a numeric or string `id`.
fn parse_index(payload: &Value) -> Result<Vec<String>> {
    let entries = payload
        .as_array()
        .ok_or_else(|| PaceGateError::provider("malformed activity index: expected an array"))?;

    entries
        .iter()
        .enumerate()
        .map(|(position, entry)| match entry.get("id") {
            Some(Value::Number(id)) => Ok(id.to_string()),
            Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
            _ => Err(PaceGateError::provider(format!(
                "malformed activity index: entry {position} has no id"
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use pacegate_domain::{PersistencePolicy, QueueConfig, RateLimitConfig, SyncStatus};
    use serde_json::json;

    use super::*;
    use crate::governor::UsageTracker;
    use crate::testing::{
        auth_error, ok, provider_error, spawn_ticker, MemoryStateStore, RecordingCallLog,
        RecordingResultSink, ScriptedTransport,
    };
    use crate::testing::MockClock;

    struct Fixture {
        manager: BackgroundSyncManager,
        queue: Arc<RequestQueue>,
        transport: Arc<ScriptedTransport>,
        store: Arc<MemoryStateStore>,
    }

    fn fixture(transport: ScriptedTransport) -> Fixture {
        let transport = Arc::new(transport);
        let store = Arc::new(MemoryStateStore::new());
        let clock: Arc<dyn Clock> = Arc::new(MockClock::new());
        let limits = RateLimitConfig {
            persistence: PersistencePolicy::BestEffort,
            ..RateLimitConfig::default()
        };
        let tracker = Arc::new(UsageTracker::new(store.clone(), clock.clone(), &limits));
        let queue = Arc::new(RequestQueue::new(
            transport.clone(),
            tracker,
            Arc::new(RecordingCallLog::new()),
            clock.clone(),
            QueueConfig { cooling_ms: 500, spacing_ms: 10, ..QueueConfig::default() },
        ));
        let settings = BackgroundSyncConfig { group_size: 3, ..BackgroundSyncConfig::default() };
        let manager =
            BackgroundSyncManager::new(queue.clone(), store.clone(), clock, settings, "strava");
        Fixture { manager, queue, transport, store }
    }

    fn index_of(count: u64) -> Value {
        Value::Array((1..=count).map(|id| json!({ "id": id, "name": "Morning Run" })).collect())
    }

    /// Activity index of `units` entries; detail ids in `failing` return 500
    fn provider(units: u64, failing: &'static [&'static str]) -> ScriptedTransport {
        ScriptedTransport::from_fn(move |request| {
            if request.path == INDEX_PATH {
                return ok(index_of(units));
            }
            let id = request.path.trim_start_matches("/activities/");
            if failing.iter().any(|failed| *failed == id) {
                provider_error(500)
            } else {
                ok(json!({ "id": id }))
            }
        })
    }

    async fn wait_for_terminal(manager: &BackgroundSyncManager, task_id: &str) -> Vec<SyncTask> {
        let mut polls = Vec::new();
        for _ in 0..600 {
            let snapshot = manager.get_sync_task_status(task_id).await.unwrap();
            let done = snapshot.status.is_terminal();
            polls.push(snapshot);
            if done {
                return polls;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        panic!("task {task_id} never finished");
    }

    #[tokio::test(start_paused = true)]
    async fn partial_failures_still_complete() {
        let f = fixture(provider(10, &["2", "5", "9"]));
        let ticker = spawn_ticker(f.queue.clone(), Duration::from_millis(100));

        let handle = f
            .manager
            .start_background_sync("athlete-1", "token", SyncOptions::with_limit(10))
            .await
            .unwrap();
        assert_eq!(handle.status, SyncStatus::Pending);

        let polls = wait_for_terminal(&f.manager, &handle.task_id).await;
        let last = polls.last().unwrap();
        assert_eq!(last.status, SyncStatus::Completed);
        assert_eq!(last.total_units, 10);
        assert_eq!(last.completed_units, 10);
        assert_eq!(last.errors.len(), 3);
        assert_eq!(last.progress_percent, 100.0);
        assert!(last.ended_at.is_some());
        ticker.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn polled_progress_is_monotonic() {
        let f = fixture(provider(8, &[]));
        let ticker = spawn_ticker(f.queue.clone(), Duration::from_millis(100));
        let handle =
            f.manager.start_background_sync("a", "token", SyncOptions::with_limit(8)).await.unwrap();

        let polls = wait_for_terminal(&f.manager, &handle.task_id).await;
        for pair in polls.windows(2) {
            assert!(pair[1].completed_units >= pair[0].completed_units);
            assert!(pair[1].progress_percent >= pair[0].progress_percent);
            assert!(
                pair[0].status == pair[1].status || pair[0].status.can_transition_to(pair[1].status),
                "{} -> {}",
                pair[0].status,
                pair[1].status
            );
        }
        ticker.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_jobs_for_one_owner_keep_separate_records() {
        // MockClock never moves, so both jobs start at the same instant
        let f = fixture(provider(2, &[]));
        let first = f
            .manager
            .start_background_sync("athlete-1", "token", SyncOptions::with_limit(2))
            .await
            .unwrap();
        let second = f
            .manager
            .start_background_sync("athlete-1", "token", SyncOptions::with_limit(2))
            .await
            .unwrap();
        assert_ne!(first.task_id, second.task_id);

        let ticker = spawn_ticker(f.queue.clone(), Duration::from_millis(100));
        for task_id in [&first.task_id, &second.task_id] {
            let polls = wait_for_terminal(&f.manager, task_id).await;
            let last = polls.last().unwrap();
            assert_eq!(&last.task_id, task_id);
            assert_eq!(last.status, SyncStatus::Completed);
            assert_eq!(last.completed_units, 2);
        }
        assert_eq!(f.transport.paths().iter().filter(|p| p.as_str() == INDEX_PATH).count(), 2);
        ticker.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn index_request_uses_limit_credential_and_priority() {
        let f = fixture(provider(2, &[]));
        let _normal = f.queue.submit(RequestSpec::get("strava", "/athlete"), "other", false);

        let options = SyncOptions {
            limit: 2,
            after: Some(chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap()),
        };
        let handle = f.manager.start_background_sync("a", "secret", options).await.unwrap();
        while f.queue.depth() < 2 {
            tokio::task::yield_now().await;
        }
        let ticker = spawn_ticker(f.queue.clone(), Duration::from_millis(100));
        wait_for_terminal(&f.manager, &handle.task_id).await;
        ticker.abort();

        let calls = f.transport.calls();
        let index = &calls[0];
        assert_eq!(index.path, INDEX_PATH);
        assert_eq!(index.bearer_token.as_deref(), Some("secret"));
        assert!(index.query.contains(&("per_page".to_string(), "2".to_string())));
        assert!(index.query.contains(&("page".to_string(), "1".to_string())));
        assert!(index.query.contains(&("after".to_string(), "1700000000".to_string())));
        assert_eq!(calls[1].path, "/athlete");
        assert!(calls[2..].iter().all(|c| c.path.starts_with("/activities/")));
    }

    #[tokio::test(start_paused = true)]
    async fn index_failure_fails_task() {
        let f = fixture(ScriptedTransport::always(auth_error()));
        let ticker = spawn_ticker(f.queue.clone(), Duration::from_millis(100));
        let handle =
            f.manager.start_background_sync("a", "stale", SyncOptions::default()).await.unwrap();

        let polls = wait_for_terminal(&f.manager, &handle.task_id).await;
        let last = polls.last().unwrap();
        assert_eq!(last.status, SyncStatus::Failed);
        assert!(last.error.as_deref().unwrap_or_default().contains("credential"));
        assert_eq!(f.transport.call_count(), 1);
        ticker.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_index_fails_task() {
        let f = fixture(ScriptedTransport::always(ok(json!({ "message": "nope" }))));
        let ticker = spawn_ticker(f.queue.clone(), Duration::from_millis(100));
        let handle =
            f.manager.start_background_sync("a", "token", SyncOptions::default()).await.unwrap();

        let polls = wait_for_terminal(&f.manager, &handle.task_id).await;
        assert_eq!(polls.last().unwrap().status, SyncStatus::Failed);
        ticker.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn empty_index_completes_immediately() {
        let f = fixture(provider(0, &[]));
        let ticker = spawn_ticker(f.queue.clone(), Duration::from_millis(100));
        let handle =
            f.manager.start_background_sync("a", "token", SyncOptions::default()).await.unwrap();

        let polls = wait_for_terminal(&f.manager, &handle.task_id).await;
        let last = polls.last().unwrap();
        assert_eq!(last.status, SyncStatus::Completed);
        assert_eq!(last.total_units, 0);
        assert_eq!(last.progress_percent, 100.0);
        ticker.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn sink_errors_become_unit_errors() {
        let sink = Arc::new(RecordingResultSink::new().rejecting("3"));
        let f = fixture(provider(4, &[]));
        let manager = BackgroundSyncManager::new(
            f.queue.clone(),
            f.store.clone(),
            Arc::new(MockClock::new()),
            BackgroundSyncConfig::default(),
            "strava",
        )
        .with_result_sink(sink.clone());
        let ticker = spawn_ticker(f.queue.clone(), Duration::from_millis(100));

        let handle = manager.start_background_sync("a", "t", SyncOptions::with_limit(4)).await.unwrap();
        let polls = wait_for_terminal(&manager, &handle.task_id).await;
        let last = polls.last().unwrap();
        assert_eq!(last.status, SyncStatus::Completed);
        assert_eq!(last.errors.len(), 1);
        assert_eq!(last.errors[0].unit_ref, "3");
        assert_eq!(sink.units().len(), 3);
        ticker.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn snapshots_are_stored_with_retention() {
        let f = fixture(provider(1, &[]));
        let handle =
            f.manager.start_background_sync("a", "t", SyncOptions::default()).await.unwrap();
        assert_eq!(
            f.store.ttl_of(&sync_task_key(&handle.task_id)),
            Some(Duration::from_secs(86_400))
        );
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let f = fixture(ScriptedTransport::echo());
        let err = f.manager.get_sync_task_status("sync_nobody_1").await.unwrap_err();
        assert!(matches!(err, PaceGateError::NotFound(_)));
    }

    #[test]
    fn parse_index_accepts_numeric_and_string_ids() {
        let refs = parse_index(&json!([{ "id": 12 }, { "id": "abc" }])).unwrap();
        assert_eq!(refs, vec!["12", "abc"]);
        assert!(parse_index(&json!([{ "name": "no id" }])).is_err());
        assert!(parse_index(&json!({ "id": 1 })).is_err());
    }
}
