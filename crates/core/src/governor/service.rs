//! Governor facade - the surface exposed to the web layer

use std::sync::Arc;

use pacegate_domain::{
    Config, DispatchResponse, GovernorStats, RequestSpec, Result, SyncHandle, SyncOptions,
    SyncTask,
};
use tracing::instrument;

use super::background::BackgroundSyncManager;
use super::queue::{PendingDispatch, RequestQueue};
use super::usage::UsageTracker;
use crate::ports::{CallLogSink, StateStore, SyncResultSink, Transport};
use crate::time::{Clock, SystemClock};

/// One governor per provider credential, shared by handle
pub struct Governor {
    queue: Arc<RequestQueue>,
    tracker: Arc<UsageTracker>,
    sync: BackgroundSyncManager,
}

impl Governor {
    pub fn new(
        queue: Arc<RequestQueue>,
        tracker: Arc<UsageTracker>,
        sync: BackgroundSyncManager,
    ) -> Self {
        Self { queue, tracker, sync }
    }

    pub fn builder(transport: Arc<dyn Transport>, store: Arc<dyn StateStore>) -> GovernorBuilder {
        GovernorBuilder::new(transport, store)
    }

    /// Queue one provider call and wait for its result
    #[instrument(skip(self, request), fields(endpoint = %request.path))]
    pub async fn enqueue(
        &self,
        request: RequestSpec,
        owner_id: &str,
        priority: bool,
    ) -> Result<DispatchResponse> {
        self.queue.enqueue(request, owner_id, priority).await
    }

    /// Queue one provider call without waiting
    pub fn submit(&self, request: RequestSpec, owner_id: &str, priority: bool) -> PendingDispatch {
        self.queue.submit(request, owner_id, priority)
    }

    pub async fn start_background_sync(
        &self,
        owner_id: &str,
        credential: &str,
        options: SyncOptions,
    ) -> Result<SyncHandle> {
        self.sync.start_background_sync(owner_id, credential, options).await
    }

    pub async fn get_sync_task_status(&self, task_id: &str) -> Result<SyncTask> {
        self.sync.get_sync_task_status(task_id).await
    }

    pub fn get_usage_stats(&self) -> GovernorStats {
        let usage = self.tracker.stats();
        GovernorStats {
            short_term: usage.short_term,
            long_term: usage.long_term,
            queue_depth: self.queue.depth(),
        }
    }

    pub fn default_sync_options(&self) -> SyncOptions {
        self.sync.default_options()
    }

    pub fn queue(&self) -> &Arc<RequestQueue> {
        &self.queue
    }

    pub fn tracker(&self) -> &Arc<UsageTracker> {
        &self.tracker
    }
}

/* -------------------------------------------------------------------------- */
/* Builder */
/* -------------------------------------------------------------------------- */

/// Wires the governor components from ports and configuration.
///
/// Counters start fresh; call [`UsageTracker::load`] on the built governor's
/// tracker to resume persisted usage.
pub struct GovernorBuilder {
    transport: Arc<dyn Transport>,
    store: Arc<dyn StateStore>,
    call_log: Option<Arc<dyn CallLogSink>>,
    result_sink: Option<Arc<dyn SyncResultSink>>,
    clock: Arc<dyn Clock>,
    config: Config,
}

impl GovernorBuilder {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<dyn StateStore>) -> Self {
        Self {
            transport,
            store,
            call_log: None,
            result_sink: None,
            clock: Arc::new(SystemClock),
            config: Config::default(),
        }
    }

    pub fn call_log(mut self, sink: Arc<dyn CallLogSink>) -> Self {
        self.call_log = Some(sink);
        self
    }

    pub fn result_sink(mut self, sink: Arc<dyn SyncResultSink>) -> Self {
        self.result_sink = Some(sink);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Governor {
        let tracker =
            Arc::new(UsageTracker::new(self.store.clone(), self.clock.clone(), &self.config.limits));
        let call_log: Arc<dyn CallLogSink> =
            self.call_log.unwrap_or_else(|| Arc::new(DiscardCallLog) as Arc<dyn CallLogSink>);
        let queue = Arc::new(RequestQueue::new(
            self.transport,
            tracker.clone(),
            call_log,
            self.clock.clone(),
            self.config.queue.clone(),
        ));

        let mut sync = BackgroundSyncManager::new(
            queue.clone(),
            self.store,
            self.clock,
            self.config.background.clone(),
            self.config.provider.api_name.clone(),
        );
        if let Some(sink) = self.result_sink {
            sync = sync.with_result_sink(sink);
        }

        Governor::new(queue, tracker, sync)
    }
}

struct DiscardCallLog;

impl CallLogSink for DiscardCallLog {
    fn emit(&self, _entry: pacegate_domain::CallLogEntry) {}
}
