//! Ordered request queue drained in throttled batches
//!
//! The deque is always laid out as `[priority..., normal...]`, so popping
//! from the front respects priority and FIFO order within each tier. Only
//! [`RequestQueue::tick`] removes items; producers insert from any task.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use pacegate_domain::{
    CallLogEntry, DispatchOutcome, DispatchResponse, PaceGateError, QueueConfig, RequestSpec,
    Result,
};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::retry::{RetryClassifier, Verdict};
use super::usage::UsageTracker;
use crate::ports::{CallLogSink, Transport};
use crate::time::Clock;

type Completion = oneshot::Sender<Result<DispatchResponse>>;

/// One pending unit of work
pub struct QueueItem {
    pub id: Uuid,
    pub request: RequestSpec,
    pub owner_id: String,
    pub priority: bool,
    pub enqueued_at: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Part of a tracked background job rather than a direct caller
    pub background: bool,
    completion: Completion,
}

impl QueueItem {
    fn complete(self, result: Result<DispatchResponse>) {
        // The caller may have stopped waiting; the result is simply dropped.
        if self.completion.send(result).is_err() {
            debug!(item_id = %self.id, "caller dropped before completion");
        }
    }
}

/// Result of a queued request, resolved by the scheduler.
///
/// Dropping it does not cancel the request.
#[must_use = "the request is dispatched regardless; await to observe the result"]
pub struct PendingDispatch {
    id: Uuid,
    receiver: oneshot::Receiver<Result<DispatchResponse>>,
}

impl PendingDispatch {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Future for PendingDispatch {
    type Output = Result<DispatchResponse>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(PaceGateError::ShuttingDown)))
    }
}

/* -------------------------------------------------------------------------- */
/* Tick reporting */
/* -------------------------------------------------------------------------- */

/// What a single scheduler tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another drain is still running
    Busy,
    Empty,
    /// Inside the pause that follows a drained batch
    Cooling,
    /// Usage tracker refused dispatch
    Limited,
    Drained(DrainReport),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub dispatched: usize,
    pub succeeded: usize,
    pub requeued: usize,
    pub failed: usize,
    /// Popped but returned to the queue because the budget ran out mid-batch
    pub deferred: usize,
}

/// Resets the draining flag even if the drain future is dropped
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/* -------------------------------------------------------------------------- */
/* Queue */
/* -------------------------------------------------------------------------- */

pub struct RequestQueue {
    items: Mutex<VecDeque<QueueItem>>,
    draining: AtomicBool,
    cooling_until: Mutex<Option<Instant>>,
    transport: Arc<dyn Transport>,
    tracker: Arc<UsageTracker>,
    call_log: Arc<dyn CallLogSink>,
    clock: Arc<dyn Clock>,
    settings: QueueConfig,
}

impl RequestQueue {
    pub fn new(
        transport: Arc<dyn Transport>,
        tracker: Arc<UsageTracker>,
        call_log: Arc<dyn CallLogSink>,
        clock: Arc<dyn Clock>,
        settings: QueueConfig,
    ) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
            cooling_until: Mutex::new(None),
            transport,
            tracker,
            call_log,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &QueueConfig {
        &self.settings
    }

    /// Queue a request and wait for its final result
    pub async fn enqueue(
        &self,
        request: RequestSpec,
        owner_id: impl Into<String>,
        priority: bool,
    ) -> Result<DispatchResponse> {
        self.submit(request, owner_id, priority).await
    }

    /// Queue a request without waiting
    pub fn submit(
        &self,
        request: RequestSpec,
        owner_id: impl Into<String>,
        priority: bool,
    ) -> PendingDispatch {
        self.push(request, owner_id.into(), priority, false)
    }

    pub(crate) fn submit_background(
        &self,
        request: RequestSpec,
        owner_id: &str,
        priority: bool,
    ) -> PendingDispatch {
        self.push(request, owner_id.to_string(), priority, true)
    }

    pub fn depth(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    fn push(
        &self,
        request: RequestSpec,
        owner_id: String,
        priority: bool,
        background: bool,
    ) -> PendingDispatch {
        let (completion, receiver) = oneshot::channel();
        let id = Uuid::now_v7();
        let item = QueueItem {
            id,
            request,
            owner_id,
            priority,
            enqueued_at: self.clock.now(),
            retry_count: 0,
            max_retries: self.settings.max_retries,
            background,
            completion,
        };
        debug!(
            item_id = %id,
            owner_id = %item.owner_id,
            endpoint = %item.request.path,
            priority,
            background,
            "request queued"
        );

        let mut items = self.items.lock();
        if priority {
            let tier_end = items.partition_point(|queued| queued.priority);
            items.insert(tier_end, item);
        } else {
            items.push_back(item);
        }
        PendingDispatch { id, receiver }
    }

    /// Run one scheduler step.
    ///
    /// Skips when a drain is in progress, the queue is empty, the cooling
    /// period has not elapsed, or the tracker reports a limit. Otherwise pops
    /// at most `min(bucket_size, remaining budget)` items and dispatches them
    /// one after another.
    pub async fn tick(&self) -> TickOutcome {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return TickOutcome::Busy;
        }
        let _guard = DrainGuard(&self.draining);

        if self.depth() == 0 {
            return TickOutcome::Empty;
        }
        if self.cooling_until.lock().is_some_and(|deadline| Instant::now() < deadline) {
            return TickOutcome::Cooling;
        }
        if self.tracker.is_limited().await {
            debug!(queue_depth = self.depth(), "usage limit reached, skipping tick");
            return TickOutcome::Limited;
        }

        let budget = self.settings.bucket_size.min(clamp_usize(self.tracker.remaining()));
        if budget == 0 {
            return TickOutcome::Limited;
        }
        let batch: Vec<QueueItem> = {
            let mut items = self.items.lock();
            let take = budget.min(items.len());
            items.drain(..take).collect()
        };

        let report = self.drain(batch).await;
        *self.cooling_until.lock() = Some(Instant::now() + self.settings.cooling());
        info!(
            dispatched = report.dispatched,
            succeeded = report.succeeded,
            requeued = report.requeued,
            failed = report.failed,
            deferred = report.deferred,
            queue_depth = self.depth(),
            "batch drained"
        );
        TickOutcome::Drained(report)
    }

    #[instrument(skip_all, fields(batch_size = batch.len()))]
    async fn drain(&self, batch: Vec<QueueItem>) -> DrainReport {
        let mut report = DrainReport::default();
        let mut batch = batch.into_iter();

        while let Some(item) = batch.next() {
            if self.tracker.is_limited().await {
                let rest: Vec<QueueItem> = std::iter::once(item).chain(batch.by_ref()).collect();
                report.deferred = rest.len();
                self.restore_front(rest);
                break;
            }

            tokio::time::sleep(self.settings.spacing()).await;
            report.dispatched += 1;
            self.dispatch(item, &mut report).await;
        }
        report
    }

    async fn dispatch(&self, mut item: QueueItem, report: &mut DrainReport) {
        let started = Instant::now();
        let outcome = self.transport.dispatch(&item.request).await;
        let elapsed = started.elapsed();

        self.call_log.emit(self.call_log_entry(&item, &outcome, elapsed.as_millis()));

        match RetryClassifier::decide(outcome, item.retry_count, item.max_retries) {
            Verdict::Resolve { status, payload } => {
                if let Err(err) = self.tracker.record_call().await {
                    debug!(error = %err, "usage counters not persisted after dispatch");
                }
                report.succeeded += 1;
                let attempts = item.retry_count + 1;
                item.complete(Ok(DispatchResponse { status, payload, attempts }));
            }
            Verdict::Requeue { retry_after } => {
                item.retry_count += 1;
                warn!(
                    item_id = %item.id,
                    owner_id = %item.owner_id,
                    endpoint = %item.request.path,
                    retry_count = item.retry_count,
                    max_retries = item.max_retries,
                    retry_after = ?retry_after,
                    "rate limited by provider, requeueing"
                );
                report.requeued += 1;
                self.requeue(item);
            }
            Verdict::Reject(err) => {
                match &err {
                    PaceGateError::RetryBudgetExhausted { .. } | PaceGateError::AuthExpired(_) => {
                        warn!(
                            item_id = %item.id,
                            owner_id = %item.owner_id,
                            endpoint = %item.request.path,
                            error = %err,
                            "request rejected"
                        )
                    }
                    _ => error!(
                        item_id = %item.id,
                        owner_id = %item.owner_id,
                        endpoint = %item.request.path,
                        error = %err,
                        "request failed"
                    ),
                }
                report.failed += 1;
                item.complete(Err(err));
            }
        }
    }

    /// Retried items go to the very back, behind every tier
    fn requeue(&self, mut item: QueueItem) {
        item.priority = false;
        self.items.lock().push_back(item);
    }

    /// Return undispatched items ahead of anything queued since they were
    /// popped, each into its own tier.
    fn restore_front(&self, rest: Vec<QueueItem>) {
        let (priority, normal): (Vec<_>, Vec<_>) = rest.into_iter().partition(|i| i.priority);
        let mut items = self.items.lock();
        let tier_end = items.partition_point(|queued| queued.priority);
        for (offset, item) in normal.into_iter().enumerate() {
            items.insert(tier_end + offset, item);
        }
        for item in priority.into_iter().rev() {
            items.push_front(item);
        }
    }

    fn call_log_entry(
        &self,
        item: &QueueItem,
        outcome: &DispatchOutcome,
        elapsed_ms: u128,
    ) -> CallLogEntry {
        CallLogEntry {
            api: item.request.api.clone(),
            endpoint: item.request.path.clone(),
            method: item.request.method.to_string(),
            status_code: outcome.status_code(),
            response_time_ms: u64::try_from(elapsed_ms).unwrap_or(u64::MAX),
            owner_id: item.owner_id.clone(),
            error: outcome.error_message().map(str::to_string),
            timestamp: self.clock.now(),
        }
    }
}

fn clamp_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}
