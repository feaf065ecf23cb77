//! Periodic driver for [`RequestQueue::tick`].
//!
//! Cancellation is only observed between ticks so that a drain in progress
//! always finishes. Items still queued at stop remain queued and are picked
//! up again after a restart of the scheduler.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use pacegate_core::RequestQueue;
//! use pacegate_infra::scheduling::{QueueScheduler, QueueSchedulerConfig, SchedulerError};
//!
//! # async fn example(queue: Arc<RequestQueue>) -> Result<(), SchedulerError> {
//! let scheduler = QueueScheduler::new(queue, QueueSchedulerConfig::default());
//!
//! scheduler.start().await?;
//! // ... application runs ...
//! scheduler.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use pacegate_core::{RequestQueue, TickOutcome};
use pacegate_domain::QueueConfig;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace};

use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// Type alias for task handle to avoid complexity warnings
type TaskHandle = Arc<Mutex<Option<JoinHandle<()>>>>;

/// Configuration for the queue scheduler
#[derive(Debug, Clone)]
pub struct QueueSchedulerConfig {
    /// Period between ticks
    pub tick_interval: Duration,
    /// How long `stop()` waits for an in-flight drain
    pub join_timeout: Duration,
}

impl Default for QueueSchedulerConfig {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

impl From<&QueueConfig> for QueueSchedulerConfig {
    fn from(config: &QueueConfig) -> Self {
        Self { tick_interval: config.tick_interval(), join_timeout: Duration::from_secs(30) }
    }
}

/// Drives the request queue on a fixed period
pub struct QueueScheduler {
    queue: Arc<RequestQueue>,
    config: QueueSchedulerConfig,
    cancellation_token: SyncMutex<CancellationToken>,
    task_handle: TaskHandle,
}

impl QueueScheduler {
    pub fn new(queue: Arc<RequestQueue>, config: QueueSchedulerConfig) -> Self {
        Self {
            queue,
            config,
            cancellation_token: SyncMutex::new(CancellationToken::new()),
            task_handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the tick loop
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::AlreadyRunning`] if the loop is active
    #[instrument(skip(self))]
    pub async fn start(&self) -> SchedulerResult<()> {
        let mut handle_slot = self.task_handle.lock().await;
        if handle_slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(SchedulerError::AlreadyRunning);
        }

        info!(
            tick_interval_ms = self.config.tick_interval.as_millis() as u64,
            "Starting queue scheduler"
        );

        // Fresh token so the scheduler can be restarted after stop
        let cancel = CancellationToken::new();
        *self.cancellation_token.lock() = cancel.clone();

        let queue = Arc::clone(&self.queue);
        let interval = self.config.tick_interval;
        *handle_slot = Some(tokio::spawn(async move {
            Self::tick_loop(queue, interval, cancel).await;
        }));

        Ok(())
    }

    /// Stop the tick loop gracefully
    ///
    /// Waits up to the join timeout for a drain that is already running.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NotRunning`] if the loop is not active
    #[instrument(skip(self))]
    pub async fn stop(&self) -> SchedulerResult<()> {
        let handle = {
            let mut handle_slot = self.task_handle.lock().await;
            match handle_slot.take() {
                Some(handle) if !handle.is_finished() => handle,
                _ => return Err(SchedulerError::NotRunning),
            }
        };

        info!("Stopping queue scheduler");
        self.cancellation_token.lock().cancel();

        let duration = self.config.join_timeout;
        tokio::time::timeout(duration, handle)
            .await
            .map_err(|_| SchedulerError::Timeout { duration })?
            .map_err(|err| SchedulerError::TaskJoinFailed(err.to_string()))?;

        info!("Queue scheduler stopped");
        Ok(())
    }

    /// Check if scheduler is running
    ///
    /// A scheduler is considered running if it has an active task handle that
    /// hasn't finished.
    pub fn is_running(&self) -> bool {
        self.task_handle
            .try_lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    async fn tick_loop(queue: Arc<RequestQueue>, period: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Queue tick loop cancelled");
                    break;
                }
                _ = ticker.tick() => {}
            }

            match queue.tick().await {
                TickOutcome::Drained(report) => debug!(
                    dispatched = report.dispatched,
                    succeeded = report.succeeded,
                    requeued = report.requeued,
                    failed = report.failed,
                    deferred = report.deferred,
                    depth = queue.depth(),
                    "Drained batch"
                ),
                TickOutcome::Limited => debug!(depth = queue.depth(), "Dispatch held by rate limit"),
                outcome => trace!(?outcome, "Tick"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pacegate_core::testing::{MemoryStateStore, RecordingCallLog, ScriptedTransport};
    use pacegate_core::testing::MockClock;
    use pacegate_core::UsageTracker;
    use pacegate_domain::{RateLimitConfig, RequestSpec};

    use super::*;

    fn queue(transport: Arc<ScriptedTransport>) -> Arc<RequestQueue> {
        let store = Arc::new(MemoryStateStore::new());
        let clock = Arc::new(MockClock::new());
        let tracker =
            Arc::new(UsageTracker::new(store, clock.clone(), &RateLimitConfig::default()));
        let config = QueueConfig { spacing_ms: 0, cooling_ms: 0, ..QueueConfig::default() };
        Arc::new(RequestQueue::new(
            transport,
            tracker,
            Arc::new(RecordingCallLog::new()),
            clock,
            config,
        ))
    }

    fn scheduler_config() -> QueueSchedulerConfig {
        QueueSchedulerConfig {
            tick_interval: Duration::from_millis(100),
            join_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn start_twice_fails() {
        let scheduler =
            QueueScheduler::new(queue(Arc::new(ScriptedTransport::echo())), scheduler_config());

        scheduler.start().await.unwrap();
        assert!(scheduler.is_running());
        assert!(matches!(scheduler.start().await, Err(SchedulerError::AlreadyRunning)));

        scheduler.stop().await.unwrap();
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_when_idle_fails() {
        let scheduler =
            QueueScheduler::new(queue(Arc::new(ScriptedTransport::echo())), scheduler_config());
        assert!(matches!(scheduler.stop().await, Err(SchedulerError::NotRunning)));
    }

    #[tokio::test(start_paused = true)]
    async fn drives_enqueued_requests() {
        let transport = Arc::new(ScriptedTransport::echo());
        let queue = queue(transport.clone());
        let scheduler = QueueScheduler::new(queue.clone(), scheduler_config());
        scheduler.start().await.unwrap();

        let response =
            queue.enqueue(RequestSpec::get("strava", "/athlete"), "athlete-1", false).await;
        assert!(response.is_ok());
        assert_eq!(transport.call_count(), 1);

        scheduler.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_stop() {
        let transport = Arc::new(ScriptedTransport::echo());
        let queue = queue(transport.clone());
        let scheduler = QueueScheduler::new(queue.clone(), scheduler_config());

        scheduler.start().await.unwrap();
        scheduler.stop().await.unwrap();

        let pending = queue.submit(RequestSpec::get("strava", "/athlete"), "athlete-1", false);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(queue.depth(), 1, "stopped scheduler leaves items queued");

        scheduler.start().await.unwrap();
        assert!(pending.await.is_ok());
        scheduler.stop().await.unwrap();
    }
}
