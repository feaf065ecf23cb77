//! Production wiring of the governor and its adapters

use std::sync::Arc;

use pacegate_core::{CallLogSink, Governor, StateStore, SyncResultSink};
use pacegate_domain::{Config, Result};
use tracing::{info, warn};

use crate::http::HttpTransport;
use crate::observability::{CallMetricsSink, FanoutCallLogSink, TracingCallLogSink};
use crate::scheduling::{QueueScheduler, QueueSchedulerConfig, SchedulerError};
use crate::storage::open_state_store;

/// Everything the surrounding web layer needs for one provider credential
pub struct GovernorContext {
    config: Config,
    store: Arc<dyn StateStore>,
    governor: Arc<Governor>,
    scheduler: QueueScheduler,
    metrics: Arc<CallMetricsSink>,
}

impl GovernorContext {
    /// Build the context with persisted usage restored.
    ///
    /// The scheduler is created stopped; call [`GovernorContext::start`].
    pub async fn from_config(config: &Config) -> Result<Self> {
        Self::with_result_sink(config, None).await
    }

    /// Same as [`GovernorContext::from_config`], with a sink for background
    /// sync payloads
    pub async fn with_result_sink(
        config: &Config,
        result_sink: Option<Arc<dyn SyncResultSink>>,
    ) -> Result<Self> {
        config.validate()?;

        let store = open_state_store(&config.store)?;
        let transport = Arc::new(HttpTransport::from_config(&config.provider)?);
        let metrics = Arc::new(CallMetricsSink::new());
        let call_log: Arc<dyn CallLogSink> = Arc::new(
            FanoutCallLogSink::new()
                .with(Arc::new(TracingCallLogSink))
                .with(metrics.clone()),
        );

        let mut builder = Governor::builder(transport, store.clone())
            .call_log(call_log)
            .config(config.clone());
        if let Some(sink) = result_sink {
            builder = builder.result_sink(sink);
        }
        let governor = Arc::new(builder.build());
        governor.tracker().load().await?;

        let scheduler = QueueScheduler::new(
            governor.queue().clone(),
            QueueSchedulerConfig::from(&config.queue),
        );

        info!(
            api = %config.provider.api_name,
            store = %config.store.path,
            "Governor context ready"
        );

        Ok(Self { config: config.clone(), store, governor, scheduler, metrics })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn governor(&self) -> &Arc<Governor> {
        &self.governor
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<CallMetricsSink> {
        &self.metrics
    }

    pub fn scheduler(&self) -> &QueueScheduler {
        &self.scheduler
    }

    /// Start draining the queue
    pub async fn start(&self) -> Result<()> {
        self.scheduler.start().await?;
        Ok(())
    }

    /// Stop draining; queued items stay queued
    pub async fn shutdown(&self) -> Result<()> {
        match self.scheduler.stop().await {
            Ok(()) | Err(SchedulerError::NotRunning) => Ok(()),
            Err(err) => {
                warn!(error = %err, "Scheduler did not stop cleanly");
                Err(err.into())
            }
        }
    }
}
