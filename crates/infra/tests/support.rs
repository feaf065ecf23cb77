use std::time::Duration;

use pacegate_domain::{Config, PaceGateError, StoreConfig, SyncTask};
use pacegate_infra::GovernorContext;
use tempfile::TempDir;

/// Config tuned for fast tests against a mock provider.
pub fn fast_config(base_url: &str, store_path: &str) -> Config {
    let mut config = Config::default();
    config.provider.base_url = base_url.to_string();
    config.provider.timeout_secs = 5;
    config.queue.tick_interval_ms = 10;
    config.queue.spacing_ms = 0;
    config.queue.cooling_ms = 20;
    config.queue.max_retries = 2;
    config.background.group_pause_ms = 10;
    config.store = StoreConfig { path: store_path.to_string(), pool_size: 2 };
    config
}

/// Temporary SQLite location that lives for the duration of a test.
pub struct TestStore {
    pub path: String,
    _temp_dir: TempDir,
}

impl TestStore {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let path = temp_dir.path().join("pacegate.db").to_string_lossy().into_owned();
        Self { path, _temp_dir: temp_dir }
    }
}

/// Build a context and start its scheduler.
pub async fn running_context(config: &Config) -> GovernorContext {
    let context = GovernorContext::from_config(config).await.expect("context should build");
    context.start().await.expect("scheduler should start");
    context
}

/// Poll a sync task until it reaches a terminal state.
pub async fn wait_for_terminal(context: &GovernorContext, task_id: &str) -> SyncTask {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        match context.governor().get_sync_task_status(task_id).await {
            Ok(task) if task.status.is_terminal() => return task,
            Ok(_) | Err(PaceGateError::NotFound(_)) => {}
            Err(err) => panic!("unexpected status error: {err}"),
        }
        assert!(tokio::time::Instant::now() < deadline, "sync task did not finish in time");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
