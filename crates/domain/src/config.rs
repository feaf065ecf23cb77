//! Configuration structures
//!
//! Every section has defaults so that a partial file (or an empty one) still
//! yields a usable configuration. Loading lives in `pacegate-infra`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_API_NAME, DEFAULT_BUCKET_SIZE, DEFAULT_COOLING_MS, DEFAULT_GROUP_PAUSE_MS,
    DEFAULT_GROUP_SIZE, DEFAULT_LONG_TERM_LIMIT, DEFAULT_LONG_TERM_WINDOW_SECS,
    DEFAULT_MAX_RETRIES, DEFAULT_PROVIDER_BASE_URL, DEFAULT_SHORT_TERM_LIMIT,
    DEFAULT_SHORT_TERM_WINDOW_SECS, DEFAULT_SPACING_MS, DEFAULT_SYNC_LIMIT, DEFAULT_TASK_TTL_SECS,
    DEFAULT_TICK_INTERVAL_MS, MAX_WINDOW_SECS,
};
use crate::errors::{PaceGateError, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub limits: RateLimitConfig,
    pub queue: QueueConfig,
    pub background: BackgroundSyncConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Reject values that would stall or disable the governor
    pub fn validate(&self) -> Result<()> {
        self.limits.validate()?;
        self.queue.validate()?;
        self.background.validate()?;
        if self.provider.base_url.trim().is_empty() {
            return Err(PaceGateError::Config("provider.base_url must not be empty".into()));
        }
        Ok(())
    }
}

/* -------------------------------------------------------------------------- */
/* Provider */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    /// Name reported in call logs
    pub api_name: String,
    pub timeout_secs: u64,
    pub user_agent: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PROVIDER_BASE_URL.to_string(),
            api_name: DEFAULT_API_NAME.to_string(),
            timeout_secs: 30,
            user_agent: None,
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/* -------------------------------------------------------------------------- */
/* Rate Limits */
/* -------------------------------------------------------------------------- */

/// What to do when the counters cannot be written to the state store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistencePolicy {
    /// Report the tracker as limited until a write succeeds
    #[default]
    FailClosed,
    /// Log the failure and keep dispatching
    BestEffort,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub short_term_limit: u64,
    pub short_term_window_secs: u64,
    pub long_term_limit: u64,
    pub long_term_window_secs: u64,
    pub persistence: PersistencePolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            short_term_limit: DEFAULT_SHORT_TERM_LIMIT,
            short_term_window_secs: DEFAULT_SHORT_TERM_WINDOW_SECS,
            long_term_limit: DEFAULT_LONG_TERM_LIMIT,
            long_term_window_secs: DEFAULT_LONG_TERM_WINDOW_SECS,
            persistence: PersistencePolicy::default(),
        }
    }
}

impl RateLimitConfig {
    pub fn short_term_window(&self) -> Duration {
        Duration::from_secs(self.short_term_window_secs)
    }

    pub fn long_term_window(&self) -> Duration {
        Duration::from_secs(self.long_term_window_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.short_term_limit == 0 || self.long_term_limit == 0 {
            return Err(PaceGateError::Config("rate limits must be greater than 0".into()));
        }
        if self.short_term_window_secs == 0 || self.long_term_window_secs == 0 {
            return Err(PaceGateError::Config("rate windows must be greater than 0".into()));
        }
        if self.short_term_window_secs.max(self.long_term_window_secs) > MAX_WINDOW_SECS {
            return Err(PaceGateError::Config(format!(
                "rate windows must not exceed {MAX_WINDOW_SECS} seconds"
            )));
        }
        Ok(())
    }
}

/* -------------------------------------------------------------------------- */
/* Queue */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub tick_interval_ms: u64,
    /// Max items dispatched per drain
    pub bucket_size: usize,
    /// Pause before each dispatch inside a batch
    pub spacing_ms: u64,
    /// Pause after a drained batch
    pub cooling_ms: u64,
    pub max_retries: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            bucket_size: DEFAULT_BUCKET_SIZE,
            spacing_ms: DEFAULT_SPACING_MS,
            cooling_ms: DEFAULT_COOLING_MS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl QueueConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn spacing(&self) -> Duration {
        Duration::from_millis(self.spacing_ms)
    }

    pub fn cooling(&self) -> Duration {
        Duration::from_millis(self.cooling_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bucket_size == 0 {
            return Err(PaceGateError::Config("queue.bucket_size must be greater than 0".into()));
        }
        if self.tick_interval_ms == 0 {
            return Err(PaceGateError::Config(
                "queue.tick_interval_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/* -------------------------------------------------------------------------- */
/* Background Sync */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundSyncConfig {
    pub default_limit: u32,
    /// Detail requests submitted together before pausing
    pub group_size: usize,
    pub group_pause_ms: u64,
    /// Retention of task snapshots in the state store
    pub task_ttl_secs: u64,
}

impl Default for BackgroundSyncConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_SYNC_LIMIT,
            group_size: DEFAULT_GROUP_SIZE,
            group_pause_ms: DEFAULT_GROUP_PAUSE_MS,
            task_ttl_secs: DEFAULT_TASK_TTL_SECS,
        }
    }
}

impl BackgroundSyncConfig {
    pub fn group_pause(&self) -> Duration {
        Duration::from_millis(self.group_pause_ms)
    }

    pub fn task_ttl(&self) -> Duration {
        Duration::from_secs(self.task_ttl_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.group_size == 0 {
            return Err(PaceGateError::Config(
                "background.group_size must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/* -------------------------------------------------------------------------- */
/* Store & Logging */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite file path, or `:memory:` for the in-process store
    pub path: String,
    pub pool_size: u32,
}

impl StoreConfig {
    pub const IN_MEMORY: &'static str = ":memory:";

    pub fn is_in_memory(&self) -> bool {
        self.path == Self::IN_MEMORY
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: "pacegate.db".to_string(), pool_size: 4 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` wins when set
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}
