//! Application constants
//!
//! Centralized location for the storage keys and provider defaults used
//! throughout the governor.

// State store keys
pub const USAGE_COUNTERS_KEY: &str = "usage:counters";
pub const SYNC_TASK_KEY_PREFIX: &str = "sync_task:";

// Provider defaults (Strava published ceilings)
pub const DEFAULT_API_NAME: &str = "strava";
pub const DEFAULT_PROVIDER_BASE_URL: &str = "https://www.strava.com/api/v3";
pub const DEFAULT_SHORT_TERM_LIMIT: u64 = 100;
pub const DEFAULT_SHORT_TERM_WINDOW_SECS: u64 = 15 * 60;
pub const DEFAULT_LONG_TERM_LIMIT: u64 = 1000;
pub const DEFAULT_LONG_TERM_WINDOW_SECS: u64 = 24 * 60 * 60;
/// Longest accepted rate window (one leap year)
pub const MAX_WINDOW_SECS: u64 = 366 * 24 * 60 * 60;

// Scheduler defaults
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_BUCKET_SIZE: usize = 10;
pub const DEFAULT_SPACING_MS: u64 = 200;
pub const DEFAULT_COOLING_MS: u64 = 5000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

// Background sync defaults
pub const DEFAULT_SYNC_LIMIT: u32 = 30;
pub const DEFAULT_GROUP_SIZE: usize = 5;
pub const DEFAULT_GROUP_PAUSE_MS: u64 = 1000;
pub const DEFAULT_TASK_TTL_SECS: u64 = 24 * 60 * 60;

/// Storage key for a sync task
pub fn sync_task_key(task_id: &str) -> String {
    format!("{SYNC_TASK_KEY_PREFIX}{task_id}")
}
