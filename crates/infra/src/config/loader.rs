//! Configuration loader
//!
//! Loads governor configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! Every successfully loaded configuration is validated before it is returned.
//!
//! ## Environment Variables
//! Required:
//! - `PACEGATE_STORE_PATH`: SQLite file path (or `:memory:`)
//! - `PACEGATE_PROVIDER_BASE_URL`: Provider API root
//!
//! Optional overrides (defaults otherwise):
//! - `PACEGATE_STORE_POOL_SIZE`
//! - `PACEGATE_PROVIDER_TIMEOUT_SECS`
//! - `PACEGATE_SHORT_TERM_LIMIT` / `PACEGATE_LONG_TERM_LIMIT`
//! - `PACEGATE_PERSISTENCE`: `fail_closed` or `best_effort`
//! - `PACEGATE_BUCKET_SIZE`, `PACEGATE_COOLING_MS`, `PACEGATE_MAX_RETRIES`
//! - `PACEGATE_LOG_LEVEL`, `PACEGATE_LOG_JSON` (true/false)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./pacegate.toml` or `./pacegate.json` (current working directory)
//! 2. `./config.toml` or `./config.json` (current working directory)
//! 3. `../config.{toml,json}` and `../../config.{toml,json}`
//! 4. The same names relative to the executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use pacegate_domain::{Config, PaceGateError, PersistencePolicy, Result};

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If any required
/// variables are missing, falls back to loading from a config file.
///
/// # Errors
/// Returns `PaceGateError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
/// - A value fails validation
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// # Errors
/// Returns `PaceGateError::Config` if a required variable is missing or any
/// variable has an invalid value.
pub fn load_from_env() -> Result<Config> {
    let mut config = Config::default();

    config.store.path = env_var("PACEGATE_STORE_PATH")?;
    config.provider.base_url = env_var("PACEGATE_PROVIDER_BASE_URL")?;

    if let Some(pool_size) = env_parse("PACEGATE_STORE_POOL_SIZE")? {
        config.store.pool_size = pool_size;
    }
    if let Some(timeout) = env_parse("PACEGATE_PROVIDER_TIMEOUT_SECS")? {
        config.provider.timeout_secs = timeout;
    }
    if let Some(limit) = env_parse("PACEGATE_SHORT_TERM_LIMIT")? {
        config.limits.short_term_limit = limit;
    }
    if let Some(limit) = env_parse("PACEGATE_LONG_TERM_LIMIT")? {
        config.limits.long_term_limit = limit;
    }
    if let Ok(policy) = std::env::var("PACEGATE_PERSISTENCE") {
        config.limits.persistence = parse_persistence(&policy)?;
    }
    if let Some(bucket) = env_parse("PACEGATE_BUCKET_SIZE")? {
        config.queue.bucket_size = bucket;
    }
    if let Some(cooling) = env_parse("PACEGATE_COOLING_MS")? {
        config.queue.cooling_ms = cooling;
    }
    if let Some(retries) = env_parse("PACEGATE_MAX_RETRIES")? {
        config.queue.max_retries = retries;
    }
    if let Ok(level) = std::env::var("PACEGATE_LOG_LEVEL") {
        config.logging.level = level;
    }
    config.logging.json = env_bool("PACEGATE_LOG_JSON", config.logging.json);

    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `PaceGateError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - A value fails validation
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(PaceGateError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            PaceGateError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| PaceGateError::Config(format!("Failed to read config file: {}", e)))?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| PaceGateError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| PaceGateError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(PaceGateError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    const NAMES: [&str; 8] = [
        "pacegate.toml",
        "pacegate.json",
        "config.toml",
        "config.json",
        "../config.toml",
        "../config.json",
        "../../config.toml",
        "../../config.json",
    ];

    let mut roots = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd);
    }
    if let Some(exe_dir) =
        std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        roots.push(exe_dir);
    }

    roots
        .iter()
        .flat_map(|root| NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.exists())
}

/// Get required environment variable
fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        PaceGateError::Config(format!("Missing required environment variable: {}", key))
    })
}

/// Parse an optional environment variable
///
/// Unset yields `Ok(None)`; set but unparsable is an error.
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| PaceGateError::Config(format!("Invalid value for {}: {}", key, e))),
        Err(_) => Ok(None),
    }
}

fn parse_persistence(raw: &str) -> Result<PersistencePolicy> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "fail_closed" => Ok(PersistencePolicy::FailClosed),
        "best_effort" => Ok(PersistencePolicy::BestEffort),
        other => Err(PaceGateError::Config(format!("Unknown persistence policy: {}", other))),
    }
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
