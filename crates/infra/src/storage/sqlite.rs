//! SQLite-backed state store
//!
//! Values live in a single `kv_state` table. Expiry is stored as epoch
//! milliseconds; expired rows read as absent and are removed by
//! [`SqliteStateStore::purge_expired`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pacegate_core::{Clock, StateStore, SystemClock};
use pacegate_domain::{PaceGateError, Result, StoreConfig};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use tokio::task;
use tracing::{debug, info};

use crate::errors::InfraError;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS kv_state (
    key        TEXT PRIMARY KEY NOT NULL,
    value      TEXT NOT NULL,
    expires_at INTEGER,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_kv_state_expires_at ON kv_state (expires_at);
";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Durable [`StateStore`] over an r2d2 pool of SQLite connections
#[derive(Clone)]
pub struct SqliteStateStore {
    pool: Pool<SqliteConnectionManager>,
    clock: Arc<dyn Clock>,
    path: PathBuf,
}

impl SqliteStateStore {
    /// Open (or create) the database file and ensure the schema exists.
    pub fn open<P: AsRef<Path>>(db_path: P, pool_size: u32) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        let manager = SqliteConnectionManager::file(&path)
            .with_init(|conn| conn.busy_timeout(BUSY_TIMEOUT));
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_timeout(BUSY_TIMEOUT)
            .build(manager)
            .map_err(map_pool_error)?;

        let store = Self { pool, clock: Arc::new(SystemClock), path };
        store.run_migrations()?;

        info!(
            db_path = %store.path.display(),
            max_connections = pool_size.max(1),
            "state store opened"
        );
        Ok(store)
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        Self::open(&config.path, config.pool_size)
    }

    /// Use `clock` for expiry decisions
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.pool.get().map_err(map_pool_error)?;
        conn.execute_batch(SCHEMA_SQL).map_err(map_sql_error)
    }

    /// Delete every expired row, returning how many were removed
    pub async fn purge_expired(&self) -> Result<usize> {
        let pool = self.pool.clone();
        let now = self.clock.millis_since_epoch();

        let removed = task::spawn_blocking(move || -> Result<usize> {
            let conn = pool.get().map_err(map_pool_error)?;
            conn.execute(
                "DELETE FROM kv_state WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![now],
            )
            .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)??;

        if removed > 0 {
            debug!(removed, "purged expired state");
        }
        Ok(removed)
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let pool = self.pool.clone();
        let key = key.to_string();
        let now = self.clock.millis_since_epoch();

        task::spawn_blocking(move || -> Result<Option<String>> {
            let conn = pool.get().map_err(map_pool_error)?;
            conn.query_row(
                "SELECT value FROM kv_state
                 WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                params![key, now],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let pool = self.pool.clone();
        let key = key.to_string();
        let value = value.to_string();
        let now = self.clock.millis_since_epoch();
        let expires_at =
            ttl.map(|ttl| now.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)));

        task::spawn_blocking(move || -> Result<()> {
            let conn = pool.get().map_err(map_pool_error)?;
            conn.execute(
                "INSERT INTO kv_state (key, value, expires_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    expires_at = excluded.expires_at,
                    updated_at = excluded.updated_at",
                params![key, value, expires_at, now],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let pool = self.pool.clone();
        let key = key.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = pool.get().map_err(map_pool_error)?;
            conn.execute("DELETE FROM kv_state WHERE key = ?1", params![key])
                .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }
}

fn map_sql_error(err: rusqlite::Error) -> PaceGateError {
    PaceGateError::from(InfraError::from(err))
}

fn map_pool_error(err: r2d2::Error) -> PaceGateError {
    PaceGateError::from(InfraError::from(err))
}

fn map_join_error(err: task::JoinError) -> PaceGateError {
    PaceGateError::Internal(format!("blocking storage task failed: {err}"))
}
