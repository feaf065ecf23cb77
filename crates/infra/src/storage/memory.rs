//! Process-local state store
//!
//! Selected with `store.path = ":memory:"`. Nothing survives a restart, so
//! it suits tests and single-shot tools rather than the web process.
//!
//! Expired entries read as absent. Every write also sweeps them, so keys
//! that are never read again do not accumulate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use pacegate_core::{Clock, StateStore, SystemClock};
use pacegate_domain::Result;
use tracing::debug;

struct Entry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

pub struct InMemoryStateStore {
    entries: DashMap<String, Entry>,
    clock: Arc<dyn Clock>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { entries: DashMap::new(), clock }
    }

    /// Live (unexpired) keys
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries.iter().filter(|entry| is_live(entry.value(), now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| is_live(entry, now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "purged expired state");
        }
        removed
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

fn is_live(entry: &Entry, now: DateTime<Utc>) -> bool {
    entry.expires_at.map_or(true, |expires_at| expires_at > now)
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = self.clock.now();
        let expired = match self.entries.get(key) {
            None => return Ok(None),
            Some(entry) if is_live(&entry, now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
        };
        if expired {
            self.entries.remove_if(key, |_, entry| !is_live(entry, now));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let now = self.clock.now();
        let expires_at = ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .and_then(|ttl| now.checked_add_signed(ttl));
        self.purge_expired();
        self.entries.insert(key.to_string(), Entry { value: value.to_string(), expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}
