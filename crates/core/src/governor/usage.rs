//! Two-window call budget tracking
//!
//! Windows are fixed and roll over lazily: every read or write first checks
//! whether `now - window_start >= window`, and if so resets that window's
//! count and moves its start to `now`. The counters are persisted after each
//! mutation so a restart resumes from the provider's view of usage.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use pacegate_domain::constants::USAGE_COUNTERS_KEY;
use pacegate_domain::{
    PersistencePolicy, RateLimitConfig, Result, UsageCounters, UsageStats, WindowStats,
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::ports::StateStore;
use crate::time::Clock;

struct TrackerState {
    counters: UsageCounters,
    /// Bumped on every mutation
    version: u64,
    /// Highest version known to be durable
    persisted_version: u64,
}

impl TrackerState {
    fn is_dirty(&self) -> bool {
        self.persisted_version < self.version
    }
}

/// Process-local view of the provider's two rate windows.
///
/// The tracker is advisory: several processes sharing one credential each
/// believe they own the full budget.
pub struct UsageTracker {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    short_limit: u64,
    short_window: Duration,
    long_limit: u64,
    long_window: Duration,
    policy: PersistencePolicy,
    state: Mutex<TrackerState>,
}

impl UsageTracker {
    pub fn new(
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        limits: &RateLimitConfig,
    ) -> Self {
        let counters = UsageCounters::starting_at(clock.now());
        Self {
            store,
            clock,
            short_limit: limits.short_term_limit,
            short_window: secs(limits.short_term_window_secs),
            long_limit: limits.long_term_limit,
            long_window: secs(limits.long_term_window_secs),
            policy: limits.persistence,
            state: Mutex::new(TrackerState { counters, version: 0, persisted_version: 0 }),
        }
    }

    /// Restore persisted counters. Missing state leaves fresh counters.
    pub async fn load(&self) -> Result<()> {
        let Some(raw) = self.store.get(USAGE_COUNTERS_KEY).await? else {
            debug!("no persisted usage counters, starting fresh");
            return Ok(());
        };
        let restored: UsageCounters = serde_json::from_str(&raw)?;

        let now = self.clock.now();
        let mut state = self.state.lock();
        state.counters = restored;
        self.roll_over(&mut state, now);
        info!(
            short_term_count = state.counters.short_term_count,
            long_term_count = state.counters.long_term_count,
            "restored usage counters"
        );
        Ok(())
    }

    /// Count one successful provider call against both windows and persist.
    ///
    /// The in-memory counters advance even when the write fails.
    pub async fn record_call(&self) -> Result<()> {
        let (snapshot, version) = {
            let now = self.clock.now();
            let mut state = self.state.lock();
            self.roll_over(&mut state, now);
            state.counters.short_term_count += 1;
            state.counters.long_term_count += 1;
            state.version += 1;
            (state.counters, state.version)
        };

        let result = self.persist(snapshot, version).await;
        if let Err(err) = &result {
            match self.policy {
                PersistencePolicy::FailClosed => {
                    warn!(error = %err, "failed to persist usage counters, holding dispatch")
                }
                PersistencePolicy::BestEffort => {
                    warn!(error = %err, "failed to persist usage counters")
                }
            }
        }
        result
    }

    /// Whether either window has reached its ceiling.
    ///
    /// Under [`PersistencePolicy::FailClosed`] an unflushed mutation also
    /// counts as limited; each call retries the flush.
    pub async fn is_limited(&self) -> bool {
        let (limited, pending) = {
            let now = self.clock.now();
            let mut state = self.state.lock();
            self.roll_over(&mut state, now);
            let limited = state.counters.short_term_count >= self.short_limit
                || state.counters.long_term_count >= self.long_limit;
            let pending = (self.policy == PersistencePolicy::FailClosed && state.is_dirty())
                .then_some((state.counters, state.version));
            (limited, pending)
        };

        match pending {
            None => limited,
            Some((snapshot, version)) => match self.persist(snapshot, version).await {
                Ok(()) => limited,
                Err(err) => {
                    debug!(error = %err, "usage counters still not durable");
                    true
                }
            },
        }
    }

    /// Calls left before either window is exhausted
    pub fn remaining(&self) -> u64 {
        self.stats().remaining()
    }

    pub fn stats(&self) -> UsageStats {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.roll_over(&mut state, now);
        let counters = state.counters;
        UsageStats {
            short_term: window_stats(
                counters.short_term_count,
                self.short_limit,
                window_end(counters.short_term_window_start, self.short_window),
            ),
            long_term: window_stats(
                counters.long_term_count,
                self.long_limit,
                window_end(counters.long_term_window_start, self.long_window),
            ),
        }
    }

    /// Current counters after applying rollover
    pub fn counters(&self) -> UsageCounters {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.roll_over(&mut state, now);
        state.counters
    }

    fn roll_over(&self, state: &mut TrackerState, now: DateTime<Utc>) {
        let counters = &mut state.counters;
        let mut rolled = false;
        if now - counters.short_term_window_start >= self.short_window {
            counters.short_term_count = 0;
            counters.short_term_window_start = now;
            rolled = true;
        }
        if now - counters.long_term_window_start >= self.long_window {
            counters.long_term_count = 0;
            counters.long_term_window_start = now;
            rolled = true;
        }
        if rolled {
            state.version += 1;
            debug!(
                short_term_count = state.counters.short_term_count,
                long_term_count = state.counters.long_term_count,
                "usage window rolled over"
            );
        }
    }

    async fn persist(&self, snapshot: UsageCounters, version: u64) -> Result<()> {
        let json = serde_json::to_string(&snapshot)?;
        self.store.set(USAGE_COUNTERS_KEY, &json, None).await?;
        let mut state = self.state.lock();
        state.persisted_version = state.persisted_version.max(version);
        Ok(())
    }
}

/// Window length, saturating at the largest representable delta
fn secs(value: u64) -> Duration {
    i64::try_from(value).ok().and_then(Duration::try_seconds).unwrap_or(Duration::MAX)
}

fn window_end(start: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    start.checked_add_signed(window).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn window_stats(used: u64, limit: u64, reset_at: DateTime<Utc>) -> WindowStats {
    WindowStats { used, limit, remaining: limit.saturating_sub(used), reset_at }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use super::*;
    use crate::testing::MemoryStateStore;
    use crate::testing::MockClock;

    fn limits(short: u64, long: u64) -> RateLimitConfig {
        RateLimitConfig {
            short_term_limit: short,
            short_term_window_secs: 900,
            long_term_limit: long,
            long_term_window_secs: 86_400,
            persistence: PersistencePolicy::FailClosed,
        }
    }

    fn tracker(
        limits: RateLimitConfig,
    ) -> (UsageTracker, Arc<MemoryStateStore>, MockClock) {
        let store = Arc::new(MemoryStateStore::new());
        let clock = MockClock::new();
        let tracker = UsageTracker::new(store.clone(), Arc::new(clock.clone()), &limits);
        (tracker, store, clock)
    }

    #[tokio::test]
    async fn limited_once_short_window_is_full() {
        let (tracker, _store, _clock) = tracker(limits(2, 100));

        assert!(!tracker.is_limited().await);
        tracker.record_call().await.unwrap();
        assert!(!tracker.is_limited().await);
        tracker.record_call().await.unwrap();
        assert!(tracker.is_limited().await);
        assert_eq!(tracker.remaining(), 0);
    }

    #[tokio::test]
    async fn long_window_limits_independently() {
        let (tracker, _store, clock) = tracker(limits(2, 3));

        tracker.record_call().await.unwrap();
        tracker.record_call().await.unwrap();
        clock.advance(StdDuration::from_secs(900));
        assert!(!tracker.is_limited().await);

        tracker.record_call().await.unwrap();
        assert!(tracker.is_limited().await);
        let stats = tracker.stats();
        assert_eq!(stats.short_term.used, 1);
        assert_eq!(stats.long_term.used, 3);
        assert_eq!(stats.long_term.remaining, 0);
    }

    #[tokio::test]
    async fn rollover_resets_counter_after_window() {
        let (tracker, _store, clock) = tracker(limits(2, 100));
        tracker.record_call().await.unwrap();
        tracker.record_call().await.unwrap();
        assert!(tracker.is_limited().await);

        clock.advance(StdDuration::from_secs(899));
        assert!(tracker.is_limited().await);

        clock.advance(StdDuration::from_secs(1));
        assert!(!tracker.is_limited().await);
        let counters = tracker.counters();
        assert_eq!(counters.short_term_count, 0);
        assert_eq!(counters.short_term_window_start, clock.now());
        assert_eq!(counters.long_term_count, 2);
    }

    #[tokio::test]
    async fn stats_report_reset_instants() {
        let (tracker, _store, clock) = tracker(limits(100, 1000));
        let start = clock.now();
        tracker.record_call().await.unwrap();

        let stats = tracker.stats();
        assert_eq!(stats.short_term.used, 1);
        assert_eq!(stats.short_term.remaining, 99);
        assert_eq!(stats.short_term.reset_at, start + Duration::seconds(900));
        assert_eq!(stats.long_term.reset_at, start + Duration::seconds(86_400));
    }

    #[tokio::test]
    async fn load_restores_persisted_counters() {
        let (tracker, store, clock) = tracker(limits(100, 1000));
        for _ in 0..5 {
            tracker.record_call().await.unwrap();
        }

        let restarted = UsageTracker::new(store.clone(), Arc::new(clock.clone()), &limits(100, 1000));
        restarted.load().await.unwrap();
        assert_eq!(restarted.counters().short_term_count, 5);
        assert_eq!(restarted.counters().long_term_count, 5);
    }

    #[tokio::test]
    async fn load_applies_rollover_to_stale_state() {
        let (tracker, store, clock) = tracker(limits(100, 1000));
        tracker.record_call().await.unwrap();

        clock.advance(StdDuration::from_secs(3600));
        let restarted = UsageTracker::new(store.clone(), Arc::new(clock.clone()), &limits(100, 1000));
        restarted.load().await.unwrap();
        assert_eq!(restarted.counters().short_term_count, 0);
        assert_eq!(restarted.counters().long_term_count, 1);
    }

    #[tokio::test]
    async fn load_without_state_keeps_fresh_counters() {
        let (tracker, _store, _clock) = tracker(limits(100, 1000));
        tracker.load().await.unwrap();
        assert_eq!(tracker.counters().long_term_count, 0);
    }

    #[tokio::test]
    async fn fail_closed_blocks_until_flush_succeeds() {
        let (tracker, store, _clock) = tracker(limits(100, 1000));
        store.fail_writes(true);

        assert!(tracker.record_call().await.is_err());
        assert_eq!(tracker.counters().short_term_count, 1);
        assert!(tracker.is_limited().await);

        store.fail_writes(false);
        assert!(!tracker.is_limited().await);
        assert!(store.write_count() >= 1);
    }

    #[tokio::test]
    async fn best_effort_keeps_dispatching() {
        let mut config = limits(100, 1000);
        config.persistence = PersistencePolicy::BestEffort;
        let (tracker, store, _clock) = tracker(config);
        store.fail_writes(true);

        assert!(tracker.record_call().await.is_err());
        assert!(!tracker.is_limited().await);
    }

    #[tokio::test]
    async fn never_counts_past_ceiling_when_gated() {
        let (tracker, _store, clock) = tracker(limits(3, 5));
        let mut recorded = 0;
        for _ in 0..20 {
            if !tracker.is_limited().await {
                tracker.record_call().await.unwrap();
                recorded += 1;
            }
            let stats = tracker.stats();
            assert!(stats.short_term.used <= 3);
            assert!(stats.long_term.used <= 5);
            clock.advance(StdDuration::from_secs(120));
        }
        assert_eq!(recorded, 5);
    }

    #[tokio::test]
    async fn oversized_window_saturates_instead_of_overflowing() {
        let mut config = limits(5, 10);
        config.long_term_window_secs = 10_000_000_000_000;
        let (tracker, _store, clock) = tracker(config);

        tracker.record_call().await.unwrap();
        clock.advance(StdDuration::from_secs(86_400 * 365));
        let stats = tracker.stats();
        assert_eq!(stats.long_term.used, 1);
        assert_eq!(stats.long_term.reset_at, DateTime::<Utc>::MAX_UTC);
        assert_eq!(stats.long_term.remaining, 9);
        assert_eq!(tracker.remaining(), 5);
    }
}
