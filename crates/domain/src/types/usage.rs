//! Usage counters and statistics for the provider's call budgets

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/* -------------------------------------------------------------------------- */
/* Persisted Counters */
/* -------------------------------------------------------------------------- */

/// Process-wide call counters for both rate windows.
///
/// Two counts and two window starts; the whole state is persisted after every
/// mutation so that a restart does not forget consumed quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounters {
    pub long_term_count: u64,
    pub long_term_window_start: DateTime<Utc>,
    pub short_term_count: u64,
    pub short_term_window_start: DateTime<Utc>,
}

impl UsageCounters {
    /// Fresh counters with both windows starting at `now`
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            long_term_count: 0,
            long_term_window_start: now,
            short_term_count: 0,
            short_term_window_start: now,
        }
    }
}

/* -------------------------------------------------------------------------- */
/* Diagnostics */
/* -------------------------------------------------------------------------- */

/// Snapshot of a single window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowStats {
    pub used: u64,
    pub limit: u64,
    pub remaining: u64,
    /// When the current window rolls over
    pub reset_at: DateTime<Utc>,
}

/// Snapshot of both windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub short_term: WindowStats,
    pub long_term: WindowStats,
}

impl UsageStats {
    /// Budget left before either window is exhausted
    pub fn remaining(&self) -> u64 {
        self.short_term.remaining.min(self.long_term.remaining)
    }
}

/// Diagnostics exposed to the web layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernorStats {
    pub short_term: WindowStats,
    pub long_term: WindowStats,
    pub queue_depth: usize,
}
