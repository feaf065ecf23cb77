//! Background synchronization jobs

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a [`SyncTask`]
///
/// Transitions only move forward: pending → running → completed, or
/// pending → failed when the index fetch itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl SyncStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether moving from `self` to `next` is a legal forward transition
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failed)
                | (Self::Running, Self::Completed)
        )
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// A unit that could not be fetched or stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitError {
    pub unit_ref: String,
    pub message: String,
}

/// Persisted progress record for one background sync job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncTask {
    pub task_id: String,
    pub owner_id: String,
    pub status: SyncStatus,
    pub progress_percent: f64,
    pub total_units: u64,
    pub completed_units: u64,
    #[serde(default)]
    pub errors: Vec<UnitError>,
    /// Set only when the whole task failed
    #[serde(default)]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

impl SyncTask {
    /// Id derived from the owner and the start instant.
    ///
    /// The v7 suffix keeps ids unique when one owner starts several jobs
    /// within the same millisecond.
    pub fn derive_id(owner_id: &str, started_at: DateTime<Utc>) -> String {
        format!("sync_{owner_id}_{}_{}", started_at.timestamp_millis(), Uuid::now_v7().simple())
    }

    pub fn pending(owner_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        let owner_id = owner_id.into();
        Self {
            task_id: Self::derive_id(&owner_id, started_at),
            owner_id,
            status: SyncStatus::Pending,
            progress_percent: 0.0,
            total_units: 0,
            completed_units: 0,
            errors: Vec::new(),
            error: None,
            started_at,
            ended_at: None,
        }
    }

    /// Index fetched; `total_units` sub-requests are about to be queued
    pub fn mark_running(&mut self, total_units: u64) {
        self.status = SyncStatus::Running;
        self.total_units = total_units;
        self.completed_units = 0;
        self.progress_percent = 0.0;
    }

    /// Record the completion of one unit, successful or not.
    ///
    /// Completes the task once every unit has been attempted.
    pub fn record_unit(&mut self, error: Option<UnitError>, now: DateTime<Utc>) {
        if self.status != SyncStatus::Running || self.completed_units >= self.total_units {
            return;
        }
        if let Some(error) = error {
            self.errors.push(error);
        }
        self.completed_units += 1;
        self.progress_percent = percent(self.completed_units, self.total_units);
        if self.completed_units == self.total_units {
            self.mark_completed(now);
        }
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.status = SyncStatus::Completed;
        self.progress_percent = 100.0;
        self.ended_at = Some(now);
    }

    pub fn mark_failed(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.status = SyncStatus::Failed;
        self.error = Some(error.into());
        self.ended_at = Some(now);
    }
}

fn percent(done: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (done as f64 / total as f64 * 100.0).min(100.0)
}

/// Options accepted when starting a background sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Number of most recent activities to fetch
    pub limit: u32,
    /// Only fetch activities that started after this instant
    #[serde(default)]
    pub after: Option<DateTime<Utc>>,
}

impl SyncOptions {
    /// Largest page the provider returns for an index fetch
    pub const MAX_LIMIT: u32 = 200;

    pub fn with_limit(limit: u32) -> Self {
        Self { limit, after: None }
    }

    pub fn clamped_limit(&self) -> u32 {
        self.limit.clamp(1, Self::MAX_LIMIT)
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::with_limit(crate::constants::DEFAULT_SYNC_LIMIT)
    }
}

/// Returned to the caller immediately when a sync is started
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncHandle {
    pub task_id: String,
    pub status: SyncStatus,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn started() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn task_id_is_derived_from_owner_and_start() {
        let task = SyncTask::pending("athlete-7", started());
        let prefix = format!("sync_athlete-7_{}_", started().timestamp_millis());
        assert!(task.task_id.starts_with(&prefix), "{}", task.task_id);
        assert_eq!(task.status, SyncStatus::Pending);
    }

    #[test]
    fn same_owner_and_instant_get_distinct_ids() {
        let first = SyncTask::pending("athlete-7", started());
        let second = SyncTask::pending("athlete-7", started());
        assert_ne!(first.task_id, second.task_id);
    }

    #[test]
    fn progress_tracks_completed_units_and_finishes() {
        let mut task = SyncTask::pending("a", started());
        task.mark_running(4);

        task.record_unit(None, started());
        assert_eq!(task.progress_percent, 25.0);

        task.record_unit(
            Some(UnitError { unit_ref: "2".into(), message: "boom".into() }),
            started(),
        );
        task.record_unit(None, started());
        assert_eq!(task.status, SyncStatus::Running);

        task.record_unit(None, started());
        assert_eq!(task.status, SyncStatus::Completed);
        assert_eq!(task.completed_units, 4);
        assert_eq!(task.errors.len(), 1);
        assert!(task.ended_at.is_some());

        // extra completions are ignored
        task.record_unit(None, started());
        assert_eq!(task.completed_units, 4);
    }

    #[test]
    fn transitions_only_move_forward() {
        assert!(SyncStatus::Pending.can_transition_to(SyncStatus::Running));
        assert!(SyncStatus::Pending.can_transition_to(SyncStatus::Failed));
        assert!(SyncStatus::Running.can_transition_to(SyncStatus::Completed));
        assert!(!SyncStatus::Running.can_transition_to(SyncStatus::Pending));
        assert!(!SyncStatus::Completed.can_transition_to(SyncStatus::Running));
        assert!(!SyncStatus::Running.can_transition_to(SyncStatus::Failed));
    }

    #[test]
    fn limit_is_clamped() {
        assert_eq!(SyncOptions::with_limit(0).clamped_limit(), 1);
        assert_eq!(SyncOptions::with_limit(500).clamped_limit(), 200);
        assert_eq!(SyncOptions::default().clamped_limit(), 30);
    }
}
