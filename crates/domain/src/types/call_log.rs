//! Call-log events emitted once per dispatch attempt

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One attempted call against the provider.
///
/// Emitted for observability only; the governor never reads these back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallLogEntry {
    pub api: String,
    pub endpoint: String,
    pub method: String,
    /// `None` when the request never produced an HTTP response
    pub status_code: Option<u16>,
    pub response_time_ms: u64,
    pub owner_id: String,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CallLogEntry {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
