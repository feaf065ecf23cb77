//! Error types used throughout the governor

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse grouping of [`PaceGateError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Provider asked us to slow down (429)
    RateLimit,
    /// Credential rejected by the provider (401, 403)
    Authentication,
    /// Any other upstream failure
    Provider,
    /// Lookups for unknown ids
    NotFound,
    /// Persistence layer failures
    Storage,
    /// Configuration problems
    Config,
    /// Everything else
    Internal,
}

/// Main error type for PaceGate
///
/// The first five variants are the dispatch taxonomy surfaced to callers of
/// the request queue. The remaining variants cover ambient failures in the
/// adapters.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum PaceGateError {
    #[error("Rate limited by provider: {0}")]
    RateLimited(String),

    #[error("Provider credential rejected: {0}")]
    AuthExpired(String),

    #[error("Provider error{}: {message}", status_suffix(.status))]
    Provider { status: Option<u16>, message: String },

    #[error("Retry budget exhausted after {attempts} attempts")]
    RetryBudgetExhausted { attempts: u32 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Governor is shutting down")]
    ShuttingDown,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PaceGateError {
    /// Shorthand for a provider failure without an HTTP status.
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider { status: None, message: message.into() }
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::RateLimited(_) => ErrorCategory::RateLimit,
            Self::AuthExpired(_) => ErrorCategory::Authentication,
            Self::Provider { .. } | Self::RetryBudgetExhausted { .. } => ErrorCategory::Provider,
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::Storage(_) | Self::Serialization(_) => ErrorCategory::Storage,
            Self::Config(_) => ErrorCategory::Config,
            Self::ShuttingDown | Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Only the provider's own rate-limit signal is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl From<serde_json::Error> for PaceGateError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for PaceGate operations
pub type Result<T> = std::result::Result<T, PaceGateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rate_limits_are_retryable() {
        assert!(PaceGateError::RateLimited("slow down".into()).is_retryable());
        assert!(!PaceGateError::AuthExpired("expired".into()).is_retryable());
        assert!(!PaceGateError::provider("boom").is_retryable());
        assert!(!PaceGateError::RetryBudgetExhausted { attempts: 4 }.is_retryable());
    }

    #[test]
    fn provider_display_includes_status_when_known() {
        let err = PaceGateError::Provider { status: Some(502), message: "bad gateway".into() };
        assert_eq!(err.to_string(), "Provider error (HTTP 502): bad gateway");
        assert_eq!(PaceGateError::provider("reset").to_string(), "Provider error: reset");
    }

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_value(PaceGateError::NotFound("sync_a_1".into())).unwrap();
        assert_eq!(json["type"], "NotFound");
        assert_eq!(json["message"], "sync_a_1");

        let exhausted =
            serde_json::to_value(PaceGateError::RetryBudgetExhausted { attempts: 4 }).unwrap();
        assert_eq!(exhausted["message"]["attempts"], 4);
    }

    #[test]
    fn categories() {
        assert_eq!(
            PaceGateError::RetryBudgetExhausted { attempts: 1 }.category(),
            ErrorCategory::Provider
        );
        assert_eq!(PaceGateError::Storage("disk".into()).category(), ErrorCategory::Storage);
        assert_eq!(PaceGateError::ShuttingDown.category(), ErrorCategory::Internal);
    }
}
