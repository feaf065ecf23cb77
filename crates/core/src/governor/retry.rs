//! Dispatch outcome classification
//!
//! Retries are reserved for the provider's own rate-limit signal. Auth
//! failures need an external credential refresh and anything else is an
//! unclassified upstream fault, so both fail on the first attempt.

use std::time::Duration;

use pacegate_domain::{DispatchOutcome, PaceGateError};
use serde_json::Value;

/// The four ways a dispatch can end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Success,
    RetryableRateLimit,
    FatalAuth,
    FatalOther,
}

impl Classification {
    pub fn is_retryable(self) -> bool {
        self == Self::RetryableRateLimit
    }
}

/// What the queue should do with an item after a dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Deliver the payload to the caller
    Resolve { status: u16, payload: Value },
    /// Push the item to the back of the queue with `retry_count + 1`.
    ///
    /// `retry_after` is the provider's hint, kept for logging only.
    Requeue { retry_after: Option<Duration> },
    /// Deliver the error to the caller
    Reject(PaceGateError),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RetryClassifier;

impl RetryClassifier {
    pub fn classify(outcome: &DispatchOutcome) -> Classification {
        match outcome {
            DispatchOutcome::Success { .. } => Classification::Success,
            DispatchOutcome::RateLimited { .. } => Classification::RetryableRateLimit,
            DispatchOutcome::AuthError { .. } => Classification::FatalAuth,
            DispatchOutcome::OtherError { .. } => Classification::FatalOther,
        }
    }

    /// Decide the fate of an item that has already been retried
    /// `retry_count` times.
    pub fn decide(outcome: DispatchOutcome, retry_count: u32, max_retries: u32) -> Verdict {
        let classification = Self::classify(&outcome);
        match outcome {
            DispatchOutcome::Success { status, payload } => Verdict::Resolve { status, payload },
            DispatchOutcome::RateLimited { retry_after, .. }
                if classification.is_retryable() && retry_count < max_retries =>
            {
                Verdict::Requeue { retry_after }
            }
            _ if classification.is_retryable() => {
                Verdict::Reject(PaceGateError::RetryBudgetExhausted { attempts: retry_count + 1 })
            }
            DispatchOutcome::AuthError { message, .. } => {
                Verdict::Reject(PaceGateError::AuthExpired(message))
            }
            DispatchOutcome::OtherError { status, message } => {
                Verdict::Reject(PaceGateError::Provider { status, message })
            }
            DispatchOutcome::RateLimited { status, message, .. } => {
                Verdict::Reject(PaceGateError::Provider { status: Some(status), message })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::{auth_error, ok, provider_error, rate_limited};

    #[test]
    fn classifies_each_outcome() {
        assert_eq!(RetryClassifier::classify(&ok(json!({}))), Classification::Success);
        assert_eq!(
            RetryClassifier::classify(&rate_limited()),
            Classification::RetryableRateLimit
        );
        assert_eq!(RetryClassifier::classify(&auth_error()), Classification::FatalAuth);
        assert_eq!(RetryClassifier::classify(&provider_error(500)), Classification::FatalOther);
    }

    #[test]
    fn rate_limit_requeues_within_budget() {
        let requeue = Verdict::Requeue { retry_after: None };
        assert_eq!(RetryClassifier::decide(rate_limited(), 0, 3), requeue);
        assert_eq!(RetryClassifier::decide(rate_limited(), 2, 3), requeue);
    }

    #[test]
    fn requeue_carries_provider_retry_hint() {
        let outcome = DispatchOutcome::RateLimited {
            status: 429,
            retry_after: Some(Duration::from_secs(120)),
            message: "Rate Limit Exceeded".to_string(),
        };
        assert_eq!(
            RetryClassifier::decide(outcome, 0, 3),
            Verdict::Requeue { retry_after: Some(Duration::from_secs(120)) }
        );
    }

    #[test]
    fn only_retryable_classification_is_requeued() {
        assert!(Classification::RetryableRateLimit.is_retryable());
        for outcome in [ok(json!({})), auth_error(), provider_error(500)] {
            let classification = RetryClassifier::classify(&outcome);
            assert!(!classification.is_retryable());
            assert!(!matches!(
                RetryClassifier::decide(outcome, 0, 3),
                Verdict::Requeue { .. }
            ));
        }
    }

    #[test]
    fn rate_limit_past_budget_is_exhausted() {
        assert_eq!(
            RetryClassifier::decide(rate_limited(), 3, 3),
            Verdict::Reject(PaceGateError::RetryBudgetExhausted { attempts: 4 })
        );
        assert_eq!(
            RetryClassifier::decide(rate_limited(), 0, 0),
            Verdict::Reject(PaceGateError::RetryBudgetExhausted { attempts: 1 })
        );
    }

    #[test]
    fn auth_is_never_retried() {
        let verdict = RetryClassifier::decide(auth_error(), 0, 10);
        assert!(matches!(verdict, Verdict::Reject(PaceGateError::AuthExpired(_))));
    }

    #[test]
    fn other_errors_keep_status() {
        assert_eq!(
            RetryClassifier::decide(provider_error(503), 0, 3),
            Verdict::Reject(PaceGateError::Provider {
                status: Some(503),
                message: "HTTP 503".to_string()
            })
        );
    }
}
