//! Retry support for provider calls
//!
//! The retry policy is a standalone component: attempt cap, backoff
//! strategy, and the retryable-error predicate are all configurable and
//! testable independently of the pagination loop that uses them.

pub mod backoff;
pub mod policy;

pub use backoff::{BackoffConfig, BackoffStrategy, ConstantBackoff, ExponentialBackoff};
pub use policy::{Retried, RetryConfig, RetryPolicy};

use crate::error::GatewayError;

/// Classification of an error for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// May succeed on retry (rate limiting, 5xx, network failures)
    Transient,
    /// Will not succeed on retry; surfaced immediately
    Permanent,
}

/// Classify a gateway error for retry purposes.
///
/// Only provider rate limiting, provider outages, and network failures are
/// transient. Everything else (other 4xx, malformed bodies, quota and
/// feature rejections, configuration) is permanent: those calls are not
/// known to be idempotent-safe to repeat, and repeating them cannot help.
pub fn classify(error: &GatewayError) -> ErrorClass {
    match error {
        GatewayError::RateLimited { .. }
        | GatewayError::Unavailable { .. }
        | GatewayError::Http { .. } => ErrorClass::Transient,
        GatewayError::Config { .. }
        | GatewayError::Provider { .. }
        | GatewayError::Json { .. }
        | GatewayError::QuotaExceeded { .. }
        | GatewayError::FeatureDisabled { .. }
        | GatewayError::Cache { .. }
        | GatewayError::Storage { .. } => ErrorClass::Permanent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LimitType;

    #[test]
    fn rate_limit_and_outage_are_transient() {
        assert_eq!(
            classify(&GatewayError::rate_limited("429", None)),
            ErrorClass::Transient
        );
        assert_eq!(
            classify(&GatewayError::unavailable(503, "service unavailable")),
            ErrorClass::Transient
        );
        assert_eq!(
            classify(&GatewayError::http("connection reset")),
            ErrorClass::Transient
        );
    }

    #[test]
    fn client_errors_are_permanent() {
        assert_eq!(
            classify(&GatewayError::provider(40400, "not found")),
            ErrorClass::Permanent
        );
        assert_eq!(
            classify(&GatewayError::json("unexpected end of input")),
            ErrorClass::Permanent
        );
        assert_eq!(
            classify(&GatewayError::quota_exceeded(LimitType::QueriesPerDay, 5, 5)),
            ErrorClass::Permanent
        );
    }
}
