//! Core error types for the provider gateway

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Which metered limit a quota rejection refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitType {
    /// Daily query allowance, reset at UTC midnight
    QueriesPerDay,
    /// Monthly credit allowance, reset on the first of the calendar month
    MonthlyCredits,
}

impl std::fmt::Display for LimitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QueriesPerDay => write!(f, "queries_per_day"),
            Self::MonthlyCredits => write!(f, "monthly_credits"),
        }
    }
}

/// Main error type for the provider gateway
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    /// Configuration related errors (missing credentials, invalid settings).
    /// Fatal at startup or first use, never retried.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Permanent provider rejection (4xx other than 429, or a body-level
    /// error status). Never retried.
    #[error("provider error {status}: {message}")]
    Provider { status: u32, message: String },

    /// Provider rate limiting (HTTP 429 or equivalent body status).
    /// Retried with exponential backoff.
    #[error("provider rate limited: {message}")]
    RateLimited {
        message: String,
        /// Provider-suggested wait, when a Retry-After header was present
        retry_after: Option<Duration>,
    },

    /// Provider outage (5xx). Retried with exponential backoff.
    #[error("provider unavailable ({status}): {message}")]
    Unavailable { status: u32, message: String },

    /// Network-level failure talking to the provider. Retried.
    #[error("http error: {message}")]
    Http { message: String },

    /// Malformed provider response. Never retried.
    #[error("json error: {message}")]
    Json { message: String },

    /// A tenant exhausted a metered allowance. Never retried.
    #[error("{limit_type} limit exceeded: {current_usage}/{limit}")]
    QuotaExceeded {
        limit_type: LimitType,
        current_usage: u64,
        limit: u64,
    },

    /// The tenant's plan does not include the requested feature.
    #[error("feature not available on current plan: {feature}")]
    FeatureDisabled { feature: String },

    /// Cache infrastructure failure. Logged and treated as a miss by the
    /// response cache, never surfaced through `with_cache`.
    #[error("cache error: {message}")]
    Cache { message: String },

    /// Usage-counter or entitlement store failure. The quota gate fails
    /// closed on these.
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl GatewayError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn provider(status: u32, message: impl Into<String>) -> Self {
        Self::Provider {
            status,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after,
        }
    }

    pub fn unavailable(status: u32, message: impl Into<String>) -> Self {
        Self::Unavailable {
            status,
            message: message.into(),
        }
    }

    pub fn http(message: impl Into<String>) -> Self {
        Self::Http {
            message: message.into(),
        }
    }

    pub fn json(message: impl Into<String>) -> Self {
        Self::Json {
            message: message.into(),
        }
    }

    pub fn quota_exceeded(limit_type: LimitType, current_usage: u64, limit: u64) -> Self {
        Self::QuotaExceeded {
            limit_type,
            current_usage,
            limit,
        }
    }

    pub fn feature_disabled(feature: impl Into<String>) -> Self {
        Self::FeatureDisabled {
            feature: feature.into(),
        }
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}
