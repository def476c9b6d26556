//! User-facing error messages
//!
//! Quota and feature rejections produce actionable text naming the limit
//! and current usage; provider failures after retry exhaustion collapse
//! into a generic try-again-later message that leaks no provider detail.

use super::types::{GatewayError, LimitType};

impl GatewayError {
    /// Render the error for end-user display.
    ///
    /// Technical detail (status codes, store errors) is intentionally
    /// dropped here; callers wanting it should format the error itself.
    pub fn user_message(&self) -> String {
        match self {
            Self::QuotaExceeded {
                limit_type,
                current_usage,
                limit,
            } => match limit_type {
                LimitType::QueriesPerDay => format!(
                    "Daily query limit reached ({current_usage} of {limit} used). \
                     Your allowance resets at midnight UTC, or you can upgrade your plan."
                ),
                LimitType::MonthlyCredits => format!(
                    "Monthly credit limit reached ({current_usage} of {limit} used). \
                     Credits reset on the first of next month, or you can upgrade your plan."
                ),
            },
            Self::FeatureDisabled { feature } => format!(
                "The \"{feature}\" feature is not included in your current plan. \
                 Upgrade to access it."
            ),
            Self::RateLimited { .. } | Self::Unavailable { .. } | Self::Http { .. } => {
                "The search data service is temporarily unavailable. Please try again later."
                    .to_string()
            }
            Self::Provider { .. } | Self::Json { .. } => {
                "The search data service returned an unexpected response. Please try again later."
                    .to_string()
            }
            Self::Config { .. } => {
                "The service is misconfigured. Please contact support.".to_string()
            }
            Self::Cache { .. } | Self::Storage { .. } => {
                "A temporary internal error occurred. Please try again later.".to_string()
            }
        }
    }
}
