//! Gateway configuration
//!
//! Configuration is split into focused sub-structs composed by
//! [`GatewayConfig`]. Values load from the environment with a `SERPGATE_`
//! prefix; provider credentials are the only mandatory settings and their
//! absence is a fatal configuration error, not a runtime one.

use crate::error::{GatewayError, GatewayResult};
use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Provider connection settings (endpoint, credentials, timeouts)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Basic-auth login for the data provider
    pub login: String,
    /// Basic-auth password for the data provider
    pub password: String,
    /// Base URL of the provider API
    pub base_url: String,
    /// Connection timeout for provider calls
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// End-to-end timeout for a single provider call
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            login: String::new(),
            password: String::new(),
            base_url: "https://api.dataforseo.com".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Pagination defaults for the request executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationSettings {
    /// Rows requested per provider call
    pub page_size: u32,
    /// Hard cap on provider calls per logical request
    pub max_pages: u32,
    /// Courtesy wait between consecutive pages
    #[serde(with = "humantime_serde")]
    pub inter_page_delay: Duration,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_pages: 10,
            inter_page_delay: Duration::from_millis(500),
        }
    }
}

/// Response cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Time-to-live for cached provider responses
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            // Provider data changes slowly; a day keeps repeat lookups free.
            ttl: Duration::from_secs(24 * 3600),
        }
    }
}

/// Outbound throttle settings for the token bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterSettings {
    /// Bucket capacity per identifier
    pub max_tokens: u32,
    /// Token refill rate per second
    pub refill_per_second: f64,
    /// Buckets idle longer than this are purged
    #[serde(with = "humantime_serde")]
    pub idle_window: Duration,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            max_tokens: 10,
            refill_per_second: 2.0,
            idle_window: Duration::from_secs(3600),
        }
    }
}

/// Top-level gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub provider: ProviderSettings,
    pub pagination: PaginationSettings,
    pub cache: CacheSettings,
    pub limiter: LimiterSettings,
    pub retry: RetryConfig,
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// `SERPGATE_PROVIDER_LOGIN` and `SERPGATE_PROVIDER_PASSWORD` are
    /// required; everything else falls back to defaults.
    pub fn from_env() -> GatewayResult<Self> {
        let mut config = Self::default();

        config.provider.login = env::var("SERPGATE_PROVIDER_LOGIN").unwrap_or_default();
        config.provider.password = env::var("SERPGATE_PROVIDER_PASSWORD").unwrap_or_default();
        if let Ok(base_url) = env::var("SERPGATE_PROVIDER_BASE_URL") {
            config.provider.base_url = base_url;
        }

        if let Ok(page_size) = env::var("SERPGATE_PAGE_SIZE") {
            config.pagination.page_size = page_size
                .parse()
                .map_err(|_| GatewayError::config("invalid SERPGATE_PAGE_SIZE value"))?;
        }
        if let Ok(max_pages) = env::var("SERPGATE_MAX_PAGES") {
            config.pagination.max_pages = max_pages
                .parse()
                .map_err(|_| GatewayError::config("invalid SERPGATE_MAX_PAGES value"))?;
        }
        if let Ok(ttl_secs) = env::var("SERPGATE_CACHE_TTL_SECS") {
            let secs: u64 = ttl_secs
                .parse()
                .map_err(|_| GatewayError::config("invalid SERPGATE_CACHE_TTL_SECS value"))?;
            config.cache.ttl = Duration::from_secs(secs);
        }
        if let Ok(max_attempts) = env::var("SERPGATE_RETRY_MAX_ATTEMPTS") {
            config.retry.max_attempts = max_attempts
                .parse()
                .map_err(|_| GatewayError::config("invalid SERPGATE_RETRY_MAX_ATTEMPTS value"))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Missing provider credentials are fatal here so the failure surfaces
    /// at startup rather than as a per-request quota or provider error.
    pub fn validate(&self) -> GatewayResult<()> {
        if self.provider.login.is_empty() {
            return Err(GatewayError::config("provider login is not set"));
        }
        if self.provider.password.is_empty() {
            return Err(GatewayError::config("provider password is not set"));
        }
        if self.provider.base_url.is_empty() {
            return Err(GatewayError::config("provider base URL is not set"));
        }
        if self.pagination.page_size == 0 {
            return Err(GatewayError::config("page_size must be at least 1"));
        }
        if self.pagination.max_pages == 0 {
            return Err(GatewayError::config("max_pages must be at least 1"));
        }
        if self.limiter.refill_per_second <= 0.0 {
            return Err(GatewayError::config("refill_per_second must be positive"));
        }
        Ok(())
    }

    /// Set provider credentials
    pub fn with_credentials(mut self, login: impl Into<String>, password: impl Into<String>) -> Self {
        self.provider.login = login.into();
        self.provider.password = password.into();
        self
    }

    /// Set the provider base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.provider.base_url = base_url.into();
        self
    }

    /// Set the cache TTL
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache.ttl = ttl;
        self
    }

    /// Set the retry configuration
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credentials_fail_validation() {
        let config = GatewayConfig::default();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, GatewayError::Config { .. }));
    }

    #[test]
    fn valid_config_passes() {
        let config = GatewayConfig::default().with_credentials("login", "secret");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_page_size_rejected() {
        let mut config = GatewayConfig::default().with_credentials("login", "secret");
        config.pagination.page_size = 0;
        assert!(config.validate().is_err());
    }
}
