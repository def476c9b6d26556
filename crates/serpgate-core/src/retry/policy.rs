//! Retry policy execution

use super::backoff::{BackoffConfig, BackoffStrategy, ExponentialBackoff};
use super::{classify, ErrorClass};
use crate::error::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::warn;

/// Configuration for retry behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Cap on the delay between retries
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Backoff multiplier per attempt
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Config that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Set the maximum number of attempts
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the base delay
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    fn to_backoff_config(&self) -> BackoffConfig {
        BackoffConfig {
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            multiplier: self.multiplier,
        }
    }
}

/// Successful outcome of a retried operation
#[derive(Debug)]
pub struct Retried<T> {
    /// The operation's result
    pub value: T,
    /// Attempts made, including the successful one
    pub attempts: u32,
    /// Total time spent, including backoff waits
    pub elapsed: Duration,
}

/// Retry policy for provider operations
pub struct RetryPolicy {
    config: RetryConfig,
    backoff: Box<dyn BackoffStrategy>,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        let backoff = ExponentialBackoff::new(config.to_backoff_config());
        Self {
            config,
            backoff: Box::new(backoff),
        }
    }

    /// Replace the backoff strategy
    pub fn with_backoff<B: BackoffStrategy + 'static>(mut self, backoff: B) -> Self {
        self.backoff = Box::new(backoff);
        self
    }

    /// Whether the error should be retried after the given 0-indexed attempt
    pub fn should_retry(&self, error: &GatewayError, attempt: u32) -> bool {
        if attempt + 1 >= self.config.max_attempts {
            return false;
        }
        classify(error) == ErrorClass::Transient
    }

    /// Execute an operation, retrying transient failures.
    ///
    /// Permanent errors surface immediately. When retries are exhausted the
    /// last error surfaces unchanged. A rate-limit error carrying a
    /// provider-suggested wait overrides the computed backoff delay.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> GatewayResult<Retried<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let start = Instant::now();
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(value) => {
                    return Ok(Retried {
                        value,
                        attempts: attempt + 1,
                        elapsed: start.elapsed(),
                    });
                }
                Err(error) => {
                    if !self.should_retry(&error, attempt) {
                        return Err(error);
                    }

                    let delay = match &error {
                        GatewayError::RateLimited {
                            retry_after: Some(wait),
                            ..
                        } => *wait,
                        _ => self.backoff.delay_for_attempt(attempt),
                    };

                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "transient provider failure, retrying"
                    );

                    attempt += 1;
                    sleep(delay).await;
                }
            }
        }
    }
}
