//! Paginated request execution
//!
//! The executor turns one logical search into a sequence of provider
//! calls: throttle, fetch with retries, accumulate, advance the offset.
//! Pagination stops at the first short page or at the `max_pages` cap,
//! whichever comes first.

use super::client::ProviderTransport;
use super::types::{ProviderCredentials, SearchRequest};
use crate::clock::Clock;
use crate::config::{GatewayConfig, LimiterSettings};
use crate::error::GatewayResult;
use crate::limiter::RateLimiter;
use crate::retry::{RetryConfig, RetryPolicy};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

/// Per-call pagination window
#[derive(Debug, Clone, Copy)]
pub struct PageOptions {
    /// Rows requested per provider call
    pub page_size: u32,
    /// Hard cap on provider calls for this request
    pub max_pages: u32,
}

/// Executes one logical request as a throttled, retried page sequence
#[derive(Debug)]
pub struct PaginatedExecutor {
    transport: Arc<dyn ProviderTransport>,
    limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
    limiter_settings: LimiterSettings,
    retry: RetryConfig,
    inter_page_delay: Duration,
}

impl PaginatedExecutor {
    pub fn new(
        transport: Arc<dyn ProviderTransport>,
        limiter: Arc<RateLimiter>,
        clock: Arc<dyn Clock>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            transport,
            limiter,
            clock,
            limiter_settings: config.limiter.clone(),
            retry: config.retry.clone(),
            inter_page_delay: config.pagination.inter_page_delay,
        }
    }

    /// Fetch every page of `request` from `path`, up to the caps in
    /// `pages`.
    ///
    /// A page shorter than `page_size` (including an empty one) ends the
    /// sequence; pages already fetched are never discarded on a cap.
    /// Errors on any page, after retries, fail the whole request.
    pub async fn fetch_paginated(
        &self,
        path: &str,
        request: &SearchRequest,
        credentials: &ProviderCredentials,
        pages: &PageOptions,
    ) -> GatewayResult<Vec<Value>> {
        let policy = RetryPolicy::new(self.retry.clone());
        let mut all_items = Vec::new();

        for page in 0..pages.max_pages {
            let offset = page * pages.page_size;
            self.throttle(&credentials.login).await;

            let body = serde_json::to_value(request.with_page(pages.page_size, offset))?;
            let transport = self.transport.clone();
            let path = path.to_string();
            let credentials = credentials.clone();

            let outcome = policy
                .run(|| {
                    let transport = transport.clone();
                    let path = path.clone();
                    let body = body.clone();
                    let credentials = credentials.clone();
                    async move {
                        let envelope = transport.post(&path, &body, &credentials).await?;
                        envelope.into_items()
                    }
                })
                .await?;

            let items = outcome.value;
            let is_short = (items.len() as u32) < pages.page_size;
            debug!(
                page,
                offset,
                rows = items.len(),
                attempts = outcome.attempts,
                "fetched provider page"
            );
            all_items.extend(items);

            if is_short {
                break;
            }
            if page + 1 < pages.max_pages && !self.inter_page_delay.is_zero() {
                sleep(self.inter_page_delay).await;
            }
        }

        info!(path, rows = all_items.len(), "paginated fetch complete");
        Ok(all_items)
    }

    /// Block until the outbound token bucket admits one call for
    /// `identifier`.
    async fn throttle(&self, identifier: &str) {
        loop {
            let decision = self.limiter.check(
                identifier,
                self.limiter_settings.max_tokens,
                self.limiter_settings.refill_per_second,
            );
            if decision.allowed {
                return;
            }
            let wait = (decision.reset_at - self.clock.now_utc())
                .to_std()
                .unwrap_or(Duration::ZERO)
                .max(Duration::from_millis(10));
            debug!(identifier, wait_ms = wait.as_millis() as u64, "throttled");
            sleep(wait).await;
        }
    }
}
