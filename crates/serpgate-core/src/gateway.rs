//! Gateway orchestration
//!
//! The pipeline for one tenant request: feature gate, query quota,
//! cache lookup, then the metered provider fetch. Credits are only
//! spent when the provider is actually called; a cache hit costs the
//! tenant nothing beyond the daily query. Quota taken for a request
//! that ultimately fails is returned.

use crate::cache::{generate_cache_key, CacheOptions, CacheStore, MemoryStore, ResponseCache};
use crate::clock::{Clock, SystemClock};
use crate::config::{GatewayConfig, PaginationSettings};
use crate::error::GatewayResult;
use crate::limiter::RateLimiter;
use crate::provider::{
    HttpTransport, PageOptions, PaginatedExecutor, ProviderCredentials, ProviderTransport,
    SearchRequest,
};
use crate::quota::{
    EntitlementTable, Feature, MemoryUsageStore, PlanSource, QuotaGate, StaticPlanSource,
    UsageStore,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Per-request options
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Force a provider fetch even when a fresh cache entry exists.
    /// The fresh result still replaces the cached one.
    pub bypass_cache: bool,
    /// Override the configured page size
    pub page_size: Option<u32>,
    /// Override the configured page cap
    pub max_pages: Option<u32>,
    /// Credits charged when the provider is called
    pub cost_credits: u64,
    /// Plan feature this operation requires, if any
    pub required_feature: Option<Feature>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            bypass_cache: false,
            page_size: None,
            max_pages: None,
            cost_credits: 1,
            required_feature: None,
        }
    }
}

/// Result of one gateway request
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Accumulated provider rows
    pub items: Vec<Value>,
    /// Whether the response came from cache rather than the provider
    pub served_from_cache: bool,
    /// Daily queries left after this request; `None` on unlimited plans
    pub remaining_queries: Option<u64>,
}

/// The provider gateway: rate limiting, retries, quota, and caching
/// around a metered search data provider.
#[derive(Debug)]
pub struct Gateway {
    quota: Arc<QuotaGate>,
    cache: ResponseCache,
    executor: PaginatedExecutor,
    limiter: Arc<RateLimiter>,
    credentials: ProviderCredentials,
    pagination: PaginationSettings,
}

impl Gateway {
    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder::new(config)
    }

    /// Execute one search against the provider `operation` path on behalf
    /// of `tenant`.
    ///
    /// Order matters: the feature gate and query quota run before the
    /// cache, so over-quota tenants are rejected even for cached data.
    /// Credits are charged inside the fetcher, only on a cache miss, and
    /// refunded when the fetch fails after retries.
    pub async fn execute(
        &self,
        tenant: &str,
        operation: &str,
        request: &SearchRequest,
        options: &ExecuteOptions,
    ) -> GatewayResult<SearchOutcome> {
        if let Some(feature) = options.required_feature {
            self.quota.require_feature(tenant, feature).await?;
        }

        let query = self.quota.try_consume_query(tenant).await?;

        let pages = self.page_options(options);
        let key = self.cache_key(operation, request, &pages);

        let cache_options = CacheOptions {
            bypass_cache: options.bypass_cache,
            ttl: None,
        };

        let fetched = AtomicBool::new(false);
        let fetched_flag = &fetched;
        let result = self
            .cache
            .with_cache(&key, &cache_options, || async move {
                fetched_flag.store(true, Ordering::SeqCst);
                if options.cost_credits > 0 {
                    self.quota
                        .try_consume_credits(tenant, options.cost_credits)
                        .await?;
                }

                match self
                    .executor
                    .fetch_paginated(operation, request, &self.credentials, &pages)
                    .await
                {
                    Ok(items) => Ok(items),
                    Err(err) => {
                        if options.cost_credits > 0 {
                            if let Err(refund_err) = self
                                .quota
                                .refund_credits(tenant, options.cost_credits)
                                .await
                            {
                                warn!(tenant, error = %refund_err, "credit refund failed");
                            }
                        }
                        Err(err)
                    }
                }
            })
            .await;

        match result {
            Ok(items) => {
                let served_from_cache = !fetched.load(Ordering::SeqCst);
                info!(
                    tenant,
                    operation,
                    rows = items.len(),
                    served_from_cache,
                    "request complete"
                );
                Ok(SearchOutcome {
                    items,
                    served_from_cache,
                    remaining_queries: query.remaining,
                })
            }
            Err(err) => {
                // The request never produced data; give the query back.
                if let Err(refund_err) = self.quota.refund_query(tenant).await {
                    warn!(tenant, error = %refund_err, "query refund failed");
                }
                Err(err)
            }
        }
    }

    /// Quota gate, for callers that need checks outside `execute`
    pub fn quota(&self) -> &QuotaGate {
        &self.quota
    }

    /// Drop the cached response for a request previously executed with
    /// the same operation and options.
    pub async fn invalidate_cached(
        &self,
        operation: &str,
        request: &SearchRequest,
        options: &ExecuteOptions,
    ) -> GatewayResult<()> {
        let pages = self.page_options(options);
        self.cache
            .invalidate(&self.cache_key(operation, request, &pages))
            .await
    }

    fn page_options(&self, options: &ExecuteOptions) -> PageOptions {
        PageOptions {
            page_size: options.page_size.unwrap_or(self.pagination.page_size),
            max_pages: options.max_pages.unwrap_or(self.pagination.max_pages),
        }
    }

    // Page geometry is part of the identity: a 50-row and a 500-row
    // request for the same keywords are different responses.
    fn cache_key(&self, operation: &str, request: &SearchRequest, pages: &PageOptions) -> String {
        generate_cache_key(
            operation,
            &json!({
                "request": request,
                "page_size": pages.page_size,
                "max_pages": pages.max_pages,
            }),
        )
    }

    /// Maintenance sweep: drop expired cache entries and idle limiter
    /// buckets. Returns (entries, buckets) removed.
    pub async fn run_maintenance(&self) -> GatewayResult<(usize, usize)> {
        let entries = self.cache.purge_expired().await?;
        let buckets = self.limiter.purge_idle();
        Ok((entries, buckets))
    }
}

/// Builder wiring the gateway's collaborators.
///
/// Everything but the config has a default: in-memory stores, the system
/// clock, and a reqwest transport built from the provider settings. Tests
/// swap in scripted transports and a manual clock.
pub struct GatewayBuilder {
    config: GatewayConfig,
    transport: Option<Arc<dyn ProviderTransport>>,
    cache_store: Option<Arc<dyn CacheStore>>,
    usage_store: Option<Arc<dyn UsageStore>>,
    plans: Option<Arc<dyn PlanSource>>,
    entitlements: EntitlementTable,
    clock: Option<Arc<dyn Clock>>,
}

impl GatewayBuilder {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            transport: None,
            cache_store: None,
            usage_store: None,
            plans: None,
            entitlements: EntitlementTable::builtin(),
            clock: None,
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn ProviderTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache_store = Some(store);
        self
    }

    pub fn with_usage_store(mut self, store: Arc<dyn UsageStore>) -> Self {
        self.usage_store = Some(store);
        self
    }

    pub fn with_plan_source(mut self, plans: Arc<dyn PlanSource>) -> Self {
        self.plans = Some(plans);
        self
    }

    pub fn with_entitlements(mut self, entitlements: EntitlementTable) -> Self {
        self.entitlements = entitlements;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> GatewayResult<Gateway> {
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&self.config.provider)?),
        };

        let limiter = Arc::new(
            RateLimiter::new(clock.clone()).with_idle_window(self.config.limiter.idle_window),
        );
        let executor =
            PaginatedExecutor::new(transport, limiter.clone(), clock.clone(), &self.config);

        let cache = ResponseCache::new(
            self.cache_store
                .unwrap_or_else(|| Arc::new(MemoryStore::new())),
            clock.clone(),
            self.config.cache.ttl,
        );

        let quota = Arc::new(QuotaGate::new(
            self.usage_store
                .unwrap_or_else(|| Arc::new(MemoryUsageStore::new())),
            self.plans
                .unwrap_or_else(|| Arc::new(StaticPlanSource::new())),
            self.entitlements,
            clock,
        ));

        Ok(Gateway {
            quota,
            cache,
            executor,
            limiter,
            credentials: ProviderCredentials::new(
                self.config.provider.login.clone(),
                self.config.provider.password.clone(),
            ),
            pagination: self.config.pagination.clone(),
        })
    }
}
