//! Serpgate Core Library
//!
//! Gateway between a keyword-research application and its metered search
//! data provider. One entry point, [`Gateway::execute`], runs the full
//! request pipeline: plan feature gate, daily query quota, response
//! cache, outbound token-bucket throttle, and a paginated provider fetch
//! with retries on transient failures.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod gateway;
pub mod limiter;
pub mod provider;
pub mod quota;
pub mod retry;

// Re-export commonly used types
pub use cache::{generate_cache_key, CacheEntry, CacheOptions, CacheStore, MemoryStore, ResponseCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult, LimitType};
pub use gateway::{ExecuteOptions, Gateway, GatewayBuilder, SearchOutcome};
pub use limiter::{RateLimitDecision, RateLimiter};
pub use provider::{
    HttpTransport, PageOptions, PaginatedExecutor, ProviderCredentials, ProviderTransport,
    SearchRequest,
};
pub use quota::{
    EntitlementTable, Feature, PlanEntitlement, PlanSource, QuotaCheck, QuotaGate,
    StaticPlanSource, UsageCounter, UsageStore,
};
pub use retry::{ErrorClass, Retried, RetryConfig, RetryPolicy};
