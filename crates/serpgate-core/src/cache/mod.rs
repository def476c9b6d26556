//! Response caching for paid provider calls
//!
//! The cache is content-addressed and TTL-bound: a deterministic key is
//! derived from the operation name plus normalized parameters, and entries
//! are never served past their expiry. Store failures fail open — the
//! caller is always served via the fetcher rather than blocked on cache
//! infrastructure.

pub mod store;
pub mod types;

pub use store::{CacheStore, MemoryStore};
pub use types::{generate_cache_key, CacheEntry};

use crate::clock::Clock;
use crate::error::GatewayResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Per-call cache options
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    /// Skip the lookup and go straight to the fetcher. Reserved for
    /// administrative force refresh; the fresh result is still written
    /// back.
    pub bypass_cache: bool,
    /// Override the cache's default TTL for this entry
    pub ttl: Option<Duration>,
}

/// Read-through cache wrapping the request executor
#[derive(Debug)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>, default_ttl: Duration) -> Self {
        Self {
            store,
            clock,
            default_ttl,
        }
    }

    /// Serve `key` from cache, or run `fetcher` and cache its result.
    ///
    /// Fetcher errors propagate unchanged. Store errors do not: a failed
    /// read is treated as a miss and a failed write is logged and
    /// dropped, so cache infrastructure can never fail a request that the
    /// provider could serve.
    pub async fn with_cache<T, F, Fut>(
        &self,
        key: &str,
        options: &CacheOptions,
        fetcher: F,
    ) -> GatewayResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        if !options.bypass_cache {
            let now = self.clock.now_utc();
            match self.store.get(key).await {
                Ok(Some(entry)) if !entry.is_expired(now) => {
                    match serde_json::from_value(entry.payload) {
                        Ok(value) => {
                            debug!(key, "cache hit");
                            return Ok(value);
                        }
                        Err(err) => {
                            warn!(key, error = %err, "cached payload failed to decode, refetching");
                        }
                    }
                }
                Ok(Some(_)) => {
                    // Expired; drop it rather than letting dead entries
                    // sit until the next purge sweep.
                    if let Err(err) = self.store.remove(key).await {
                        warn!(key, error = %err, "expired entry removal failed");
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(key, error = %err, "cache read failed, serving via fetcher");
                }
            }
        }

        let value = fetcher().await?;

        match serde_json::to_value(&value) {
            Ok(payload) => {
                let now = self.clock.now_utc();
                let ttl = options.ttl.unwrap_or(self.default_ttl);
                let entry = CacheEntry::new(key.to_string(), payload, now, ttl);
                if let Err(err) = self.store.put(entry).await {
                    warn!(key, error = %err, "cache write failed, result served uncached");
                }
            }
            Err(err) => {
                warn!(key, error = %err, "result not serializable for caching");
            }
        }

        Ok(value)
    }

    /// Drop a single entry
    pub async fn invalidate(&self, key: &str) -> GatewayResult<()> {
        self.store.remove(key).await
    }

    /// Drop all expired entries
    pub async fn purge_expired(&self) -> GatewayResult<usize> {
        self.store.purge_expired(self.clock.now_utc()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::GatewayError;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn setup() -> (Arc<ManualClock>, Arc<MemoryStore>, ResponseCache) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryStore::new());
        let cache = ResponseCache::new(store.clone(), clock.clone(), Duration::from_secs(3600));
        (clock, store, cache)
    }

    #[tokio::test]
    async fn hit_avoids_refetch() {
        let (clock, store, cache) = setup();
        store
            .put(CacheEntry::new(
                "k".into(),
                json!("cached"),
                clock.now_utc(),
                Duration::from_secs(600),
            ))
            .await
            .unwrap();

        let calls = AtomicU32::new(0);
        let calls_ref = &calls;
        let value: String = cache
            .with_cache("k", &CacheOptions::default(), || async move {
                calls_ref.fetch_add(1, Ordering::SeqCst);
                Ok("fresh".to_string())
            })
            .await
            .unwrap();

        assert_eq!(value, "cached");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn miss_invokes_fetcher_once_then_serves_cached() {
        let (_clock, _store, cache) = setup();
        let calls = AtomicU32::new(0);
        let calls_ref = &calls;

        for _ in 0..2 {
            let value: String = cache
                .with_cache("k", &CacheOptions::default(), || async move {
                    calls_ref.fetch_add(1, Ordering::SeqCst);
                    Ok("fresh".to_string())
                })
                .await
                .unwrap();
            assert_eq!(value, "fresh");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entry_is_refetched() {
        let (clock, store, cache) = setup();
        store
            .put(CacheEntry::new(
                "k".into(),
                json!("stale"),
                clock.now_utc(),
                Duration::from_secs(60),
            ))
            .await
            .unwrap();
        clock.advance(chrono::Duration::seconds(61));

        let value: String = cache
            .with_cache("k", &CacheOptions::default(), || async {
                Ok("fresh".to_string())
            })
            .await
            .unwrap();

        assert_eq!(value, "fresh");
    }

    #[tokio::test]
    async fn bypass_skips_lookup_but_writes_back() {
        let (clock, store, cache) = setup();
        store
            .put(CacheEntry::new(
                "k".into(),
                json!("cached"),
                clock.now_utc(),
                Duration::from_secs(600),
            ))
            .await
            .unwrap();

        let options = CacheOptions {
            bypass_cache: true,
            ttl: None,
        };
        let value: String = cache
            .with_cache("k", &options, || async { Ok("fresh".to_string()) })
            .await
            .unwrap();
        assert_eq!(value, "fresh");

        // The refreshed value replaced the old entry.
        let entry = store.get("k").await.unwrap().unwrap();
        assert_eq!(entry.payload, json!("fresh"));
    }

    #[derive(Debug)]
    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn get(&self, _key: &str) -> GatewayResult<Option<CacheEntry>> {
            Err(GatewayError::cache("store unreachable"))
        }
        async fn put(&self, _entry: CacheEntry) -> GatewayResult<()> {
            Err(GatewayError::cache("store unreachable"))
        }
        async fn remove(&self, _key: &str) -> GatewayResult<()> {
            Err(GatewayError::cache("store unreachable"))
        }
        async fn purge_expired(&self, _now: chrono::DateTime<Utc>) -> GatewayResult<usize> {
            Err(GatewayError::cache("store unreachable"))
        }
    }

    #[tokio::test]
    async fn store_failures_fail_open() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ));
        let cache = ResponseCache::new(Arc::new(BrokenStore), clock, Duration::from_secs(60));

        let value: String = cache
            .with_cache("k", &CacheOptions::default(), || async {
                Ok("fresh".to_string())
            })
            .await
            .unwrap();

        assert_eq!(value, "fresh");
    }

    #[tokio::test]
    async fn fetcher_errors_propagate() {
        let (_clock, _store, cache) = setup();

        let err = cache
            .with_cache::<String, _, _>("k", &CacheOptions::default(), || async {
                Err(GatewayError::unavailable(503, "down"))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Unavailable { .. }));
    }
}
