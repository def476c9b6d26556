//! Cache storage backends

use super::types::CacheEntry;
use crate::error::GatewayResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::fmt;

/// Storage backend for cached provider responses.
///
/// The production deployment backs this with the application's shared
/// store so instances see each other's entries; the in-memory
/// implementation here serves tests and single-instance setups.
#[async_trait]
pub trait CacheStore: Send + Sync + fmt::Debug {
    /// Fetch an entry by key. Expiry is the caller's concern; stores
    /// return whatever they hold.
    async fn get(&self, key: &str) -> GatewayResult<Option<CacheEntry>>;

    /// Insert or replace an entry
    async fn put(&self, entry: CacheEntry) -> GatewayResult<()>;

    /// Remove an entry by key
    async fn remove(&self, key: &str) -> GatewayResult<()>;

    /// Drop entries expired at `now`, returning how many were removed
    async fn purge_expired(&self, now: DateTime<Utc>) -> GatewayResult<usize>;
}

/// In-memory cache store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired or not
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> GatewayResult<Option<CacheEntry>> {
        Ok(self.entries.get(key).map(|entry| entry.clone()))
    }

    async fn put(&self, entry: CacheEntry) -> GatewayResult<()> {
        self.entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn remove(&self, key: &str) -> GatewayResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> GatewayResult<usize> {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        // Writes may land concurrently with the retain, so the two
        // lengths are not a consistent snapshot.
        Ok(before.saturating_sub(self.entries.len()))
    }
}
