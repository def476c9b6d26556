//! Cache keys and entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;

/// Build a deterministic cache key from an operation name and its
/// parameters.
///
/// Parameters are canonicalized by recursively sorting object keys before
/// hashing, so two parameter objects holding the same fields in different
/// insertion order produce the same key. Keys are stable across processes
/// (the backing store may be shared), which rules out the stdlib's seeded
/// hasher; SHA-256 of the canonical form is used instead.
pub fn generate_cache_key(operation: &str, params: &serde_json::Value) -> String {
    let canonical = canonical_json(params);
    let mut hasher = Sha256::new();
    hasher.update(operation.as_bytes());
    hasher.update(b":");
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    format!("{}:{:x}", operation, digest)
}

/// Render a JSON value with object keys sorted recursively.
fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let sorted: BTreeMap<&String, String> = map
                .iter()
                .map(|(k, v)| (k, canonical_json(v)))
                .collect();
            let inner: Vec<String> = sorted
                .into_iter()
                .map(|(k, v)| format!("{}:{}", serde_json::Value::String(k.clone()), v))
                .collect();
            format!("{{{}}}", inner.join(","))
        }
        serde_json::Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", inner.join(","))
        }
        other => other.to_string(),
    }
}

/// One cached provider response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Deterministic key, see [`generate_cache_key`]
    pub key: String,
    /// Cached payload, stored as opaque JSON
    pub payload: serde_json::Value,
    /// When the entry was written
    pub created_at: DateTime<Utc>,
    /// Hard expiry; the entry is never served past this point
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: String, payload: serde_json::Value, now: DateTime<Utc>, ttl: Duration) -> Self {
        let expires_at = now
            + chrono::Duration::from_std(ttl)
                .unwrap_or_else(|_| chrono::Duration::seconds(i32::MAX as i64));
        Self {
            key,
            payload,
            created_at: now,
            expires_at,
        }
    }

    /// Whether the entry is past its expiry at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
