//! Cache entries and key derivation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One cached value with its freshness window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    pub data: T,
    /// Seconds since epoch when the value was stored.
    pub cached_at: u64,
    /// Seconds since epoch after which the value counts as stale.
    pub check_after: u64,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, now: u64, cache_for_secs: u64) -> Self {
        Self {
            data,
            cached_at: now,
            check_after: now.saturating_add(cache_for_secs),
        }
    }

    /// `cached_at < now - cache_for`.
    pub fn is_stale(&self, now: u64, cache_for_secs: u64) -> bool {
        self.cached_at < now.saturating_sub(cache_for_secs)
    }
}

/// Derive the storage key for a call.
///
/// SHA-256 over the cache name followed by the JSON form of the arguments,
/// hex encoded. Stable across restarts, so it can key persistent stores.
pub fn cache_key<A: Serialize + ?Sized>(name: &str, args: &A) -> Result<String, serde_json::Error> {
    let serialized = serde_json::to_string(args)?;
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(serialized.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}
