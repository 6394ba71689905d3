//! Cache entry storage.
//!
//! `MemoryStore` backs server-side caches. `JsonFileStore` is the persistent
//! key/value boundary: entries survive restarts because keys are stable
//! hashes and values are plain JSON.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use crate::cache::entry::CacheEntry;

/// Storage behind a [`CacheWrapper`](crate::cache::CacheWrapper).
pub trait CacheStore<T>: Send + Sync {
    fn get(&self, key: &str) -> Option<CacheEntry<T>>;

    /// Store `entry` unless the stored entry was cached after `started_at`.
    /// Returns whether the entry was written.
    fn put_if_newer(&self, key: &str, entry: CacheEntry<T>, started_at: u64) -> bool;

    fn remove(&self, key: &str);

    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn upsert_newer<T>(
    map: &DashMap<String, CacheEntry<T>>,
    key: &str,
    entry: CacheEntry<T>,
    started_at: u64,
) -> bool {
    match map.entry(key.to_string()) {
        Entry::Occupied(mut existing) => {
            if existing.get().cached_at > started_at {
                return false;
            }
            existing.insert(entry);
            true
        }
        Entry::Vacant(slot) => {
            slot.insert(entry);
            true
        }
    }
}

/// In-process store.
#[derive(Debug)]
pub struct MemoryStore<T> {
    inner: DashMap<String, CacheEntry<T>>,
}

impl<T> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync> CacheStore<T> for MemoryStore<T> {
    fn get(&self, key: &str) -> Option<CacheEntry<T>> {
        self.inner.get(key).map(|r| r.value().clone())
    }

    fn put_if_newer(&self, key: &str, entry: CacheEntry<T>, started_at: u64) -> bool {
        upsert_newer(&self.inner, key, entry, started_at)
    }

    fn remove(&self, key: &str) {
        self.inner.remove(key);
    }

    fn clear(&self) {
        self.inner.clear();
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

/// Store persisted to a JSON file after every write.
#[derive(Debug)]
pub struct JsonFileStore<T> {
    inner: DashMap<String, CacheEntry<T>>,
    path: PathBuf,
}

impl<T> JsonFileStore<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    /// Open the store, loading existing entries if the file exists.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let inner = DashMap::new();

        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            let entries: HashMap<String, CacheEntry<T>> = serde_json::from_reader(reader)?;
            for (k, v) in entries {
                inner.insert(k, v);
            }
            tracing::info!(path = ?path, entries = inner.len(), "Loaded cache entries from disk");
        }

        Ok(Self { inner, path })
    }

    /// Write all entries to disk.
    pub fn persist(&self) -> std::io::Result<()> {
        let entries: HashMap<String, CacheEntry<T>> = self
            .inner
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();

        let writer = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer(writer, &entries)?;
        Ok(())
    }

    fn persist_or_warn(&self) {
        if let Err(e) = self.persist() {
            tracing::warn!(path = ?self.path, error = %e, "Failed to persist cache entries");
        }
    }
}

impl<T> CacheStore<T> for JsonFileStore<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    fn get(&self, key: &str) -> Option<CacheEntry<T>> {
        self.inner.get(key).map(|r| r.value().clone())
    }

    fn put_if_newer(&self, key: &str, entry: CacheEntry<T>, started_at: u64) -> bool {
        let written = upsert_newer(&self.inner, key, entry, started_at);
        if written {
            self.persist_or_warn();
        }
        written
    }

    fn remove(&self, key: &str) {
        if self.inner.remove(key).is_some() {
            self.persist_or_warn();
        }
    }

    fn clear(&self) {
        self.inner.clear();
        self.persist_or_warn();
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_if_newer_keeps_fresher_entry() {
        let store = MemoryStore::new();
        assert!(store.put_if_newer("k", CacheEntry::new("new", 20, 10), 20));

        // A refresh that started at t=5 lands late.
        assert!(!store.put_if_newer("k", CacheEntry::new("old", 25, 10), 5));
        assert_eq!(store.get("k").unwrap().data, "new");

        assert!(store.put_if_newer("k", CacheEntry::new("newer", 30, 10), 21));
        assert_eq!(store.get("k").unwrap().data, "newer");
    }

    #[test]
    fn test_json_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let store = JsonFileStore::open(&path).unwrap();
        store.put_if_newer("abc", CacheEntry::new(vec![1, 2, 3], 100, 60), 100);
        drop(store);

        let reopened: JsonFileStore<Vec<i32>> = JsonFileStore::open(&path).unwrap();
        let entry = reopened.get("abc").unwrap();
        assert_eq!(entry.data, vec![1, 2, 3]);
        assert_eq!(entry.cached_at, 100);
        assert_eq!(entry.check_after, 160);

        reopened.remove("abc");
        let reopened: JsonFileStore<Vec<i32>> = JsonFileStore::open(&path).unwrap();
        assert!(reopened.is_empty());
    }
}
