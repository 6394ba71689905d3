//! Memoizing wrapper around an async producer.
//!
//! # Responsibilities
//! - Serve fresh entries without I/O
//! - Serve stale entries immediately while one refresh runs in the background
//! - Make first-time callers for a key share a single producer call
//! - Keep the newest successful result per key
//!
//! # Design Decisions
//! - Refreshes are spawned tasks wrapped in a `Shared` future, so waiters can
//!   come and go without cancelling the refresh
//! - Invalidation raises a per-key floor; refreshes that started earlier
//!   still answer their waiters but never land in the store

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::clock::{Clock, SystemClock};
use crate::cache::entry::{cache_key, CacheEntry};
use crate::cache::store::{CacheStore, MemoryStore};
use crate::cache::CacheRefreshError;
use crate::error::{RegistryError, RegistryResult};
use crate::observability::metrics;

type Producer<A, T> = Arc<dyn Fn(A) -> BoxFuture<'static, RegistryResult<T>> + Send + Sync>;
type Refresh<T> = Shared<BoxFuture<'static, Result<CacheEntry<T>, CacheRefreshError>>>;

/// Options for one wrapped producer.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Namespace mixed into every key.
    pub cache_key_name: String,
    /// Freshness window in seconds.
    pub cache_for_secs: u64,
    /// Upper bound on a single producer call. Expiry counts as a failure.
    pub refresh_timeout: Option<Duration>,
}

impl CacheOptions {
    pub fn new(cache_key_name: impl Into<String>, cache_for_secs: u64) -> Self {
        Self {
            cache_key_name: cache_key_name.into(),
            cache_for_secs,
            refresh_timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = Some(timeout);
        self
    }
}

struct InFlight<T> {
    id: u64,
    refresh: Refresh<T>,
}

struct Inner<A, T> {
    options: CacheOptions,
    producer: Producer<A, T>,
    store: Arc<dyn CacheStore<T>>,
    clock: Arc<dyn Clock>,
    in_flight: DashMap<String, InFlight<T>>,
    next_refresh: AtomicU64,
    /// Refresh ids below the floor started before an invalidation.
    floors: DashMap<String, u64>,
    global_floor: AtomicU64,
}

/// Stale-while-revalidate cache around `producer(args)`.
pub struct CacheWrapper<A, T> {
    inner: Arc<Inner<A, T>>,
}

impl<A, T> Clone for CacheWrapper<A, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, T> CacheWrapper<A, T>
where
    A: Serialize + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Wrap `producer` with an in-memory store and the system clock.
    pub fn new<F, Fut>(options: CacheOptions, producer: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RegistryResult<T>> + Send + 'static,
    {
        Self::with_parts(
            options,
            producer,
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
        )
    }

    pub fn with_parts<F, Fut>(
        options: CacheOptions,
        producer: F,
        store: Arc<dyn CacheStore<T>>,
        clock: Arc<dyn Clock>,
    ) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RegistryResult<T>> + Send + 'static,
    {
        let producer: Producer<A, T> = Arc::new(move |args| producer(args).boxed());
        Self {
            inner: Arc::new(Inner {
                options,
                producer,
                store,
                clock,
                in_flight: DashMap::new(),
                next_refresh: AtomicU64::new(0),
                floors: DashMap::new(),
                global_floor: AtomicU64::new(0),
            }),
        }
    }

    pub fn options(&self) -> &CacheOptions {
        &self.inner.options
    }

    /// Return the entry for `args`, refreshing it if missing or stale.
    ///
    /// Only a caller with nothing cached ever waits on the producer, and only
    /// that caller sees a producer failure.
    pub async fn get(&self, args: A) -> Result<CacheEntry<T>, CacheRefreshError> {
        let name = self.inner.options.cache_key_name.as_str();
        let key = self.key_for(&args)?;
        let now = self.inner.clock.now_secs();

        let cached = match self.inner.store.get(&key) {
            Some(entry) if !entry.is_stale(now, self.inner.options.cache_for_secs) => {
                metrics::record_cache_event(name, "fresh");
                return Ok(entry);
            }
            other => other,
        };

        let refresh = Inner::start_or_join(&self.inner, &key, args, now);

        match cached {
            Some(stale) => {
                metrics::record_cache_event(name, "stale");
                tracing::debug!(cache = %name, cached_at = stale.cached_at, "Serving stale entry");
                Ok(stale)
            }
            None => {
                metrics::record_cache_event(name, "miss");
                refresh.await
            }
        }
    }

    /// Current entry without triggering a refresh.
    pub fn peek(&self, args: &A) -> Option<CacheEntry<T>> {
        let key = self.key_for(args).ok()?;
        self.inner.store.get(&key)
    }

    /// Wait for the in-flight refresh of `args`, if there is one.
    pub async fn settle(&self, args: &A) -> Option<Result<CacheEntry<T>, CacheRefreshError>> {
        let key = self.key_for(args).ok()?;
        let refresh = self.inner.in_flight.get(&key).map(|r| r.refresh.clone())?;
        Some(refresh.await)
    }

    /// Drop the entry for `args`. A refresh already running for it will not
    /// be stored.
    pub fn invalidate(&self, args: &A) {
        let key = match self.key_for(args) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot derive cache key for invalidation");
                return;
            }
        };
        let floor = self.inner.next_refresh.load(Ordering::SeqCst);
        self.inner.floors.insert(key.clone(), floor);
        self.inner.in_flight.remove(&key);
        self.inner.store.remove(&key);
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let floor = self.inner.next_refresh.load(Ordering::SeqCst);
        self.inner.global_floor.store(floor, Ordering::SeqCst);
        self.inner.in_flight.clear();
        self.inner.store.clear();
    }

    fn key_for(&self, args: &A) -> Result<String, CacheRefreshError> {
        let name = &self.inner.options.cache_key_name;
        cache_key(name, args).map_err(|e| CacheRefreshError::new(name.clone(), e.to_string()))
    }
}

impl<A, T> Inner<A, T>
where
    A: Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn start_or_join(inner: &Arc<Self>, key: &str, args: A, now: u64) -> Refresh<T> {
        match inner.in_flight.entry(key.to_string()) {
            Entry::Occupied(running) => running.get().refresh.clone(),
            Entry::Vacant(slot) => {
                let id = inner.next_refresh.fetch_add(1, Ordering::SeqCst);
                let task = tokio::spawn(Arc::clone(inner).refresh(key.to_string(), id, args, now));

                let name = inner.options.cache_key_name.clone();
                let refresh = async move {
                    task.await.unwrap_or_else(|e| {
                        Err(CacheRefreshError::new(name, format!("refresh task failed: {e}")))
                    })
                }
                .boxed()
                .shared();

                slot.insert(InFlight {
                    id,
                    refresh: refresh.clone(),
                });
                refresh
            }
        }
    }

    async fn refresh(
        self: Arc<Self>,
        key: String,
        id: u64,
        args: A,
        started_at: u64,
    ) -> Result<CacheEntry<T>, CacheRefreshError> {
        let name = self.options.cache_key_name.clone();

        let produced = match self.options.refresh_timeout {
            Some(limit) => match tokio::time::timeout(limit, (self.producer)(args)).await {
                Ok(result) => result,
                Err(_) => Err(RegistryError::Upstream(format!(
                    "refresh timed out after {}ms",
                    limit.as_millis()
                ))),
            },
            None => (self.producer)(args).await,
        };

        let outcome = match produced {
            Ok(data) => {
                let entry = CacheEntry::new(data, self.clock.now_secs(), self.options.cache_for_secs);
                if self.is_superseded(&key, id) {
                    tracing::debug!(cache = %name, "Refresh started before invalidation, result not stored");
                    Ok(entry)
                } else if self.store.put_if_newer(&key, entry.clone(), started_at) {
                    // An invalidation may have landed between the check and the write.
                    if self.is_superseded(&key, id) {
                        self.store.remove(&key);
                        tracing::debug!(cache = %name, "Invalidated during refresh, result dropped");
                    } else {
                        tracing::debug!(cache = %name, cached_at = entry.cached_at, "Cache entry refreshed");
                    }
                    Ok(entry)
                } else {
                    tracing::debug!(cache = %name, "Discarding refresh older than stored entry");
                    Ok(self.store.get(&key).unwrap_or(entry))
                }
            }
            Err(e) => {
                let err = CacheRefreshError::new(name.clone(), e.to_string());
                metrics::record_cache_event(&name, "refresh_error");
                if self.store.get(&key).is_some() {
                    tracing::warn!(cache = %name, error = %err, "Background refresh failed, keeping stale entry");
                } else {
                    tracing::error!(cache = %name, error = %err, "Refresh failed with nothing cached");
                }
                Err(err)
            }
        };

        self.in_flight.remove_if(&key, |_, running| running.id == id);
        outcome
    }

    fn is_superseded(&self, key: &str, id: u64) -> bool {
        if id < self.global_floor.load(Ordering::SeqCst) {
            return true;
        }
        self.floors.get(key).map(|floor| id < *floor).unwrap_or(false)
    }
}
