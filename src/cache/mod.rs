//! Stale-while-revalidate caching.
//!
//! # Data Flow
//! ```text
//! caller(args)
//!     → entry.rs (derive stable key: sha256(name + json(args)))
//!     → store.rs (lookup CacheEntry)
//!         fresh  → return entry, no I/O
//!         stale  → wrapper.rs starts/joins refresh, return stale entry now
//!         absent → wrapper.rs starts/joins refresh, await it
//!     refresh task → producer(args) → store.rs (replace entry if newer)
//! ```
//!
//! # Design Decisions
//! - At most one in-flight refresh per key; concurrent callers share it
//! - Refreshes run detached and always complete, even if every waiter left
//! - Failures are swallowed when stale data exists, propagated otherwise
//! - Time is injected through `Clock` so staleness is testable

pub mod clock;
pub mod entry;
pub mod store;
pub mod wrapper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{cache_key, CacheEntry};
pub use store::{CacheStore, JsonFileStore, MemoryStore};
pub use wrapper::{CacheOptions, CacheWrapper};

use thiserror::Error;

/// A producer failure observed by a caller that had nothing cached.
#[derive(Debug, Clone, Error)]
#[error("Cache refresh for '{name}' failed: {message}")]
pub struct CacheRefreshError {
    pub name: String,
    pub message: String,
}

impl CacheRefreshError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}
