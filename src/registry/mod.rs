//! Registry configuration: model, sources and the per-request resolver.
//!
//! # Data Flow
//! ```text
//! ConfigSource (database or upstream registry)
//!     → CacheWrapper (stale-while-revalidate snapshot)
//!     → resolver.rs
//!         → routing::domain (scope to hostname)
//!         → routing::router (compile, resolve url)
//!         → CompositionPlan / ConfigView
//! ```

pub mod model;
pub mod resolver;
pub mod source;

pub use model::{ConfigView, RegistrySnapshot};
pub use resolver::{CompositionPlan, ConfigResolver, FragmentRef};
pub use source::{ConfigSource, DbConfigSource, HttpConfigSource};
