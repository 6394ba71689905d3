//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Snapshot refresh:
//!     RegistrySnapshot
//!     → domain.rs (scope routes, special routes, settings to a hostname)
//!     → router.rs (compile ordered RouteDef[] into a RouteTable)
//!     → matcher.rs (one anchored regex per pattern)
//!
//! Incoming request (hostname, url)
//!     → RouteTable::resolve (linear scan, default-fill merge)
//!     → Resolution, or the 404 special route, or NoRouteMatch
//! ```
//!
//! # Design Decisions
//! - Tables compiled per snapshot and domain, immutable afterwards
//! - Route order is the operator-defined `orderPos`; no implicit sorting
//!   by specificity
//! - Deterministic: same snapshot and input always resolve the same way

pub mod domain;
pub mod matcher;
pub mod router;

pub use domain::{filter_by_domain, scope_snapshot, DomainScoped, ScopeFilter, ANY_DOMAIN};
pub use matcher::{normalize_host, PathMatcher, RoutePattern};
pub use router::{Resolution, RouteTable, NOT_FOUND_ROLE};
