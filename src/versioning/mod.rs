//! Versioning of configuration entities.
//!
//! # Data Flow
//! ```text
//! admin handler
//!     → service.rs log_operation(actor, EntityRef, mutation)
//!         BEGIN
//!         → store.rs read_snapshot (row + related rows)
//!         → sanitizer.rs (redact secrets)
//!         → mutation(conn)
//!         → store.rs read_snapshot → sanitizer.rs
//!         → INSERT versioning
//!         COMMIT
//!     → ConfigResolver::invalidate
//!
//! revert(version_id)
//!     → load record → store.rs restore/delete (markers keep live values)
//!     → recorded through the same path as any mutation
//! ```
//!
//! # Design Decisions
//! - The versioning table is append-only
//! - Entity layout (table, id, related tables) is static data in entity.rs
//! - Secrets never reach a version row in clear text

pub mod entity;
pub mod sanitizer;
pub mod service;
pub mod store;

pub use entity::EntityType;
pub use sanitizer::{sanitize, SECRET_MARKER};
pub use service::{EntityRef, Logged, VersionFilter, VersionRecord, VersioningService};
pub use store::Snapshot;
