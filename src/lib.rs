//! Fragment registry library: micro-frontend composition config with
//! domain scoping, cached resolution and versioned administration.

// Core subsystems
pub mod cache;
pub mod config;
pub mod db;
pub mod registry;
pub mod routing;
pub mod versioning;

// Surfaces
pub mod admin;
pub mod http;

// Cross-cutting concerns
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod validation;

pub use config::schema::RegistryConfig;
pub use error::{RegistryError, RegistryResult};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
