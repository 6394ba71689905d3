//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request ID, request domain)
//!     → config_api.rs (public reads: config, resolve, templates)
//!     → admin (authenticated CRUD, versioning)
//!     → RegistryError::into_response for failures
//! ```

pub mod config_api;
pub mod request;
pub mod server;

pub use request::{request_domain, RequestDomain, X_REQUEST_HOST, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
