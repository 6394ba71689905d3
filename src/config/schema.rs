//! Configuration schema definitions.
//!
//! Every section is defaulted so an empty file is a working local registry.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for the registry service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RegistryConfig {
    /// HTTP listener.
    pub listener: ListenerConfig,

    /// SQLite storage.
    pub database: DatabaseConfig,

    /// Snapshot cache.
    pub cache: CacheConfig,

    pub timeouts: TimeoutConfig,

    /// Read configuration from another registry instead of the local database.
    pub upstream: UpstreamConfig,

    /// Public config API behaviour.
    pub api: ApiConfig,

    pub admin: AdminConfig,

    pub observability: ObservabilityConfig,

    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8233").
    pub bind_address: String,

    /// Maximum concurrent in-flight requests.
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8233".to_string(),
            max_connections: 1_024,
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLx connection URL, e.g. `sqlite://registry.db` or `sqlite::memory:`.
    pub url: String,

    /// Pool size for file-backed databases.
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://registry.db".to_string(),
            max_connections: 8,
        }
    }
}

/// Snapshot cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Seconds a fetched snapshot counts as fresh.
    pub config_cache_secs: u64,

    /// Keep the last good snapshot on disk so a restart can serve it
    /// before the first refresh completes.
    pub persist_path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            config_cache_secs: 5,
            persist_path: None,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Whole-request timeout in seconds.
    pub request_secs: u64,

    /// Timeout for fetching a snapshot from an upstream registry.
    pub upstream_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            upstream_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the upstream registry. When set, the database still
    /// backs the admin API but resolution reads the upstream snapshot.
    pub registry_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ApiConfig {
    /// Use the `Host` header as the request domain when `X-Request-Host`
    /// is absent. Only enable behind a proxy that sets it.
    pub trust_host_header: bool,
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Master API key (Bearer token).
    pub api_key: String,

    /// Reject unauthenticated writes. Disable only for local development.
    pub require_auth: bool,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            // Placeholder; validation rejects it while auth is required.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            require_auth: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}
