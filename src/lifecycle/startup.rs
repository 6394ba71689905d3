//! Startup orchestration.
//!
//! # Responsibilities
//! - Open the database and apply the schema
//! - Choose the configuration source (local database or upstream registry)
//! - Build the resolver and warm its snapshot cache
//!
//! # Design Decisions
//! - Fail fast on storage or configuration errors
//! - A failed warm-up is only logged: the cache retries on the first request
//!   and a persisted snapshot may still be served

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheOptions, JsonFileStore};
use crate::config::RegistryConfig;
use crate::db;
use crate::error::{RegistryError, RegistryResult};
use crate::http::server::AppState;
use crate::registry::{ConfigResolver, ConfigSource, DbConfigSource, HttpConfigSource};
use crate::versioning::VersioningService;

/// Cache key name of the registry snapshot.
pub const SNAPSHOT_CACHE: &str = "registry_snapshot";

fn config_source(config: &RegistryConfig, pool: &sqlx::SqlitePool) -> RegistryResult<Arc<dyn ConfigSource>> {
    match &config.upstream.registry_url {
        Some(url) => {
            let timeout = Duration::from_secs(config.timeouts.upstream_secs);
            Ok(Arc::new(HttpConfigSource::new(url, timeout)?))
        }
        None => Ok(Arc::new(DbConfigSource::new(pool.clone()))),
    }
}

/// Resolver for `config`, reading through `pool` unless an upstream is set.
pub fn build_resolver(config: &RegistryConfig, pool: &sqlx::SqlitePool) -> RegistryResult<ConfigResolver> {
    let source = config_source(config, pool)?;
    let options = CacheOptions::new(SNAPSHOT_CACHE, config.cache.config_cache_secs)
        .with_timeout(Duration::from_secs(config.timeouts.upstream_secs));

    match &config.cache.persist_path {
        Some(path) => {
            let store = JsonFileStore::open(path).map_err(|e| {
                RegistryError::Config(format!("cannot open cache file {}: {e}", path.display()))
            })?;
            Ok(ConfigResolver::with_store(source, options, Arc::new(store)))
        }
        None => Ok(ConfigResolver::new(source, options)),
    }
}

/// Initialize every subsystem the HTTP server depends on.
pub async fn build_state(config: RegistryConfig) -> RegistryResult<AppState> {
    let pool = db::connect(&config.database).await?;
    let resolver = Arc::new(build_resolver(&config, &pool)?);

    if let Err(e) = resolver.warm_up().await {
        tracing::warn!(error = %e, "Initial configuration load failed; will retry on demand");
    }

    Ok(AppState {
        versioning: VersioningService::new(pool.clone()),
        pool,
        resolver,
        config: Arc::new(config),
    })
}
