//! SQLite storage for registry entities.
//!
//! # Data Flow
//! ```text
//! startup → connect() → SqlitePool (foreign keys on) → migrate(schema.sql)
//!
//! admin write → <entity>.rs validate() → VersioningService
//!     → <entity>.rs insert/update inside the version transaction
//! snapshot.rs load_snapshot(pool) → RegistrySnapshot (ConfigResolver source)
//! ```
//!
//! # Design Decisions
//! - Validation happens before any transaction opens
//! - Writes only happen through VersioningService; modules expose the
//!   statements as functions over a borrowed connection
//! - JSON-shaped columns are stored as text and parsed on read

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

use crate::config::schema::DatabaseConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::registry::model::JsonMap;

pub mod apps;
pub mod auth_entities;
pub mod pagination;
pub mod router_domains;
pub mod routes;
pub mod settings;
pub mod shared_libs;
pub mod shared_props;
pub mod snapshot;
pub mod templates;

pub use pagination::Range;

const SCHEMA: &str = include_str!("schema.sql");

/// Open the pool and apply the schema.
pub async fn connect(config: &DatabaseConfig) -> RegistryResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .foreign_keys(true);

    // Each in-memory connection is its own database, so keep exactly one
    // connection alive for the pool's lifetime.
    let in_memory = config.url.contains(":memory:") || config.url.contains("mode=memory");
    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(config.max_connections)
    };

    let pool = pool_options.connect_with(options).await?;
    migrate(&pool).await?;

    tracing::info!(url = %config.url, in_memory, "Database ready");
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> RegistryResult<()> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}

/// Parse a JSON text column holding an object. `NULL` and empty text read
/// as an empty object.
pub(crate) fn parse_object(raw: Option<String>, column: &str) -> RegistryResult<JsonMap> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(JsonMap::new()),
        Some(text) => serde_json::from_str(text).map_err(|e| {
            tracing::error!(column, error = %e, "Column does not hold a JSON object");
            RegistryError::from(e)
        }),
    }
}

/// Serialize an object for a JSON text column; empty objects are stored as `NULL`.
pub(crate) fn object_text(map: &JsonMap) -> Option<String> {
    if map.is_empty() {
        None
    } else {
        Some(serde_json::Value::Object(map.clone()).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_columns() {
        assert!(parse_object(None, "props").unwrap().is_empty());
        assert!(parse_object(Some(" ".into()), "props").unwrap().is_empty());
        let map = parse_object(Some(r#"{"a":1}"#.into()), "props").unwrap();
        assert_eq!(map["a"], 1);
        assert_eq!(object_text(&map).as_deref(), Some(r#"{"a":1}"#));
        assert!(object_text(&JsonMap::new()).is_none());
        assert!(parse_object(Some("[1]".into()), "props").is_err());
    }
}
