//! Where a resolver's snapshot comes from.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::time::Duration;
use url::Url;

use crate::db::snapshot::load_snapshot;
use crate::error::{RegistryError, RegistryResult};
use crate::registry::model::RegistrySnapshot;

/// Path of the unscoped snapshot on a registry's HTTP API.
pub const SNAPSHOT_PATH: &str = "api/v1/config/snapshot";

#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn fetch(&self) -> RegistryResult<RegistrySnapshot>;

    /// Short label for logs.
    fn describe(&self) -> String;
}

/// Reads the local database.
#[derive(Debug, Clone)]
pub struct DbConfigSource {
    pool: SqlitePool,
}

impl DbConfigSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConfigSource for DbConfigSource {
    async fn fetch(&self) -> RegistryResult<RegistrySnapshot> {
        load_snapshot(&self.pool).await
    }

    fn describe(&self) -> String {
        "database".to_string()
    }
}

/// Fetches the snapshot from an upstream registry.
#[derive(Debug, Clone)]
pub struct HttpConfigSource {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpConfigSource {
    pub fn new(base_url: &str, timeout: Duration) -> RegistryResult<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| RegistryError::Config(format!("invalid upstream url '{base_url}': {e}")))?;
        let endpoint = base
            .join(SNAPSHOT_PATH)
            .map_err(|e| RegistryError::Config(format!("invalid upstream url '{base_url}': {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RegistryError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl ConfigSource for HttpConfigSource {
    async fn fetch(&self) -> RegistryResult<RegistrySnapshot> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .send()
            .await
            .map_err(|e| RegistryError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RegistryError::Upstream(format!(
                "{} returned {}",
                self.endpoint,
                response.status()
            )));
        }

        response
            .json::<RegistrySnapshot>()
            .await
            .map_err(|e| RegistryError::Upstream(format!("malformed snapshot: {e}")))
    }

    fn describe(&self) -> String {
        self.endpoint.to_string()
    }
}
