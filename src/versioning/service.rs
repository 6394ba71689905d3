//! Versioned mutations and revert.
//!
//! # Responsibilities
//! - Run every configuration mutation in a transaction that records a
//!   sanitized before/after snapshot
//! - Revert a version by writing its snapshot back, as a new version
//! - List version records
//!
//! # Design Decisions
//! - Version rows are insert-only; revert appends, never rewrites history
//! - The mutation callback receives the transaction's connection, so the
//!   snapshots and the change commit or roll back together
//! - Foreign key failures during revert surface as `NonRevertable`

use chrono::{DateTime, TimeZone, Utc};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::db::pagination::Range;
use crate::error::{RegistryError, RegistryResult};
use crate::observability::metrics;
use crate::versioning::entity::EntityType;
use crate::versioning::sanitizer::sanitize;
use crate::versioning::store::{self, Snapshot};

/// Entity a mutation applies to. `entity_id` is `None` for creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRef {
    pub entity_type: EntityType,
    pub entity_id: Option<String>,
}

impl EntityRef {
    pub fn new(entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type,
            entity_id: Some(entity_id.into()),
        }
    }

    pub fn create(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            entity_id: None,
        }
    }
}

/// Outcome of a versioned mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Logged {
    pub version_id: i64,
    pub entity_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    pub id: i64,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub data: Option<Snapshot>,
    pub data_after: Option<Snapshot>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VersionFilter {
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VersioningService {
    pool: SqlitePool,
}

impl VersioningService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run `mutation` and record it as one version.
    ///
    /// `mutation` may return the id of a row it created; otherwise the id
    /// from `target` is used.
    pub async fn log_operation<F>(
        &self,
        actor: &str,
        target: EntityRef,
        mutation: F,
    ) -> RegistryResult<Logged>
    where
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, RegistryResult<Option<String>>>
            + Send,
    {
        let entity_type = target.entity_type;
        let mut tx = self.pool.begin().await?;
        let logged = log_in_tx(&mut *tx, actor, target, mutation).await?;
        tx.commit().await?;

        metrics::record_version_written(entity_type.as_str());
        tracing::info!(
            version_id = logged.version_id,
            entity_type = %entity_type,
            entity_id = %logged.entity_id,
            actor = %actor,
            "Configuration change recorded"
        );
        Ok(logged)
    }

    /// Restore the state captured before `version_id`, as a new version.
    pub async fn revert_operation(&self, actor: &str, version_id: i64) -> RegistryResult<Logged> {
        let mut tx = self.pool.begin().await?;

        let record = fetch_record(&mut *tx, version_id)
            .await?
            .ok_or(RegistryError::NonExistingVersion(version_id))?;

        let entity = record.entity_type;
        let entity_id = record.entity_id.clone();
        let before = record.data;
        let target = EntityRef::new(entity, entity_id.clone());

        let logged = log_in_tx(&mut *tx, actor, target, move |conn| {
            Box::pin(async move {
                match before {
                    // The version created the entity.
                    None => store::delete_entity(conn, entity, &entity_id)
                        .await
                        .map_err(|e| match e {
                            RegistryError::NotFound { .. } => RegistryError::non_revertable(
                                format!("{entity} '{entity_id}' no longer exists"),
                            ),
                            other => other,
                        }),
                    Some(snapshot) => store::restore(conn, entity, &entity_id, &snapshot).await,
                }
                .map(|()| None::<String>)
            })
        })
        .await
        .map_err(|e| match e {
            RegistryError::ForeignConstraint(detail) => RegistryError::non_revertable(format!(
                "snapshot references an entity that no longer exists ({detail})"
            )),
            other => other,
        })?;

        tx.commit().await?;

        metrics::record_version_written(entity.as_str());
        tracing::info!(
            version_id = logged.version_id,
            reverted = version_id,
            entity_type = %entity,
            entity_id = %logged.entity_id,
            actor = %actor,
            "Version reverted"
        );
        Ok(logged)
    }

    /// Records matching `filter`, newest first, with the total count.
    pub async fn list_versions(
        &self,
        filter: &VersionFilter,
        range: Range,
    ) -> RegistryResult<(Vec<VersionRecord>, i64)> {
        let entity_type = filter.entity_type.map(|e| e.as_str());
        let entity_id = filter.entity_id.as_deref();
        let condition = "(? IS NULL OR entity_type = ?) AND (? IS NULL OR entity_id = ?)";

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM versioning WHERE {condition}"
        ))
        .bind(entity_type)
        .bind(entity_type)
        .bind(entity_id)
        .bind(entity_id)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(&format!(
            "SELECT id, entity_type, entity_id, data, data_after, created_by, created_at \
             FROM versioning WHERE {condition} ORDER BY id DESC LIMIT ? OFFSET ?"
        ))
        .bind(entity_type)
        .bind(entity_type)
        .bind(entity_id)
        .bind(entity_id)
        .bind(range.limit())
        .bind(range.offset())
        .fetch_all(&self.pool)
        .await?;

        let records = rows
            .iter()
            .map(record_from_row)
            .collect::<RegistryResult<Vec<_>>>()?;
        Ok((records, total))
    }

    pub async fn get_version(&self, version_id: i64) -> RegistryResult<VersionRecord> {
        let mut conn = self.pool.acquire().await?;
        fetch_record(&mut *conn, version_id)
            .await?
            .ok_or(RegistryError::NonExistingVersion(version_id))
    }
}

async fn log_in_tx<F>(
    conn: &mut SqliteConnection,
    actor: &str,
    target: EntityRef,
    mutation: F,
) -> RegistryResult<Logged>
where
    F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, RegistryResult<Option<String>>>
        + Send,
{
    let entity = target.entity_type;

    let before = match &target.entity_id {
        Some(id) => store::read_snapshot(conn, entity, id)
            .await?
            .map(|s| sanitize(entity, s)),
        None => None,
    };

    let returned = mutation(&mut *conn).await?;
    let entity_id = returned.or(target.entity_id).ok_or_else(|| {
        RegistryError::Versioning(format!("mutation of {entity} did not report an entity id"))
    })?;

    let after = store::read_snapshot(conn, entity, &entity_id)
        .await?
        .map(|s| sanitize(entity, s));

    let data = before.as_ref().map(serde_json::to_string).transpose()?;
    let data_after = after.as_ref().map(serde_json::to_string).transpose()?;

    let version_id = sqlx::query(
        "INSERT INTO versioning (entity_type, entity_id, data, data_after, created_by, created_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(entity.as_str())
    .bind(&entity_id)
    .bind(data)
    .bind(data_after)
    .bind(actor)
    .bind(Utc::now().timestamp())
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    Ok(Logged {
        version_id,
        entity_id,
    })
}

async fn fetch_record(
    conn: &mut SqliteConnection,
    version_id: i64,
) -> RegistryResult<Option<VersionRecord>> {
    let row = sqlx::query(
        "SELECT id, entity_type, entity_id, data, data_after, created_by, created_at \
         FROM versioning WHERE id = ?",
    )
    .bind(version_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(record_from_row).transpose()
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> RegistryResult<VersionRecord> {
    let entity_type: String = row.try_get("entity_type")?;
    let entity_type = entity_type
        .parse::<EntityType>()
        .map_err(RegistryError::Versioning)?;

    let parse_snapshot = |column: &str| -> RegistryResult<Option<Snapshot>> {
        let raw: Option<String> = row.try_get(column)?;
        Ok(raw.map(|s| serde_json::from_str(&s)).transpose()?)
    };

    let created_at: i64 = row.try_get("created_at")?;
    let created_at = Utc
        .timestamp_opt(created_at, 0)
        .single()
        .ok_or_else(|| RegistryError::Versioning(format!("invalid timestamp {created_at}")))?;

    Ok(VersionRecord {
        id: row.try_get("id")?,
        entity_type,
        entity_id: row.try_get("entity_id")?,
        created_by: row.try_get("created_by")?,
        created_at,
        data: parse_snapshot("data")?,
        data_after: parse_snapshot("data_after")?,
    })
}
