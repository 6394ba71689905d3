//! `settings` and `settings_domain_value` tables.
//!
//! Settings are seeded by the schema. Operators change values and per-domain
//! overrides; keys are never created or deleted through the API.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::BTreeMap;

use crate::db::Range;
use crate::error::{RegistryError, RegistryResult};
use crate::registry::model::JsonMap;
use crate::versioning::sanitizer::{is_secret_marker, SECRET_MARKER};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingScope {
    Client,
    Ssr,
    Internal,
}

impl SettingScope {
    fn parse(raw: &str) -> Self {
        match raw {
            "ssr" => SettingScope::Ssr,
            "internal" => SettingScope::Internal,
            _ => SettingScope::Client,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainValue {
    pub domain_id: i64,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingRecord {
    pub key: String,
    pub value: Value,
    pub default: Value,
    pub scope: SettingScope,
    pub secret: bool,
    #[serde(default)]
    pub domain_values: Vec<DomainValue>,
}

impl SettingRecord {
    /// Value in effect when no domain override applies.
    pub fn effective(&self) -> &Value {
        if self.value.is_null() {
            &self.default
        } else {
            &self.value
        }
    }

    pub fn is_public(&self) -> bool {
        !self.secret && self.scope != SettingScope::Internal
    }

    /// Copy safe to return from the admin API: secret values become the marker.
    pub fn redacted(mut self) -> Self {
        if self.secret {
            let marker = Value::String(SECRET_MARKER.to_string());
            self.value = marker.clone();
            self.default = marker.clone();
            for dv in &mut self.domain_values {
                dv.value = marker.clone();
            }
        }
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettingUpdate {
    /// `null` resets the setting to its default.
    #[serde(default)]
    pub value: Value,
}

fn parse_json(raw: Option<String>, column: &str) -> RegistryResult<Value> {
    match raw {
        None => Ok(Value::Null),
        Some(text) => serde_json::from_str(&text).map_err(|e| {
            tracing::error!(column, error = %e, "Setting column does not hold JSON");
            RegistryError::from(e)
        }),
    }
}

fn json_text(value: &Value) -> Option<String> {
    if value.is_null() {
        None
    } else {
        Some(value.to_string())
    }
}

fn from_row(row: &SqliteRow, domain_values: Vec<DomainValue>) -> RegistryResult<SettingRecord> {
    let scope: String = row.try_get("scope")?;
    Ok(SettingRecord {
        key: row.try_get("key")?,
        value: parse_json(row.try_get("value")?, "value")?,
        default: parse_json(row.try_get("default")?, "default")?,
        scope: SettingScope::parse(&scope),
        secret: row.try_get("secret")?,
        domain_values,
    })
}

async fn domain_values(pool: &SqlitePool) -> RegistryResult<BTreeMap<String, Vec<DomainValue>>> {
    let rows = sqlx::query("SELECT key, domain_id, value FROM settings_domain_value ORDER BY id")
        .fetch_all(pool)
        .await?;

    let mut grouped: BTreeMap<String, Vec<DomainValue>> = BTreeMap::new();
    for row in &rows {
        let key: String = row.try_get("key")?;
        grouped.entry(key).or_default().push(DomainValue {
            domain_id: row.try_get("domain_id")?,
            value: parse_json(row.try_get("value")?, "value")?,
        });
    }
    Ok(grouped)
}

const SELECT: &str = r#"SELECT key, value, "default", scope, secret FROM settings"#;

pub async fn list(pool: &SqlitePool, range: Range) -> RegistryResult<(Vec<SettingRecord>, i64)> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM settings")
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query(&format!("{SELECT} ORDER BY key LIMIT ? OFFSET ?"))
        .bind(range.limit())
        .bind(range.offset())
        .fetch_all(pool)
        .await?;

    let mut overrides = domain_values(pool).await?;
    let mut settings = Vec::with_capacity(rows.len());
    for row in &rows {
        let key: String = row.try_get("key")?;
        settings.push(from_row(row, overrides.remove(&key).unwrap_or_default())?);
    }
    Ok((settings, total))
}

pub async fn get(pool: &SqlitePool, key: &str) -> RegistryResult<SettingRecord> {
    let row = sqlx::query(&format!("{SELECT} WHERE key = ?"))
        .bind(key)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| RegistryError::not_found("setting", key))?;

    let mut overrides = domain_values(pool).await?;
    from_row(&row, overrides.remove(key).unwrap_or_default())
}

/// Public settings: global effective values and per-domain overrides keyed by
/// domain name.
pub async fn public_values(
    pool: &SqlitePool,
) -> RegistryResult<(JsonMap, BTreeMap<String, JsonMap>)> {
    let (settings, _) = list(pool, Range::default()).await?;

    let domain_rows = sqlx::query("SELECT id, domain_name FROM router_domains")
        .fetch_all(pool)
        .await?;
    let mut domain_names = BTreeMap::new();
    for row in &domain_rows {
        let id: i64 = row.try_get("id")?;
        let name: String = row.try_get("domain_name")?;
        domain_names.insert(id, name);
    }

    let mut global = JsonMap::new();
    let mut per_domain: BTreeMap<String, JsonMap> = BTreeMap::new();
    for setting in settings.into_iter().filter(SettingRecord::is_public) {
        for dv in &setting.domain_values {
            if let Some(domain) = domain_names.get(&dv.domain_id) {
                per_domain
                    .entry(domain.clone())
                    .or_default()
                    .insert(setting.key.clone(), dv.value.clone());
            }
        }
        global.insert(setting.key.clone(), setting.effective().clone());
    }
    Ok((global, per_domain))
}

async fn ensure_exists(conn: &mut SqliteConnection, key: &str) -> RegistryResult<()> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?;
    exists
        .map(|_| ())
        .ok_or_else(|| RegistryError::not_found("setting", key))
}

/// Set the global value. Writing back the secret marker is a no-op.
pub async fn update(conn: &mut SqliteConnection, key: &str, update: &SettingUpdate) -> RegistryResult<()> {
    ensure_exists(conn, key).await?;
    if is_secret_marker(&update.value) {
        return Ok(());
    }

    sqlx::query("UPDATE settings SET value = ? WHERE key = ?")
        .bind(json_text(&update.value))
        .bind(key)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Set or replace the override of `key` for `domain_id`.
pub async fn set_domain_value(
    conn: &mut SqliteConnection,
    key: &str,
    domain_id: i64,
    update: &SettingUpdate,
) -> RegistryResult<()> {
    ensure_exists(conn, key).await?;
    if is_secret_marker(&update.value) {
        return Ok(());
    }

    sqlx::query(
        "INSERT INTO settings_domain_value (key, domain_id, value) VALUES (?, ?, ?) \
         ON CONFLICT (key, domain_id) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(domain_id)
    .bind(json_text(&update.value))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn remove_domain_value(
    conn: &mut SqliteConnection,
    key: &str,
    domain_id: i64,
) -> RegistryResult<()> {
    let result = sqlx::query("DELETE FROM settings_domain_value WHERE key = ? AND domain_id = ?")
        .bind(key)
        .bind(domain_id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(RegistryError::not_found(
            "setting override",
            format!("{key}@{domain_id}"),
        ));
    }
    Ok(())
}
