//! `auth_entities` table: admin API credentials.
//!
//! Secrets are stored as SHA-256 hex digests and never returned.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::db::Range;
use crate::error::{RegistryError, RegistryResult};
use crate::validation::Validator;
use crate::versioning::sanitizer::SECRET_MARKER;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    #[default]
    Bearer,
    Local,
}

impl AuthProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthProvider::Bearer => "bearer",
            AuthProvider::Local => "local",
        }
    }

    fn parse(raw: &str) -> Self {
        match raw {
            "local" => AuthProvider::Local,
            _ => AuthProvider::Bearer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthRole {
    #[default]
    Admin,
    Readonly,
}

impl AuthRole {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthRole::Admin => "admin",
            AuthRole::Readonly => "readonly",
        }
    }

    fn parse(raw: &str) -> Self {
        match raw {
            "readonly" => AuthRole::Readonly,
            _ => AuthRole::Admin,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthEntityRecord {
    pub id: i64,
    pub identifier: String,
    pub provider: AuthProvider,
    pub role: AuthRole,
    /// Always the secret marker in responses.
    pub secret: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthEntityInput {
    pub identifier: String,
    /// Plain secret. Absent or the marker on update keeps the stored one.
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub provider: AuthProvider,
    #[serde(default)]
    pub role: AuthRole,
}

impl AuthEntityInput {
    fn new_secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| *s != SECRET_MARKER)
    }
}

pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

fn from_row(row: &SqliteRow) -> RegistryResult<AuthEntityRecord> {
    let provider: String = row.try_get("provider")?;
    let role: String = row.try_get("role")?;
    Ok(AuthEntityRecord {
        id: row.try_get("id")?,
        identifier: row.try_get("identifier")?,
        provider: AuthProvider::parse(&provider),
        role: AuthRole::parse(&role),
        secret: SECRET_MARKER.to_string(),
    })
}

/// `creating` requires a secret.
pub fn validate(input: &AuthEntityInput, creating: bool) -> RegistryResult<()> {
    let mut v = Validator::new();
    v.name("identifier", &input.identifier);
    match input.new_secret() {
        Some(secret) => {
            v.check(secret.len() >= 8, "secret", "must be at least 8 characters");
        }
        None if creating => {
            v.error("secret", "must not be empty");
        }
        None => {}
    }
    v.finish()
}

pub async fn list(pool: &SqlitePool, range: Range) -> RegistryResult<(Vec<AuthEntityRecord>, i64)> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM auth_entities")
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query(
        "SELECT id, identifier, provider, role FROM auth_entities ORDER BY id LIMIT ? OFFSET ?",
    )
    .bind(range.limit())
    .bind(range.offset())
    .fetch_all(pool)
    .await?;

    let entities = rows.iter().map(from_row).collect::<RegistryResult<Vec<_>>>()?;
    Ok((entities, total))
}

pub async fn get(pool: &SqlitePool, id: i64) -> RegistryResult<AuthEntityRecord> {
    let row = sqlx::query("SELECT id, identifier, provider, role FROM auth_entities WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| RegistryError::not_found("auth entity", id.to_string()))?;
    from_row(&row)
}

/// Role of `identifier` if `secret` matches its stored digest.
pub async fn verify(pool: &SqlitePool, identifier: &str, secret: &str) -> RegistryResult<Option<AuthRole>> {
    let row = sqlx::query("SELECT secret, role FROM auth_entities WHERE identifier = ?")
        .bind(identifier)
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let stored: String = row.try_get("secret")?;
    if stored != hash_secret(secret) {
        return Ok(None);
    }
    let role: String = row.try_get("role")?;
    Ok(Some(AuthRole::parse(&role)))
}

pub async fn insert(conn: &mut SqliteConnection, input: &AuthEntityInput) -> RegistryResult<String> {
    let secret = input
        .new_secret()
        .ok_or_else(|| RegistryError::invalid("secret", "must not be empty"))?;

    let id = sqlx::query(
        "INSERT INTO auth_entities (identifier, secret, provider, role) VALUES (?, ?, ?, ?)",
    )
    .bind(&input.identifier)
    .bind(hash_secret(secret))
    .bind(input.provider.as_str())
    .bind(input.role.as_str())
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();
    Ok(id.to_string())
}

pub async fn update(conn: &mut SqliteConnection, id: i64, input: &AuthEntityInput) -> RegistryResult<()> {
    let result = sqlx::query(
        "UPDATE auth_entities SET identifier = ?, provider = ?, role = ?, \
         secret = COALESCE(?, secret) WHERE id = ?",
    )
    .bind(&input.identifier)
    .bind(input.provider.as_str())
    .bind(input.role.as_str())
    .bind(input.new_secret().map(hash_secret))
    .bind(id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RegistryError::not_found("auth entity", id.to_string()));
    }
    Ok(())
}
