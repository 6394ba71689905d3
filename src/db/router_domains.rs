//! `router_domains` table.

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::db::{object_text, parse_object, Range};
use crate::error::{RegistryError, RegistryResult};
use crate::registry::model::{JsonMap, RouterDomainDef};
use crate::routing::matcher::normalize_host;
use crate::validation::Validator;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterDomainInput {
    pub domain_name: String,
    #[serde(default)]
    pub template_500: Option<String>,
    #[serde(default)]
    pub props: JsonMap,
}

impl RouterDomainInput {
    /// Stored form of the domain name.
    pub fn normalized_name(&self) -> String {
        normalize_host(&self.domain_name)
    }
}

fn from_row(row: &SqliteRow) -> RegistryResult<RouterDomainDef> {
    Ok(RouterDomainDef {
        id: row.try_get("id")?,
        domain_name: row.try_get("domain_name")?,
        template_500: row.try_get("template_500")?,
        props: parse_object(row.try_get("props")?, "props")?,
    })
}

pub fn validate(input: &RouterDomainInput) -> RegistryResult<()> {
    let name = input.domain_name.trim();
    let mut v = Validator::new();
    v.non_empty("domainName", name).check(
        name.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '[' | ']' | '*')),
        "domainName",
        "must be a bare hostname",
    );
    v.finish()
}

pub async fn list(pool: &SqlitePool, range: Range) -> RegistryResult<(Vec<RouterDomainDef>, i64)> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM router_domains")
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query(
        "SELECT id, domain_name, template_500, props FROM router_domains ORDER BY id LIMIT ? OFFSET ?",
    )
    .bind(range.limit())
    .bind(range.offset())
    .fetch_all(pool)
    .await?;

    let domains = rows.iter().map(from_row).collect::<RegistryResult<Vec<_>>>()?;
    Ok((domains, total))
}

pub async fn get(pool: &SqlitePool, id: i64) -> RegistryResult<RouterDomainDef> {
    let row = sqlx::query("SELECT id, domain_name, template_500, props FROM router_domains WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| RegistryError::not_found("router domain", id.to_string()))?;
    from_row(&row)
}

pub async fn insert(conn: &mut SqliteConnection, input: &RouterDomainInput) -> RegistryResult<String> {
    let id = sqlx::query("INSERT INTO router_domains (domain_name, template_500, props) VALUES (?, ?, ?)")
        .bind(input.normalized_name())
        .bind(&input.template_500)
        .bind(object_text(&input.props))
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();
    Ok(id.to_string())
}

pub async fn update(
    conn: &mut SqliteConnection,
    id: i64,
    input: &RouterDomainInput,
) -> RegistryResult<()> {
    let result = sqlx::query(
        "UPDATE router_domains SET domain_name = ?, template_500 = ?, props = ? WHERE id = ?",
    )
    .bind(input.normalized_name())
    .bind(&input.template_500)
    .bind(object_text(&input.props))
    .bind(id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RegistryError::not_found("router domain", id.to_string()));
    }
    Ok(())
}
