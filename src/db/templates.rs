//! `templates` and `templates_localized` tables.

use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::BTreeMap;

use crate::db::Range;
use crate::error::{RegistryError, RegistryResult};
use crate::validation::Validator;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDef {
    pub name: String,
    pub content: String,
    /// Locale → content.
    #[serde(default)]
    pub localized: BTreeMap<String, String>,
}

pub fn validate(template: &TemplateDef) -> RegistryResult<()> {
    let mut v = Validator::new();
    v.name("name", &template.name)
        .non_empty("content", &template.content);
    for (locale, content) in &template.localized {
        v.name("localized", locale)
            .non_empty(&format!("localized.{locale}"), content);
    }
    v.finish()
}

async fn localized_for(
    pool: &SqlitePool,
    name: &str,
) -> RegistryResult<BTreeMap<String, String>> {
    let rows = sqlx::query(
        "SELECT locale, content FROM templates_localized WHERE template_name = ? ORDER BY locale",
    )
    .bind(name)
    .fetch_all(pool)
    .await?;

    let mut localized = BTreeMap::new();
    for row in &rows {
        localized.insert(row.try_get("locale")?, row.try_get("content")?);
    }
    Ok(localized)
}

pub async fn list(pool: &SqlitePool, range: Range) -> RegistryResult<(Vec<TemplateDef>, i64)> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM templates")
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query("SELECT name, content FROM templates ORDER BY name LIMIT ? OFFSET ?")
        .bind(range.limit())
        .bind(range.offset())
        .fetch_all(pool)
        .await?;

    let mut templates = Vec::with_capacity(rows.len());
    for row in &rows {
        let name: String = row.try_get("name")?;
        let localized = localized_for(pool, &name).await?;
        templates.push(TemplateDef {
            name,
            content: row.try_get("content")?,
            localized,
        });
    }
    Ok((templates, total))
}

pub async fn get(pool: &SqlitePool, name: &str) -> RegistryResult<TemplateDef> {
    let content: String = sqlx::query_scalar("SELECT content FROM templates WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| RegistryError::not_found("template", name))?;

    Ok(TemplateDef {
        name: name.to_string(),
        content,
        localized: localized_for(pool, name).await?,
    })
}

/// Content for `locale`, falling back to the base content.
pub async fn rendered(pool: &SqlitePool, name: &str, locale: Option<&str>) -> RegistryResult<String> {
    let template = get(pool, name).await?;
    Ok(locale
        .and_then(|l| template.localized.get(l).cloned())
        .unwrap_or(template.content))
}

async fn replace_localized(
    conn: &mut SqliteConnection,
    name: &str,
    localized: &BTreeMap<String, String>,
) -> RegistryResult<()> {
    sqlx::query("DELETE FROM templates_localized WHERE template_name = ?")
        .bind(name)
        .execute(&mut *conn)
        .await?;

    for (locale, content) in localized {
        sqlx::query("INSERT INTO templates_localized (template_name, locale, content) VALUES (?, ?, ?)")
            .bind(name)
            .bind(locale)
            .bind(content)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

pub async fn insert(conn: &mut SqliteConnection, template: &TemplateDef) -> RegistryResult<String> {
    sqlx::query("INSERT INTO templates (name, content) VALUES (?, ?)")
        .bind(&template.name)
        .bind(&template.content)
        .execute(&mut *conn)
        .await?;
    replace_localized(conn, &template.name, &template.localized).await?;
    Ok(template.name.clone())
}

pub async fn update(
    conn: &mut SqliteConnection,
    name: &str,
    template: &TemplateDef,
) -> RegistryResult<()> {
    let result = sqlx::query("UPDATE templates SET content = ? WHERE name = ?")
        .bind(&template.content)
        .bind(name)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(RegistryError::not_found("template", name));
    }
    replace_localized(conn, name, &template.localized).await
}
