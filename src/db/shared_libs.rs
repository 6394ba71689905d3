//! `shared_libs` table.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::db::Range;
use crate::error::{RegistryError, RegistryResult};
use crate::registry::model::SharedLibDef;
use crate::validation::Validator;

fn from_row(row: &SqliteRow) -> RegistryResult<SharedLibDef> {
    Ok(SharedLibDef {
        name: row.try_get("name")?,
        spa_bundle: row.try_get("spa_bundle")?,
        l10n_manifest: row.try_get("l10n_manifest")?,
        admin_notes: row.try_get("admin_notes")?,
    })
}

pub fn validate(lib: &SharedLibDef) -> RegistryResult<()> {
    Validator::new()
        .name("name", &lib.name)
        .url_or_path("spaBundle", &lib.spa_bundle)
        .optional_url_or_path("l10nManifest", lib.l10n_manifest.as_deref())
        .finish()
}

pub async fn list(pool: &SqlitePool, range: Range) -> RegistryResult<(Vec<SharedLibDef>, i64)> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM shared_libs")
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query(
        "SELECT name, spa_bundle, l10n_manifest, admin_notes FROM shared_libs \
         ORDER BY name LIMIT ? OFFSET ?",
    )
    .bind(range.limit())
    .bind(range.offset())
    .fetch_all(pool)
    .await?;

    let libs = rows.iter().map(from_row).collect::<RegistryResult<Vec<_>>>()?;
    Ok((libs, total))
}

pub async fn get(pool: &SqlitePool, name: &str) -> RegistryResult<SharedLibDef> {
    let row = sqlx::query(
        "SELECT name, spa_bundle, l10n_manifest, admin_notes FROM shared_libs WHERE name = ?",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| RegistryError::not_found("shared library", name))?;
    from_row(&row)
}

pub async fn insert(conn: &mut SqliteConnection, lib: &SharedLibDef) -> RegistryResult<String> {
    sqlx::query(
        "INSERT INTO shared_libs (name, spa_bundle, l10n_manifest, admin_notes) VALUES (?, ?, ?, ?)",
    )
    .bind(&lib.name)
    .bind(&lib.spa_bundle)
    .bind(&lib.l10n_manifest)
    .bind(&lib.admin_notes)
    .execute(&mut *conn)
    .await?;
    Ok(lib.name.clone())
}

pub async fn update(conn: &mut SqliteConnection, name: &str, lib: &SharedLibDef) -> RegistryResult<()> {
    let result = sqlx::query(
        "UPDATE shared_libs SET spa_bundle = ?, l10n_manifest = ?, admin_notes = ? WHERE name = ?",
    )
    .bind(&lib.spa_bundle)
    .bind(&lib.l10n_manifest)
    .bind(&lib.admin_notes)
    .bind(name)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RegistryError::not_found("shared library", name));
    }
    Ok(())
}
