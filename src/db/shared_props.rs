//! `shared_props` table.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::db::{object_text, parse_object, Range};
use crate::error::{RegistryError, RegistryResult};
use crate::registry::model::SharedPropsDef;
use crate::validation::Validator;

fn from_row(row: &SqliteRow) -> RegistryResult<SharedPropsDef> {
    Ok(SharedPropsDef {
        name: row.try_get("name")?,
        props: parse_object(row.try_get("props")?, "props")?,
        ssr_props: parse_object(row.try_get("ssr_props")?, "ssr_props")?,
    })
}

pub fn validate(shared: &SharedPropsDef) -> RegistryResult<()> {
    Validator::new().name("name", &shared.name).finish()
}

pub async fn list(pool: &SqlitePool, range: Range) -> RegistryResult<(Vec<SharedPropsDef>, i64)> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM shared_props")
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query(
        "SELECT name, props, ssr_props FROM shared_props ORDER BY name LIMIT ? OFFSET ?",
    )
    .bind(range.limit())
    .bind(range.offset())
    .fetch_all(pool)
    .await?;

    let shared = rows.iter().map(from_row).collect::<RegistryResult<Vec<_>>>()?;
    Ok((shared, total))
}

pub async fn get(pool: &SqlitePool, name: &str) -> RegistryResult<SharedPropsDef> {
    let row = sqlx::query("SELECT name, props, ssr_props FROM shared_props WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| RegistryError::not_found("shared props", name))?;
    from_row(&row)
}

pub async fn insert(conn: &mut SqliteConnection, shared: &SharedPropsDef) -> RegistryResult<String> {
    sqlx::query("INSERT INTO shared_props (name, props, ssr_props) VALUES (?, ?, ?)")
        .bind(&shared.name)
        .bind(object_text(&shared.props))
        .bind(object_text(&shared.ssr_props))
        .execute(&mut *conn)
        .await?;
    Ok(shared.name.clone())
}

pub async fn update(
    conn: &mut SqliteConnection,
    name: &str,
    shared: &SharedPropsDef,
) -> RegistryResult<()> {
    let result = sqlx::query("UPDATE shared_props SET props = ?, ssr_props = ? WHERE name = ?")
        .bind(object_text(&shared.props))
        .bind(object_text(&shared.ssr_props))
        .bind(name)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(RegistryError::not_found("shared props", name));
    }
    Ok(())
}
