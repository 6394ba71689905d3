//! `apps` table.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::db::{object_text, parse_object, Range};
use crate::error::{RegistryError, RegistryResult};
use crate::registry::model::{AppDef, AppKind};
use crate::validation::Validator;

const COLUMNS: &str = "name, spa_bundle, css_bundle, dependencies, props, ssr_props, ssr, kind, \
                       wrapped_with, l10n_manifest, discoverable, config_selector";

fn from_row(row: &SqliteRow) -> RegistryResult<AppDef> {
    let kind: String = row.try_get("kind")?;
    let ssr: Option<String> = row.try_get("ssr")?;
    let selector: Option<String> = row.try_get("config_selector")?;

    Ok(AppDef {
        name: row.try_get("name")?,
        spa_bundle: row.try_get("spa_bundle")?,
        css_bundle: row.try_get("css_bundle")?,
        dependencies: parse_object(row.try_get("dependencies")?, "dependencies")?,
        props: parse_object(row.try_get("props")?, "props")?,
        ssr_props: parse_object(row.try_get("ssr_props")?, "ssr_props")?,
        ssr: ssr.map(|s| serde_json::from_str(&s)).transpose()?,
        kind: AppKind::parse(&kind).unwrap_or_default(),
        wrapped_with: row.try_get("wrapped_with")?,
        l10n_manifest: row.try_get("l10n_manifest")?,
        discoverable: row.try_get("discoverable")?,
        config_selector: selector
            .map(|s| serde_json::from_str(&s))
            .transpose()?
            .unwrap_or_default(),
    })
}

/// Field checks that need no database access.
pub fn validate(app: &AppDef) -> RegistryResult<()> {
    let mut v = Validator::new();
    v.name("name", &app.name)
        .url_or_path("spaBundle", &app.spa_bundle)
        .optional_url_or_path("cssBundle", app.css_bundle.as_deref())
        .optional_url_or_path("l10nManifest", app.l10n_manifest.as_deref());

    if let Some(ssr) = &app.ssr {
        v.url_or_path("ssr.src", &ssr.src);
    }
    if let Some(wrapper) = &app.wrapped_with {
        v.check(
            app.kind != AppKind::Wrapper,
            "wrappedWith",
            "a wrapper application can not be wrapped",
        )
        .check(wrapper != &app.name, "wrappedWith", "an application can not wrap itself");
    }
    for name in &app.config_selector {
        v.name("configSelector", name);
    }
    v.finish()
}

/// Reference checks: `wrappedWith` must name an existing wrapper app.
pub async fn check_references(pool: &SqlitePool, app: &AppDef) -> RegistryResult<()> {
    let Some(wrapper) = &app.wrapped_with else {
        return Ok(());
    };

    let kind: Option<String> = sqlx::query_scalar("SELECT kind FROM apps WHERE name = ?")
        .bind(wrapper)
        .fetch_optional(pool)
        .await?;

    match kind.as_deref().and_then(AppKind::parse) {
        Some(AppKind::Wrapper) => Ok(()),
        Some(_) => Err(RegistryError::invalid(
            "wrappedWith",
            format!("application '{wrapper}' is not a wrapper"),
        )),
        None => Err(RegistryError::invalid(
            "wrappedWith",
            format!("application '{wrapper}' does not exist"),
        )),
    }
}

pub async fn list(pool: &SqlitePool, range: Range) -> RegistryResult<(Vec<AppDef>, i64)> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM apps")
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM apps ORDER BY name LIMIT ? OFFSET ?"
    ))
    .bind(range.limit())
    .bind(range.offset())
    .fetch_all(pool)
    .await?;

    let apps = rows.iter().map(from_row).collect::<RegistryResult<Vec<_>>>()?;
    Ok((apps, total))
}

pub async fn get(pool: &SqlitePool, name: &str) -> RegistryResult<AppDef> {
    let row = sqlx::query(&format!("SELECT {COLUMNS} FROM apps WHERE name = ?"))
        .bind(name)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| RegistryError::not_found("app", name))?;
    from_row(&row)
}

fn bind_fields<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    app: &AppDef,
) -> RegistryResult<sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>> {
    let ssr = app.ssr.as_ref().map(serde_json::to_string).transpose()?;
    let selector = if app.config_selector.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&app.config_selector)?)
    };

    Ok(query
        .bind(app.spa_bundle.clone())
        .bind(app.css_bundle.clone())
        .bind(object_text(&app.dependencies))
        .bind(object_text(&app.props))
        .bind(object_text(&app.ssr_props))
        .bind(ssr)
        .bind(app.kind.as_str())
        .bind(app.wrapped_with.clone())
        .bind(app.l10n_manifest.clone())
        .bind(app.discoverable)
        .bind(selector))
}

pub async fn insert(conn: &mut SqliteConnection, app: &AppDef) -> RegistryResult<String> {
    let query = sqlx::query(
        "INSERT INTO apps (spa_bundle, css_bundle, dependencies, props, ssr_props, ssr, kind, \
         wrapped_with, l10n_manifest, discoverable, config_selector, name) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    );
    bind_fields(query, app)?
        .bind(app.name.clone())
        .execute(&mut *conn)
        .await?;
    Ok(app.name.clone())
}

pub async fn update(conn: &mut SqliteConnection, name: &str, app: &AppDef) -> RegistryResult<()> {
    let query = sqlx::query(
        "UPDATE apps SET spa_bundle = ?, css_bundle = ?, dependencies = ?, props = ?, \
         ssr_props = ?, ssr = ?, kind = ?, wrapped_with = ?, l10n_manifest = ?, \
         discoverable = ?, config_selector = ? WHERE name = ?",
    );
    let result = bind_fields(query, app)?
        .bind(name.to_string())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(RegistryError::not_found("app", name));
    }
    Ok(())
}
