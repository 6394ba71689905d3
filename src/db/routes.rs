//! `routes` and `route_slots` tables.
//!
//! Special routes share the table; their pattern is `special:<role>`.

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::{BTreeMap, HashMap};

use crate::db::{object_text, parse_object, Range};
use crate::error::{RegistryError, RegistryResult};
use crate::registry::model::{AppKind, JsonMap, SlotDef, SlotKind};
use crate::routing::matcher::PathMatcher;
use crate::validation::Validator;

pub const SPECIAL_PREFIX: &str = "special:";
pub const SPECIAL_ROLES: &[&str] = &["404"];

/// Create/update payload. Exactly one of `route` and `special_role` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteInput {
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub special_role: Option<String>,
    #[serde(default)]
    pub next: bool,
    #[serde(default)]
    pub template_name: Option<String>,
    #[serde(default)]
    pub slots: BTreeMap<String, SlotDef>,
    #[serde(default)]
    pub meta: JsonMap,
    #[serde(default)]
    pub domain_id: Option<i64>,
    #[serde(default)]
    pub order_pos: Option<i64>,
}

impl RouteInput {
    fn stored_pattern(&self) -> String {
        match (&self.special_role, &self.route) {
            (Some(role), _) => format!("{SPECIAL_PREFIX}{role}"),
            (None, Some(route)) => route.clone(),
            (None, None) => String::new(),
        }
    }
}

/// A stored route as returned by the admin API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRecord {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_role: Option<String>,
    pub next: bool,
    pub template_name: Option<String>,
    pub slots: BTreeMap<String, SlotDef>,
    pub meta: JsonMap,
    pub domain_id: Option<i64>,
    pub order_pos: i64,
}

pub fn validate(input: &RouteInput) -> RegistryResult<()> {
    let mut v = Validator::new();

    match (&input.route, &input.special_role) {
        (Some(_), Some(_)) => {
            v.error("specialRole", "a route has either a pattern or a special role");
        }
        (None, None) => {
            v.error("route", "must not be empty");
        }
        (None, Some(role)) => {
            v.check(
                SPECIAL_ROLES.contains(&role.as_str()),
                "specialRole",
                "unknown special role",
            )
            .check(!input.next, "next", "special routes can not be layering routes")
            .check(
                input.template_name.is_some(),
                "templateName",
                "special routes need a template",
            );
        }
        (Some(route), None) => {
            v.check(
                route == "*" || route.starts_with('/'),
                "route",
                "must be '*' or start with '/'",
            )
            .check(
                !route.starts_with(SPECIAL_PREFIX),
                "route",
                "reserved prefix",
            );
            if let Err(e) = PathMatcher::compile(route) {
                v.error("route", format!("does not compile: {e}"));
            }
            v.check(
                input.next || input.template_name.is_some(),
                "templateName",
                "terminal routes need a template",
            );
        }
    }

    for (name, slot) in &input.slots {
        v.name("slots", name);
        v.name(&format!("slots.{name}.appName"), &slot.app_name);
    }
    v.finish()
}

/// Every slot must reference an existing application that is not a wrapper.
pub async fn check_references(pool: &SqlitePool, input: &RouteInput) -> RegistryResult<()> {
    let mut v = Validator::new();
    for (name, slot) in &input.slots {
        let kind: Option<String> = sqlx::query_scalar("SELECT kind FROM apps WHERE name = ?")
            .bind(&slot.app_name)
            .fetch_optional(pool)
            .await?;

        match kind.as_deref().and_then(AppKind::parse) {
            None => {
                v.error(
                    &format!("slots.{name}.appName"),
                    format!("application '{}' does not exist", slot.app_name),
                );
            }
            Some(AppKind::Wrapper) => {
                v.error(
                    &format!("slots.{name}.appName"),
                    format!("application '{}' is a wrapper", slot.app_name),
                );
            }
            Some(_) => {}
        }
    }
    v.finish()
}

fn slot_from_row(row: &SqliteRow) -> RegistryResult<(i64, String, SlotDef)> {
    let kind: Option<String> = row.try_get("kind")?;
    Ok((
        row.try_get("route_id")?,
        row.try_get("name")?,
        SlotDef {
            app_name: row.try_get("app_name")?,
            kind: kind.as_deref().and_then(SlotKind::parse),
            props: parse_object(row.try_get("props")?, "props")?,
        },
    ))
}

fn record_from_row(row: &SqliteRow, slots: BTreeMap<String, SlotDef>) -> RegistryResult<RouteRecord> {
    let pattern: String = row.try_get("route")?;
    let (route, special_role) = match pattern.strip_prefix(SPECIAL_PREFIX) {
        Some(role) => (None, Some(role.to_string())),
        None => (Some(pattern), None),
    };

    Ok(RouteRecord {
        id: row.try_get("id")?,
        route,
        special_role,
        next: row.try_get("next")?,
        template_name: row.try_get("template_name")?,
        slots,
        meta: parse_object(row.try_get("meta")?, "meta")?,
        domain_id: row.try_get("domain_id")?,
        order_pos: row.try_get("order_pos")?,
    })
}

async fn slots_by_route(pool: &SqlitePool) -> RegistryResult<HashMap<i64, BTreeMap<String, SlotDef>>> {
    let rows = sqlx::query("SELECT route_id, name, app_name, kind, props FROM route_slots ORDER BY id")
        .fetch_all(pool)
        .await?;

    let mut grouped: HashMap<i64, BTreeMap<String, SlotDef>> = HashMap::new();
    for row in &rows {
        let (route_id, name, slot) = slot_from_row(row)?;
        grouped.entry(route_id).or_default().insert(name, slot);
    }
    Ok(grouped)
}

const SELECT: &str =
    "SELECT id, route, next, template_name, meta, domain_id, order_pos FROM routes";

/// Routes in resolution order: `order_pos`, then id.
pub async fn list(pool: &SqlitePool, range: Range) -> RegistryResult<(Vec<RouteRecord>, i64)> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM routes")
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query(&format!("{SELECT} ORDER BY order_pos, id LIMIT ? OFFSET ?"))
        .bind(range.limit())
        .bind(range.offset())
        .fetch_all(pool)
        .await?;

    let mut slots = slots_by_route(pool).await?;
    let routes = rows
        .iter()
        .map(|row| -> RegistryResult<RouteRecord> {
            let id: i64 = row.try_get("id")?;
            record_from_row(row, slots.remove(&id).unwrap_or_default())
        })
        .collect::<RegistryResult<Vec<_>>>()?;
    Ok((routes, total))
}

pub async fn get(pool: &SqlitePool, id: i64) -> RegistryResult<RouteRecord> {
    let row = sqlx::query(&format!("{SELECT} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| RegistryError::not_found("route", id.to_string()))?;

    let slot_rows = sqlx::query(
        "SELECT route_id, name, app_name, kind, props FROM route_slots WHERE route_id = ? ORDER BY id",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let mut slots = BTreeMap::new();
    for slot_row in &slot_rows {
        let (_, name, slot) = slot_from_row(slot_row)?;
        slots.insert(name, slot);
    }
    record_from_row(&row, slots)
}

async fn check_duplicate(
    conn: &mut SqliteConnection,
    pattern: &str,
    domain_id: Option<i64>,
    exclude: Option<i64>,
) -> RegistryResult<()> {
    let existing: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM routes WHERE route = ? AND domain_id IS ? AND id IS NOT ?",
    )
    .bind(pattern)
    .bind(domain_id)
    .bind(exclude)
    .fetch_one(&mut *conn)
    .await?;

    if existing > 0 {
        return Err(RegistryError::Conflict(format!(
            "route '{pattern}' already exists for this domain"
        )));
    }
    Ok(())
}

async fn insert_slots(
    conn: &mut SqliteConnection,
    route_id: i64,
    slots: &BTreeMap<String, SlotDef>,
) -> RegistryResult<()> {
    for (name, slot) in slots {
        sqlx::query(
            "INSERT INTO route_slots (route_id, name, app_name, kind, props) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(route_id)
        .bind(name)
        .bind(&slot.app_name)
        .bind(slot.kind.map(SlotKind::as_str))
        .bind(object_text(&slot.props))
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn insert(conn: &mut SqliteConnection, input: &RouteInput) -> RegistryResult<String> {
    let pattern = input.stored_pattern();
    check_duplicate(conn, &pattern, input.domain_id, None).await?;

    let order_pos = match input.order_pos {
        Some(pos) => pos,
        None => {
            sqlx::query_scalar::<_, i64>("SELECT COALESCE(MAX(order_pos), 0) + 10 FROM routes")
                .fetch_one(&mut *conn)
                .await?
        }
    };

    let id = sqlx::query(
        "INSERT INTO routes (route, next, template_name, meta, domain_id, order_pos) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&pattern)
    .bind(input.next)
    .bind(&input.template_name)
    .bind(object_text(&input.meta))
    .bind(input.domain_id)
    .bind(order_pos)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    insert_slots(conn, id, &input.slots).await?;
    Ok(id.to_string())
}

pub async fn update(conn: &mut SqliteConnection, id: i64, input: &RouteInput) -> RegistryResult<()> {
    let pattern = input.stored_pattern();
    check_duplicate(conn, &pattern, input.domain_id, Some(id)).await?;

    let result = sqlx::query(
        "UPDATE routes SET route = ?, next = ?, template_name = ?, meta = ?, domain_id = ?, \
         order_pos = COALESCE(?, order_pos) WHERE id = ?",
    )
    .bind(&pattern)
    .bind(input.next)
    .bind(&input.template_name)
    .bind(object_text(&input.meta))
    .bind(input.domain_id)
    .bind(input.order_pos)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RegistryError::not_found("route", id.to_string()));
    }

    sqlx::query("DELETE FROM route_slots WHERE route_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    insert_slots(conn, id, &input.slots).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(route: Option<&str>, role: Option<&str>, template: Option<&str>) -> RouteInput {
        RouteInput {
            route: route.map(String::from),
            special_role: role.map(String::from),
            template_name: template.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_route_shapes() {
        assert!(validate(&input(Some("/news/*"), None, Some("master"))).is_ok());
        assert!(validate(&input(Some("*"), None, Some("master"))).is_ok());
        assert!(validate(&input(None, Some("404"), Some("404"))).is_ok());

        assert!(validate(&input(None, None, None)).is_err());
        assert!(validate(&input(Some("news"), None, Some("t"))).is_err());
        assert!(validate(&input(Some("/a"), None, None)).is_err(), "terminal without template");
        assert!(validate(&input(None, Some("500"), Some("t"))).is_err());
        assert!(validate(&input(Some("/a"), Some("404"), Some("t"))).is_err());
    }

    #[test]
    fn test_layering_route_may_omit_template() {
        let mut layer = input(Some("*"), None, None);
        layer.next = true;
        assert!(validate(&layer).is_ok());
    }

    #[test]
    fn test_stored_pattern() {
        assert_eq!(input(None, Some("404"), None).stored_pattern(), "special:404");
        assert_eq!(input(Some("/a"), None, None).stored_pattern(), "/a");
    }
}
