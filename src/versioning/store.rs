//! Row-level snapshot reads and restores.
//!
//! # Responsibilities
//! - Read an entity row plus its related rows as JSON
//! - Restore a snapshot, keeping live values for redacted fields
//! - Delete an entity and its related rows
//!
//! Rows are read with SQLite `json_object`, so every column keeps its stored
//! representation: JSON columns stay text, booleans stay integers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};
use sqlx::{Row, SqliteConnection};
use std::collections::BTreeMap;

use crate::error::{RegistryError, RegistryResult};
use crate::registry::model::JsonMap;
use crate::versioning::entity::{EntitySchema, EntityType, RelatedTable};
use crate::versioning::sanitizer::{has_secret_marker, is_secret_marker};

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Captured state of one entity: its row and its related child rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub data: JsonMap,
    #[serde(default)]
    pub related: BTreeMap<String, Vec<JsonMap>>,
}

#[derive(Debug, Clone)]
enum EntityId {
    Int(i64),
    Text(String),
}

fn parse_id(entity: EntityType, schema: &EntitySchema, id: &str) -> RegistryResult<EntityId> {
    if schema.integer_id {
        id.parse::<i64>()
            .map(EntityId::Int)
            .map_err(|_| RegistryError::not_found(entity.as_str(), id))
    } else {
        Ok(EntityId::Text(id.to_string()))
    }
}

fn bind_id<'q>(query: SqliteQuery<'q>, id: &EntityId) -> SqliteQuery<'q> {
    match id {
        EntityId::Int(n) => query.bind(*n),
        EntityId::Text(s) => query.bind(s.clone()),
    }
}

/// Bind a snapshot value back in its stored representation.
pub(crate) fn bind_value<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

fn quote(ident: &str) -> String {
    format!("\"{ident}\"")
}

fn json_object_expr(columns: &[&str]) -> String {
    let pairs = columns
        .iter()
        .map(|c| format!("'{}', {}", c, quote(c)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("json_object({pairs})")
}

async fn read_rows(
    conn: &mut SqliteConnection,
    table: &str,
    columns: &[&str],
    key_column: &str,
    id: &EntityId,
) -> RegistryResult<Vec<JsonMap>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = ? ORDER BY rowid",
        json_object_expr(columns),
        quote(table),
        quote(key_column)
    );
    let rows = bind_id(sqlx::query(&sql), id).fetch_all(&mut *conn).await?;

    rows.iter()
        .map(|row| -> RegistryResult<JsonMap> {
            let raw: String = row.try_get(0)?;
            Ok(serde_json::from_str::<JsonMap>(&raw)?)
        })
        .collect()
}

/// Current state of `entity` `id`, or `None` if the row does not exist.
pub async fn read_snapshot(
    conn: &mut SqliteConnection,
    entity: EntityType,
    id: &str,
) -> RegistryResult<Option<Snapshot>> {
    let schema = entity.schema();
    let id = parse_id(entity, schema, id)?;

    let Some(data) = read_rows(conn, schema.table, schema.columns, schema.id_column, &id)
        .await?
        .into_iter()
        .next()
    else {
        return Ok(None);
    };

    let mut related = BTreeMap::new();
    for child in schema.related {
        let rows = read_rows(conn, child.table, child.columns, child.foreign_key, &id).await?;
        related.insert(child.table.to_string(), rows);
    }

    Ok(Some(Snapshot { data, related }))
}

async fn insert_row(
    conn: &mut SqliteConnection,
    table: &str,
    columns: &[&str],
    row: &JsonMap,
) -> RegistryResult<()> {
    let present: Vec<(&str, &Value)> = columns
        .iter()
        .filter_map(|c| row.get(*c).map(|v| (*c, v)))
        .collect();

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote(table),
        present
            .iter()
            .map(|(c, _)| quote(c))
            .collect::<Vec<_>>()
            .join(", "),
        vec!["?"; present.len()].join(", ")
    );

    let mut query = sqlx::query(&sql);
    for (_, value) in &present {
        query = bind_value(query, value);
    }
    query.execute(&mut *conn).await?;
    Ok(())
}

/// Replace marker fields in a related row with the matching live row's values.
fn recover_related_secrets(
    related: &RelatedTable,
    row: &JsonMap,
    live_rows: &[JsonMap],
) -> RegistryResult<JsonMap> {
    if !has_secret_marker(row) {
        return Ok(row.clone());
    }

    let live = live_rows.iter().find(|live| {
        related
            .key_columns
            .iter()
            .all(|k| live.get(*k) == row.get(*k))
    });
    let Some(live) = live else {
        return Err(RegistryError::non_revertable(format!(
            "redacted value in {} can not be recovered, the live row is gone",
            related.table
        )));
    };

    let mut recovered = row.clone();
    for (field, value) in recovered.iter_mut() {
        if is_secret_marker(value) {
            *value = live.get(field).cloned().unwrap_or(Value::Null);
        }
    }
    Ok(recovered)
}

/// Write `snapshot` back as the state of `entity` `id`.
///
/// Marked fields keep their live values. Related rows are replaced as a set.
pub async fn restore(
    conn: &mut SqliteConnection,
    entity: EntityType,
    id: &str,
    snapshot: &Snapshot,
) -> RegistryResult<()> {
    let schema = entity.schema();
    let parsed = parse_id(entity, schema, id)?;
    let live = read_snapshot(conn, entity, id).await?;

    if live.is_some() {
        let assignments: Vec<(&str, &Value)> = schema
            .columns
            .iter()
            .filter(|c| **c != schema.id_column)
            .filter_map(|c| snapshot.data.get(*c).map(|v| (*c, v)))
            .filter(|(_, v)| !is_secret_marker(v))
            .collect();

        if !assignments.is_empty() {
            let sql = format!(
                "UPDATE {} SET {} WHERE {} = ?",
                quote(schema.table),
                assignments
                    .iter()
                    .map(|(c, _)| format!("{} = ?", quote(c)))
                    .collect::<Vec<_>>()
                    .join(", "),
                quote(schema.id_column)
            );
            let mut query = sqlx::query(&sql);
            for (_, value) in &assignments {
                query = bind_value(query, value);
            }
            bind_id(query, &parsed).execute(&mut *conn).await?;
        }
    } else {
        if has_secret_marker(&snapshot.data) {
            return Err(RegistryError::non_revertable(format!(
                "{entity} '{id}' holds a redacted secret and no longer exists"
            )));
        }
        insert_row(conn, schema.table, schema.columns, &snapshot.data).await?;
    }

    for related in schema.related {
        let live_rows = live
            .as_ref()
            .and_then(|l| l.related.get(related.table))
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let rows = snapshot
            .related
            .get(related.table)
            .into_iter()
            .flatten()
            .map(|row| recover_related_secrets(related, row, live_rows))
            .collect::<RegistryResult<Vec<_>>>()?;

        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            quote(related.table),
            quote(related.foreign_key)
        );
        bind_id(sqlx::query(&sql), &parsed)
            .execute(&mut *conn)
            .await?;

        for row in &rows {
            insert_row(conn, related.table, related.columns, row).await?;
        }
    }

    Ok(())
}

/// Delete `entity` `id` together with its related rows.
pub async fn delete_entity(
    conn: &mut SqliteConnection,
    entity: EntityType,
    id: &str,
) -> RegistryResult<()> {
    let schema = entity.schema();
    let parsed = parse_id(entity, schema, id)?;

    for related in schema.related {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            quote(related.table),
            quote(related.foreign_key)
        );
        bind_id(sqlx::query(&sql), &parsed)
            .execute(&mut *conn)
            .await?;
    }

    let sql = format!(
        "DELETE FROM {} WHERE {} = ?",
        quote(schema.table),
        quote(schema.id_column)
    );
    let result = bind_id(sqlx::query(&sql), &parsed)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(RegistryError::not_found(entity.as_str(), id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_object_expr_quotes_columns() {
        assert_eq!(
            json_object_expr(&["key", "default"]),
            "json_object('key', \"key\", 'default', \"default\")"
        );
    }

    #[test]
    fn test_related_secret_recovered_from_live_row() {
        let related = &EntityType::Settings.schema().related[0];
        let row = json!({"id": 1, "key": "authToken", "domain_id": 2, "value": "[SECRET]"});
        let live = json!({"id": 7, "key": "authToken", "domain_id": 2, "value": "\"real\""});

        let recovered = recover_related_secrets(
            related,
            row.as_object().unwrap(),
            &[live.as_object().cloned().unwrap()],
        )
        .unwrap();
        assert_eq!(recovered["value"], "\"real\"");
        assert_eq!(recovered["id"], 1);
    }

    #[test]
    fn test_related_secret_without_live_row_is_not_revertable() {
        let related = &EntityType::Settings.schema().related[0];
        let row = json!({"id": 1, "key": "authToken", "domain_id": 2, "value": "[SECRET]"});

        let err = recover_related_secrets(related, row.as_object().unwrap(), &[]).unwrap_err();
        assert!(matches!(err, RegistryError::NonRevertable { .. }));
    }
}
