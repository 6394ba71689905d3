//! Secret redaction for snapshots and admin responses.
//!
//! Redaction replaces a non-null field with [`SECRET_MARKER`]. Applying it
//! twice changes nothing. Revert treats marked fields as "keep the live
//! value", so a redacted snapshot never overwrites a real secret.

use serde_json::Value;

use crate::registry::model::JsonMap;
use crate::versioning::entity::EntityType;
use crate::versioning::store::Snapshot;

pub const SECRET_MARKER: &str = "[SECRET]";

pub fn is_secret_marker(value: &Value) -> bool {
    matches!(value, Value::String(s) if s == SECRET_MARKER)
}

/// Whether any field of `row` carries the marker.
pub fn has_secret_marker(row: &JsonMap) -> bool {
    row.values().any(is_secret_marker)
}

fn redact(row: &mut JsonMap, field: &str) {
    if let Some(value) = row.get_mut(field) {
        if !value.is_null() {
            *value = Value::String(SECRET_MARKER.to_string());
        }
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().map(|n| n != 0).unwrap_or(false),
        Some(Value::String(s)) => s == "true" || s == "1",
        _ => false,
    }
}

/// Redact one entity row in place. Field names are shared by storage rows
/// and API bodies.
pub fn redact_row(entity: EntityType, row: &mut JsonMap) {
    match entity {
        EntityType::AuthEntities => redact(row, "secret"),
        EntityType::Settings if is_truthy(row.get("secret")) => {
            redact(row, "value");
            redact(row, "default");
        }
        _ => {}
    }
}

/// Redact a snapshot before it is persisted into a version record.
pub fn sanitize(entity: EntityType, mut snapshot: Snapshot) -> Snapshot {
    let secret_setting = entity == EntityType::Settings && is_truthy(snapshot.data.get("secret"));
    redact_row(entity, &mut snapshot.data);

    if secret_setting {
        if let Some(rows) = snapshot.related.get_mut("settings_domain_value") {
            for row in rows {
                redact(row, "value");
            }
        }
    }
    snapshot
}
