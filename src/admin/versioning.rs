//! Version history and revert.

use axum::{
    extract::{Path, Query, State},
    response::Response,
    Extension, Json,
};
use serde::Serialize;

use crate::admin::{paged, Actor, ListQuery};
use crate::error::{RegistryError, RegistryResult};
use crate::http::server::AppState;
use crate::versioning::{VersionFilter, VersionRecord};

/// Body of a successful revert.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reverted {
    pub status: &'static str,
    pub version_id: i64,
}

fn parse_filter(raw: Option<&str>) -> RegistryResult<VersionFilter> {
    match raw {
        None => Ok(VersionFilter::default()),
        Some(text) => serde_json::from_str(text)
            .map_err(|e| RegistryError::invalid("filter", format!("malformed filter: {e}"))),
    }
}

/// `GET /api/v1/versioning?filter={"entity_type":..,"entity_id":..}&range=[a,b]`
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> RegistryResult<Response> {
    let range = query.range()?;
    let filter = parse_filter(query.filter.as_deref())?;
    let (items, total) = state.versioning.list_versions(&filter, range).await?;
    Ok(paged("versioning", range, items, total))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> RegistryResult<Json<VersionRecord>> {
    Ok(Json(state.versioning.get_version(id).await?))
}

/// `POST /api/v1/versioning/{id}/revert`
pub async fn revert(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> RegistryResult<Json<Reverted>> {
    let logged = state.versioning.revert_operation(&actor.identifier, id).await?;
    state.resolver.invalidate();

    Ok(Json(Reverted {
        status: "ok",
        version_id: logged.version_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::versioning::EntityType;

    #[test]
    fn test_parse_filter() {
        let filter = parse_filter(Some(r#"{"entity_type":"routes","entity_id":"7"}"#)).unwrap();
        assert_eq!(filter.entity_type, Some(EntityType::Routes));
        assert_eq!(filter.entity_id.as_deref(), Some("7"));

        assert!(parse_filter(None).unwrap().entity_type.is_none());
        assert!(matches!(
            parse_filter(Some(r#"{"entity_type":"nope"}"#)),
            Err(RegistryError::Validation(_))
        ));
    }
}
