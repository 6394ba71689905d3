//! Settings endpoints. Keys are seeded; only values and per-domain
//! overrides change.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    Extension, Json,
};

use crate::admin::{paged, versioned, Actor, ListQuery};
use crate::db::settings::{self, SettingRecord, SettingUpdate};
use crate::error::RegistryResult;
use crate::http::server::AppState;
use crate::versioning::{EntityRef, EntityType};

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> RegistryResult<Response> {
    let range = query.range()?;
    let (items, total) = settings::list(&state.pool, range).await?;
    let items: Vec<SettingRecord> = items.into_iter().map(SettingRecord::redacted).collect();
    Ok(paged("settings", range, items, total))
}

pub async fn get(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> RegistryResult<Json<SettingRecord>> {
    Ok(Json(settings::get(&state.pool, &key).await?.redacted()))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(key): Path<String>,
    Json(update): Json<SettingUpdate>,
) -> RegistryResult<Json<SettingRecord>> {
    let target = key.clone();
    versioned(&state, &actor, EntityRef::new(EntityType::Settings, &key), move |conn| {
        Box::pin(async move { settings::update(conn, &target, &update).await.map(|()| None) })
    })
    .await?;

    Ok(Json(settings::get(&state.pool, &key).await?.redacted()))
}

pub async fn set_domain_value(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((key, domain_id)): Path<(String, i64)>,
    Json(update): Json<SettingUpdate>,
) -> RegistryResult<Json<SettingRecord>> {
    let target = key.clone();
    versioned(&state, &actor, EntityRef::new(EntityType::Settings, &key), move |conn| {
        Box::pin(async move {
            settings::set_domain_value(conn, &target, domain_id, &update)
                .await
                .map(|()| None)
        })
    })
    .await?;

    Ok(Json(settings::get(&state.pool, &key).await?.redacted()))
}

pub async fn remove_domain_value(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((key, domain_id)): Path<(String, i64)>,
) -> RegistryResult<StatusCode> {
    let target = key.clone();
    versioned(&state, &actor, EntityRef::new(EntityType::Settings, key), move |conn| {
        Box::pin(async move {
            settings::remove_domain_value(conn, &target, domain_id)
                .await
                .map(|()| None)
        })
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}
