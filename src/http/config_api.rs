//! Public read API consumed by renderers and browsers.

use axum::{
    extract::{Path, Query, State},
    response::Html,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::db::templates;
use crate::error::RegistryResult;
use crate::http::request::RequestDomain;
use crate::http::server::AppState;
use crate::registry::{CompositionPlan, ConfigView, RegistrySnapshot};

/// `GET /api/v1/config`
pub async fn get_config(
    State(state): State<AppState>,
    domain: RequestDomain,
) -> RegistryResult<Json<ConfigView>> {
    Ok(Json(state.resolver.config_for(domain.as_deref()).await?))
}

/// `GET /api/v1/config/snapshot`: unscoped snapshot for downstream registries.
pub async fn get_snapshot(State(state): State<AppState>) -> RegistryResult<Json<Arc<RegistrySnapshot>>> {
    Ok(Json(state.resolver.snapshot().await?))
}

#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    pub url: String,
}

/// `GET /api/v1/resolve?url=`
pub async fn resolve(
    State(state): State<AppState>,
    domain: RequestDomain,
    Query(query): Query<ResolveQuery>,
) -> RegistryResult<Json<CompositionPlan>> {
    Ok(Json(state.resolver.resolve(domain.as_deref(), &query.url).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct LocaleQuery {
    pub locale: Option<String>,
}

/// `GET /api/v1/template/{name}/rendered?locale=`
pub async fn rendered_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<LocaleQuery>,
) -> RegistryResult<Html<String>> {
    let content = templates::rendered(&state.pool, &name, query.locale.as_deref()).await?;
    Ok(Html(content))
}

/// `GET /ping`
pub async fn ping() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
