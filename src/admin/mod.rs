//! Authenticated admin API: entity CRUD, settings and versioning.
//!
//! # Data Flow
//! ```text
//! request → auth.rs (Actor extension, read-only check)
//!     → handler: validate → reference checks
//!     → VersioningService::log_operation (mutation + version record)
//!     → ConfigResolver::invalidate
//! ```
//!
//! # Design Decisions
//! - Every write goes through `versioned`, so there is no unversioned path
//! - Responses never carry secrets; auth secrets and secret settings are
//!   replaced with the marker

pub mod auth;
pub mod handlers;
pub mod settings;
pub mod versioning;

use axum::{
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;

use crate::db::Range;
use crate::error::RegistryResult;
use crate::http::server::AppState;
use crate::versioning::store::delete_entity;
use crate::versioning::{EntityRef, EntityType, Logged};

pub use auth::Actor;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/app", get(handlers::list_apps).post(handlers::create_app))
        .route(
            "/api/v1/app/{name}",
            get(handlers::get_app)
                .put(handlers::update_app)
                .delete(handlers::delete_app),
        )
        .route("/api/v1/route", get(handlers::list_routes).post(handlers::create_route))
        .route(
            "/api/v1/route/{id}",
            get(handlers::get_route)
                .put(handlers::update_route)
                .delete(handlers::delete_route),
        )
        .route(
            "/api/v1/template",
            get(handlers::list_templates).post(handlers::create_template),
        )
        .route(
            "/api/v1/template/{name}",
            get(handlers::get_template)
                .put(handlers::update_template)
                .delete(handlers::delete_template),
        )
        .route(
            "/api/v1/shared_libs",
            get(handlers::list_shared_libs).post(handlers::create_shared_lib),
        )
        .route(
            "/api/v1/shared_libs/{name}",
            get(handlers::get_shared_lib)
                .put(handlers::update_shared_lib)
                .delete(handlers::delete_shared_lib),
        )
        .route(
            "/api/v1/shared_props",
            get(handlers::list_shared_props).post(handlers::create_shared_props),
        )
        .route(
            "/api/v1/shared_props/{name}",
            get(handlers::get_shared_props)
                .put(handlers::update_shared_props)
                .delete(handlers::delete_shared_props),
        )
        .route(
            "/api/v1/router_domains",
            get(handlers::list_router_domains).post(handlers::create_router_domain),
        )
        .route(
            "/api/v1/router_domains/{id}",
            get(handlers::get_router_domain)
                .put(handlers::update_router_domain)
                .delete(handlers::delete_router_domain),
        )
        .route(
            "/api/v1/auth_entities",
            get(handlers::list_auth_entities).post(handlers::create_auth_entity),
        )
        .route(
            "/api/v1/auth_entities/{id}",
            get(handlers::get_auth_entity)
                .put(handlers::update_auth_entity)
                .delete(handlers::delete_auth_entity),
        )
        .route("/api/v1/settings", get(settings::list))
        .route("/api/v1/settings/{key}", get(settings::get).put(settings::update))
        .route(
            "/api/v1/settings/{key}/domain/{domain_id}",
            put(settings::set_domain_value).delete(settings::remove_domain_value),
        )
        .route("/api/v1/versioning", get(versioning::list))
        .route("/api/v1/versioning/{id}", get(versioning::get))
        .route("/api/v1/versioning/{id}/revert", post(versioning::revert))
        .route_layer(middleware::from_fn_with_state(state, auth::require_auth))
}

/// `range` and `filter` query parameters of list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub range: Option<String>,
    pub filter: Option<String>,
}

impl ListQuery {
    pub fn range(&self) -> RegistryResult<Range> {
        Range::parse_optional(self.range.as_deref())
    }
}

/// JSON list with its `Content-Range` header.
pub(crate) fn paged<T: Serialize>(resource: &str, range: Range, items: Vec<T>, total: i64) -> Response {
    let content_range = range.content_range(resource, items.len(), total);
    ([(header::CONTENT_RANGE, content_range)], Json(items)).into_response()
}

/// Run a mutation as one version, then drop the resolver's snapshot.
pub(crate) async fn versioned<F>(
    state: &AppState,
    actor: &Actor,
    target: EntityRef,
    mutation: F,
) -> RegistryResult<Logged>
where
    F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, RegistryResult<Option<String>>>
        + Send,
{
    let logged = state
        .versioning
        .log_operation(&actor.identifier, target, mutation)
        .await?;
    state.resolver.invalidate();
    Ok(logged)
}

/// Versioned delete of `entity` `id`.
pub(crate) async fn delete_versioned(
    state: &AppState,
    actor: &Actor,
    entity: EntityType,
    id: String,
) -> RegistryResult<StatusCode> {
    let key = id.clone();
    versioned(state, actor, EntityRef::new(entity, id), move |conn| {
        Box::pin(async move { delete_entity(conn, entity, &key).await.map(|()| None) })
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
