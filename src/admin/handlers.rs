//! CRUD handlers for registry entities.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    Extension, Json,
};

use crate::admin::{delete_versioned, paged, versioned, Actor, ListQuery};
use crate::db::auth_entities::{self, AuthEntityInput, AuthEntityRecord};
use crate::db::router_domains::{self, RouterDomainInput};
use crate::db::routes::{self, RouteInput, RouteRecord};
use crate::db::templates::{self, TemplateDef};
use crate::db::{apps, shared_libs, shared_props};
use crate::error::RegistryResult;
use crate::http::server::AppState;
use crate::registry::model::{AppDef, RouterDomainDef, SharedLibDef, SharedPropsDef};
use crate::versioning::{EntityRef, EntityType};

type Created<T> = (StatusCode, Json<T>);

// ---- apps ----

pub async fn list_apps(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> RegistryResult<Response> {
    let range = query.range()?;
    let (items, total) = apps::list(&state.pool, range).await?;
    Ok(paged("app", range, items, total))
}

pub async fn get_app(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> RegistryResult<Json<AppDef>> {
    Ok(Json(apps::get(&state.pool, &name).await?))
}

pub async fn create_app(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(app): Json<AppDef>,
) -> RegistryResult<Created<AppDef>> {
    apps::validate(&app)?;
    apps::check_references(&state.pool, &app).await?;

    let logged = versioned(&state, &actor, EntityRef::create(EntityType::Apps), move |conn| {
        Box::pin(async move { apps::insert(conn, &app).await.map(Some) })
    })
    .await?;

    let created = apps::get(&state.pool, &logged.entity_id).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_app(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(name): Path<String>,
    Json(mut app): Json<AppDef>,
) -> RegistryResult<Json<AppDef>> {
    // The path names the app; renames are not supported.
    app.name = name.clone();
    apps::validate(&app)?;
    apps::check_references(&state.pool, &app).await?;

    let key = name.clone();
    versioned(&state, &actor, EntityRef::new(EntityType::Apps, &name), move |conn| {
        Box::pin(async move { apps::update(conn, &key, &app).await.map(|()| None) })
    })
    .await?;

    Ok(Json(apps::get(&state.pool, &name).await?))
}

pub async fn delete_app(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(name): Path<String>,
) -> RegistryResult<StatusCode> {
    delete_versioned(&state, &actor, EntityType::Apps, name).await
}

// ---- routes ----

pub async fn list_routes(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> RegistryResult<Response> {
    let range = query.range()?;
    let (items, total) = routes::list(&state.pool, range).await?;
    Ok(paged("route", range, items, total))
}

pub async fn get_route(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> RegistryResult<Json<RouteRecord>> {
    Ok(Json(routes::get(&state.pool, id).await?))
}

pub async fn create_route(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(input): Json<RouteInput>,
) -> RegistryResult<Created<RouteRecord>> {
    routes::validate(&input)?;
    routes::check_references(&state.pool, &input).await?;

    let logged = versioned(&state, &actor, EntityRef::create(EntityType::Routes), move |conn| {
        Box::pin(async move { routes::insert(conn, &input).await.map(Some) })
    })
    .await?;

    let id = parse_row_id(&logged.entity_id)?;
    Ok((StatusCode::CREATED, Json(routes::get(&state.pool, id).await?)))
}

pub async fn update_route(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(input): Json<RouteInput>,
) -> RegistryResult<Json<RouteRecord>> {
    routes::validate(&input)?;
    routes::check_references(&state.pool, &input).await?;

    versioned(&state, &actor, EntityRef::new(EntityType::Routes, id.to_string()), move |conn| {
        Box::pin(async move { routes::update(conn, id, &input).await.map(|()| None) })
    })
    .await?;

    Ok(Json(routes::get(&state.pool, id).await?))
}

pub async fn delete_route(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> RegistryResult<StatusCode> {
    delete_versioned(&state, &actor, EntityType::Routes, id.to_string()).await
}

// ---- templates ----

pub async fn list_templates(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> RegistryResult<Response> {
    let range = query.range()?;
    let (items, total) = templates::list(&state.pool, range).await?;
    Ok(paged("template", range, items, total))
}

pub async fn get_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> RegistryResult<Json<TemplateDef>> {
    Ok(Json(templates::get(&state.pool, &name).await?))
}

pub async fn create_template(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(template): Json<TemplateDef>,
) -> RegistryResult<Created<TemplateDef>> {
    templates::validate(&template)?;

    let logged = versioned(&state, &actor, EntityRef::create(EntityType::Templates), move |conn| {
        Box::pin(async move { templates::insert(conn, &template).await.map(Some) })
    })
    .await?;

    let created = templates::get(&state.pool, &logged.entity_id).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_template(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(name): Path<String>,
    Json(mut template): Json<TemplateDef>,
) -> RegistryResult<Json<TemplateDef>> {
    template.name = name.clone();
    templates::validate(&template)?;

    let key = name.clone();
    versioned(&state, &actor, EntityRef::new(EntityType::Templates, &name), move |conn| {
        Box::pin(async move { templates::update(conn, &key, &template).await.map(|()| None) })
    })
    .await?;

    Ok(Json(templates::get(&state.pool, &name).await?))
}

pub async fn delete_template(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(name): Path<String>,
) -> RegistryResult<StatusCode> {
    delete_versioned(&state, &actor, EntityType::Templates, name).await
}

// ---- shared libs ----

pub async fn list_shared_libs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> RegistryResult<Response> {
    let range = query.range()?;
    let (items, total) = shared_libs::list(&state.pool, range).await?;
    Ok(paged("shared_libs", range, items, total))
}

pub async fn get_shared_lib(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> RegistryResult<Json<SharedLibDef>> {
    Ok(Json(shared_libs::get(&state.pool, &name).await?))
}

pub async fn create_shared_lib(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(lib): Json<SharedLibDef>,
) -> RegistryResult<Created<SharedLibDef>> {
    shared_libs::validate(&lib)?;

    let logged = versioned(&state, &actor, EntityRef::create(EntityType::SharedLibs), move |conn| {
        Box::pin(async move { shared_libs::insert(conn, &lib).await.map(Some) })
    })
    .await?;

    let created = shared_libs::get(&state.pool, &logged.entity_id).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_shared_lib(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(name): Path<String>,
    Json(mut lib): Json<SharedLibDef>,
) -> RegistryResult<Json<SharedLibDef>> {
    lib.name = name.clone();
    shared_libs::validate(&lib)?;

    let key = name.clone();
    versioned(&state, &actor, EntityRef::new(EntityType::SharedLibs, &name), move |conn| {
        Box::pin(async move { shared_libs::update(conn, &key, &lib).await.map(|()| None) })
    })
    .await?;

    Ok(Json(shared_libs::get(&state.pool, &name).await?))
}

pub async fn delete_shared_lib(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(name): Path<String>,
) -> RegistryResult<StatusCode> {
    delete_versioned(&state, &actor, EntityType::SharedLibs, name).await
}

// ---- shared props ----

pub async fn list_shared_props(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> RegistryResult<Response> {
    let range = query.range()?;
    let (items, total) = shared_props::list(&state.pool, range).await?;
    Ok(paged("shared_props", range, items, total))
}

pub async fn get_shared_props(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> RegistryResult<Json<SharedPropsDef>> {
    Ok(Json(shared_props::get(&state.pool, &name).await?))
}

pub async fn create_shared_props(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(shared): Json<SharedPropsDef>,
) -> RegistryResult<Created<SharedPropsDef>> {
    shared_props::validate(&shared)?;

    let logged = versioned(&state, &actor, EntityRef::create(EntityType::SharedProps), move |conn| {
        Box::pin(async move { shared_props::insert(conn, &shared).await.map(Some) })
    })
    .await?;

    let created = shared_props::get(&state.pool, &logged.entity_id).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_shared_props(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(name): Path<String>,
    Json(mut shared): Json<SharedPropsDef>,
) -> RegistryResult<Json<SharedPropsDef>> {
    shared.name = name.clone();
    shared_props::validate(&shared)?;

    let key = name.clone();
    versioned(&state, &actor, EntityRef::new(EntityType::SharedProps, &name), move |conn| {
        Box::pin(async move { shared_props::update(conn, &key, &shared).await.map(|()| None) })
    })
    .await?;

    Ok(Json(shared_props::get(&state.pool, &name).await?))
}

pub async fn delete_shared_props(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(name): Path<String>,
) -> RegistryResult<StatusCode> {
    delete_versioned(&state, &actor, EntityType::SharedProps, name).await
}

// ---- router domains ----

pub async fn list_router_domains(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> RegistryResult<Response> {
    let range = query.range()?;
    let (items, total) = router_domains::list(&state.pool, range).await?;
    Ok(paged("router_domains", range, items, total))
}

pub async fn get_router_domain(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> RegistryResult<Json<RouterDomainDef>> {
    Ok(Json(router_domains::get(&state.pool, id).await?))
}

pub async fn create_router_domain(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(input): Json<RouterDomainInput>,
) -> RegistryResult<Created<RouterDomainDef>> {
    router_domains::validate(&input)?;

    let logged = versioned(&state, &actor, EntityRef::create(EntityType::RouterDomains), move |conn| {
        Box::pin(async move { router_domains::insert(conn, &input).await.map(Some) })
    })
    .await?;

    let id = parse_row_id(&logged.entity_id)?;
    Ok((StatusCode::CREATED, Json(router_domains::get(&state.pool, id).await?)))
}

pub async fn update_router_domain(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(input): Json<RouterDomainInput>,
) -> RegistryResult<Json<RouterDomainDef>> {
    router_domains::validate(&input)?;

    versioned(
        &state,
        &actor,
        EntityRef::new(EntityType::RouterDomains, id.to_string()),
        move |conn| Box::pin(async move { router_domains::update(conn, id, &input).await.map(|()| None) }),
    )
    .await?;

    Ok(Json(router_domains::get(&state.pool, id).await?))
}

pub async fn delete_router_domain(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> RegistryResult<StatusCode> {
    delete_versioned(&state, &actor, EntityType::RouterDomains, id.to_string()).await
}

// ---- auth entities ----

pub async fn list_auth_entities(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> RegistryResult<Response> {
    let range = query.range()?;
    let (items, total) = auth_entities::list(&state.pool, range).await?;
    Ok(paged("auth_entities", range, items, total))
}

pub async fn get_auth_entity(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> RegistryResult<Json<AuthEntityRecord>> {
    Ok(Json(auth_entities::get(&state.pool, id).await?))
}

pub async fn create_auth_entity(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(input): Json<AuthEntityInput>,
) -> RegistryResult<Created<AuthEntityRecord>> {
    auth_entities::validate(&input, true)?;

    let logged = versioned(&state, &actor, EntityRef::create(EntityType::AuthEntities), move |conn| {
        Box::pin(async move { auth_entities::insert(conn, &input).await.map(Some) })
    })
    .await?;

    let id = parse_row_id(&logged.entity_id)?;
    Ok((StatusCode::CREATED, Json(auth_entities::get(&state.pool, id).await?)))
}

pub async fn update_auth_entity(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(input): Json<AuthEntityInput>,
) -> RegistryResult<Json<AuthEntityRecord>> {
    auth_entities::validate(&input, false)?;

    versioned(
        &state,
        &actor,
        EntityRef::new(EntityType::AuthEntities, id.to_string()),
        move |conn| Box::pin(async move { auth_entities::update(conn, id, &input).await.map(|()| None) }),
    )
    .await?;

    Ok(Json(auth_entities::get(&state.pool, id).await?))
}

pub async fn delete_auth_entity(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> RegistryResult<StatusCode> {
    delete_versioned(&state, &actor, EntityType::AuthEntities, id.to_string()).await
}

fn parse_row_id(raw: &str) -> RegistryResult<i64> {
    raw.parse()
        .map_err(|_| crate::error::RegistryError::Versioning(format!("non-numeric row id '{raw}'")))
}
