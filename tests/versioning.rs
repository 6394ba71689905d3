//! Versioning service against a real SQLite schema.

mod common;

use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::collections::BTreeMap;

use fragment_registry::db::auth_entities::{self, AuthEntityInput, AuthRole};
use fragment_registry::db::routes::{self, RouteInput};
use fragment_registry::db::settings::{self, SettingUpdate};
use fragment_registry::db::templates::{self, TemplateDef};
use fragment_registry::db::{apps, Range};
use fragment_registry::registry::model::{AppDef, SlotDef};
use fragment_registry::versioning::entity::EntityType;
use fragment_registry::versioning::service::{EntityRef, Logged, VersionFilter, VersioningService};
use fragment_registry::versioning::store;
use fragment_registry::RegistryError;

const ACTOR: &str = "tester";

fn app(name: &str) -> AppDef {
    serde_json::from_value(json!({
        "name": name,
        "spaBundle": format!("http://cdn.local/{name}.js"),
        "props": { "title": name },
    }))
    .unwrap()
}

async fn create_app(service: &VersioningService, def: AppDef) -> Logged {
    service
        .log_operation(ACTOR, EntityRef::create(EntityType::Apps), move |conn| {
            Box::pin(async move { apps::insert(conn, &def).await.map(Some) })
        })
        .await
        .unwrap()
}

async fn update_app(service: &VersioningService, def: AppDef) -> Logged {
    let name = def.name.clone();
    service
        .log_operation(ACTOR, EntityRef::new(EntityType::Apps, name.clone()), move |conn| {
            Box::pin(async move { apps::update(conn, &name, &def).await.map(|()| None) })
        })
        .await
        .unwrap()
}

async fn delete(service: &VersioningService, entity: EntityType, id: &str) -> Logged {
    let owned = id.to_string();
    service
        .log_operation(ACTOR, EntityRef::new(entity, id), move |conn| {
            Box::pin(async move {
                store::delete_entity(conn, entity, &owned)
                    .await
                    .map(|()| None)
            })
        })
        .await
        .unwrap()
}

async fn set_setting(service: &VersioningService, key: &str, value: Value) -> Logged {
    let key = key.to_string();
    service
        .log_operation(ACTOR, EntityRef::new(EntityType::Settings, key.clone()), move |conn| {
            Box::pin(async move {
                settings::update(conn, &key, &SettingUpdate { value })
                    .await
                    .map(|()| None)
            })
        })
        .await
        .unwrap()
}

async fn seed_route(service: &VersioningService, app_name: &str) -> Logged {
    let template = TemplateDef {
        name: "master".into(),
        content: "<html></html>".into(),
        localized: BTreeMap::new(),
    };
    service
        .log_operation(ACTOR, EntityRef::create(EntityType::Templates), move |conn| {
            Box::pin(async move { templates::insert(conn, &template).await.map(Some) })
        })
        .await
        .unwrap();

    let input = RouteInput {
        route: Some("/shop/*".into()),
        template_name: Some("master".into()),
        slots: BTreeMap::from([(
            "body".to_string(),
            SlotDef {
                app_name: app_name.into(),
                kind: None,
                props: Default::default(),
            },
        )]),
        ..Default::default()
    };
    service
        .log_operation(ACTOR, EntityRef::create(EntityType::Routes), move |conn| {
            Box::pin(async move { routes::insert(conn, &input).await.map(Some) })
        })
        .await
        .unwrap()
}

async fn setup() -> (SqlitePool, VersioningService) {
    let pool = common::memory_pool().await;
    let service = VersioningService::new(pool.clone());
    (pool, service)
}

#[tokio::test]
async fn test_revert_update_restores_previous_state() {
    let (pool, service) = setup().await;

    create_app(&service, app("catalog")).await;
    let mut first = app("catalog");
    first.spa_bundle = "http://cdn.local/catalog-v2.js".into();
    update_app(&service, first).await;
    let mut second = app("catalog");
    second.spa_bundle = "http://cdn.local/catalog-v3.js".into();
    let update = update_app(&service, second).await;

    assert_eq!(
        apps::get(&pool, "catalog").await.unwrap().spa_bundle,
        "http://cdn.local/catalog-v3.js"
    );

    let reverted = service.revert_operation(ACTOR, update.version_id).await.unwrap();
    assert!(reverted.version_id > update.version_id);
    assert_eq!(reverted.entity_id, "catalog");
    assert_eq!(
        apps::get(&pool, "catalog").await.unwrap().spa_bundle,
        "http://cdn.local/catalog-v2.js"
    );
}

#[tokio::test]
async fn test_failed_mutation_rolls_back_change_and_version() {
    let (pool, service) = setup().await;

    let def = app("catalog");
    let err = service
        .log_operation(ACTOR, EntityRef::create(EntityType::Apps), move |conn| {
            Box::pin(async move {
                apps::insert(conn, &def).await?;
                Err::<Option<String>, _>(RegistryError::Versioning(
                    "mutation failed after insert".into(),
                ))
            })
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Versioning(_)), "{err}");

    assert!(matches!(
        apps::get(&pool, "catalog").await,
        Err(RegistryError::NotFound { .. })
    ));
    let (_, total) = service
        .list_versions(&VersionFilter::default(), Range::new(0, 24))
        .await
        .unwrap();
    assert_eq!(total, 0);
}

#[tokio::test]
async fn test_history_is_append_only() {
    let (_pool, service) = setup().await;

    let created = create_app(&service, app("catalog")).await;
    let mut changed = app("catalog");
    changed.props = serde_json::from_value(json!({ "title": "Catalog" })).unwrap();
    let update = update_app(&service, changed).await;
    let original = service.get_version(update.version_id).await.unwrap();

    service.revert_operation(ACTOR, update.version_id).await.unwrap();

    let filter = VersionFilter {
        entity_type: Some(EntityType::Apps),
        entity_id: Some("catalog".into()),
    };
    let (records, total) = service
        .list_versions(&filter, Range::new(0, 24))
        .await
        .unwrap();
    assert_eq!(total, 3);
    // Newest first.
    assert_eq!(records[2].id, created.version_id);
    assert!(records[2].data.is_none());
    assert_eq!(records[0].created_by, ACTOR);

    // The reverted record itself is untouched.
    assert_eq!(service.get_version(update.version_id).await.unwrap(), original);
    // The revert's "after" equals the update's "before".
    assert_eq!(
        records[0].data_after.as_ref().map(|s| &s.data),
        original.data.as_ref().map(|s| &s.data)
    );
}

#[tokio::test]
async fn test_revert_create_deletes_entity() {
    let (pool, service) = setup().await;

    let created = create_app(&service, app("catalog")).await;
    service.revert_operation(ACTOR, created.version_id).await.unwrap();

    assert!(matches!(
        apps::get(&pool, "catalog").await,
        Err(RegistryError::NotFound { .. })
    ));

    // The entity is already gone; reverting the create again has nothing to remove.
    let err = service
        .revert_operation(ACTOR, created.version_id)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::NonRevertable { .. }), "{err}");
}

#[tokio::test]
async fn test_revert_delete_recreates_route_with_slots() {
    let (pool, service) = setup().await;

    create_app(&service, app("shop")).await;
    let route = seed_route(&service, "shop").await;
    let route_id: i64 = route.entity_id.parse().unwrap();

    let deletion = delete(&service, EntityType::Routes, &route.entity_id).await;
    assert!(routes::get(&pool, route_id).await.is_err());

    service.revert_operation(ACTOR, deletion.version_id).await.unwrap();
    let restored = routes::get(&pool, route_id).await.unwrap();
    assert_eq!(restored.route.as_deref(), Some("/shop/*"));
    assert_eq!(restored.slots["body"].app_name, "shop");
}

#[tokio::test]
async fn test_revert_referencing_deleted_entity_is_non_revertable() {
    let (pool, service) = setup().await;

    create_app(&service, app("shop")).await;
    let route = seed_route(&service, "shop").await;
    let deletion = delete(&service, EntityType::Routes, &route.entity_id).await;
    delete(&service, EntityType::Apps, "shop").await;

    let before = service
        .list_versions(&VersionFilter::default(), Range::new(0, 99))
        .await
        .unwrap()
        .1;

    let err = service
        .revert_operation(ACTOR, deletion.version_id)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::NonRevertable { .. }), "{err}");

    // Nothing was written: no route, no new version.
    let route_id: i64 = route.entity_id.parse().unwrap();
    assert!(routes::get(&pool, route_id).await.is_err());
    let after = service
        .list_versions(&VersionFilter::default(), Range::new(0, 99))
        .await
        .unwrap()
        .1;
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_unknown_version() {
    let (_pool, service) = setup().await;

    assert!(matches!(
        service.revert_operation(ACTOR, 4242).await,
        Err(RegistryError::NonExistingVersion(4242))
    ));
    assert!(matches!(
        service.get_version(4242).await,
        Err(RegistryError::NonExistingVersion(4242))
    ));
}

#[tokio::test]
async fn test_secret_setting_is_redacted_and_revert_keeps_live_value() {
    let (pool, service) = setup().await;

    set_setting(&service, "authToken", json!("first-token")).await;
    let second = set_setting(&service, "authToken", json!("second-token")).await;

    let record = service.get_version(second.version_id).await.unwrap();
    let before = record.data.unwrap();
    let after = record.data_after.unwrap();
    assert_eq!(before.data["value"], json!("[SECRET]"));
    assert_eq!(after.data["value"], json!("[SECRET]"));

    service.revert_operation(ACTOR, second.version_id).await.unwrap();
    let live = settings::get(&pool, "authToken").await.unwrap();
    assert_eq!(live.value, json!("second-token"));
}

#[tokio::test]
async fn test_auth_entity_revert_keeps_secret_hash() {
    let (pool, service) = setup().await;

    let input = AuthEntityInput {
        identifier: "deployer".into(),
        secret: Some("deployer-secret".into()),
        role: AuthRole::Admin,
        ..Default::default()
    };
    let created = service
        .log_operation(ACTOR, EntityRef::create(EntityType::AuthEntities), move |conn| {
            Box::pin(async move { auth_entities::insert(conn, &input).await.map(Some) })
        })
        .await
        .unwrap();
    let id: i64 = created.entity_id.parse().unwrap();

    let demote = AuthEntityInput {
        identifier: "deployer".into(),
        secret: None,
        role: AuthRole::Readonly,
        ..Default::default()
    };
    let update = service
        .log_operation(
            ACTOR,
            EntityRef::new(EntityType::AuthEntities, created.entity_id.clone()),
            move |conn| {
                Box::pin(async move {
                    auth_entities::update(conn, id, &demote).await.map(|()| None)
                })
            },
        )
        .await
        .unwrap();

    let record = service.get_version(update.version_id).await.unwrap();
    assert_eq!(record.data.unwrap().data["secret"], json!("[SECRET]"));

    service.revert_operation(ACTOR, update.version_id).await.unwrap();
    assert_eq!(
        auth_entities::verify(&pool, "deployer", "deployer-secret")
            .await
            .unwrap(),
        Some(AuthRole::Admin)
    );

    // A deleted entity's secret was never stored, so it can not come back.
    let deletion = delete(&service, EntityType::AuthEntities, &created.entity_id).await;
    assert!(matches!(
        service.revert_operation(ACTOR, deletion.version_id).await,
        Err(RegistryError::NonRevertable { .. })
    ));
}
