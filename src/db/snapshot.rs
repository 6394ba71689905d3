//! Assemble a `RegistrySnapshot` from the tables.

use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::db::routes::RouteRecord;
use crate::db::{apps, router_domains, routes, settings, shared_libs, shared_props, Range};
use crate::error::RegistryResult;
use crate::registry::model::{RegistrySnapshot, RouteDef, SpecialRouteDef};
use crate::versioning::EntityType;

/// Latest version id per route id.
async fn route_versions(pool: &SqlitePool) -> RegistryResult<HashMap<String, i64>> {
    let rows = sqlx::query(
        "SELECT entity_id, MAX(id) AS version_id FROM versioning \
         WHERE entity_type = ? GROUP BY entity_id",
    )
    .bind(EntityType::Routes.as_str())
    .fetch_all(pool)
    .await?;

    let mut versions = HashMap::with_capacity(rows.len());
    for row in &rows {
        versions.insert(row.try_get("entity_id")?, row.try_get("version_id")?);
    }
    Ok(versions)
}

pub async fn load_snapshot(pool: &SqlitePool) -> RegistryResult<RegistrySnapshot> {
    let all = Range::default();

    let (app_list, _) = apps::list(pool, all).await?;
    let (domains, _) = router_domains::list(pool, all).await?;
    let (route_records, _) = routes::list(pool, all).await?;
    let (lib_list, _) = shared_libs::list(pool, all).await?;
    let (props_list, _) = shared_props::list(pool, all).await?;
    let (settings, domain_settings) = settings::public_values(pool).await?;
    let versions = route_versions(pool).await?;

    let domain_names: HashMap<i64, String> = domains
        .iter()
        .map(|d| (d.id, d.domain_name.clone()))
        .collect();

    let mut snapshot = RegistrySnapshot {
        apps: app_list.into_iter().map(|a| (a.name.clone(), a)).collect(),
        settings,
        domain_settings,
        shared_libs: lib_list.into_iter().map(|l| (l.name.clone(), l)).collect(),
        shared_props: props_list.into_iter().map(|p| (p.name.clone(), p)).collect(),
        router_domains: domains,
        ..Default::default()
    };

    for record in route_records {
        let RouteRecord {
            id,
            route,
            special_role,
            next,
            template_name,
            slots,
            meta,
            domain_id,
            order_pos,
        } = record;

        let domain = domain_id.and_then(|d| domain_names.get(&d).cloned());
        let version_id = versions.get(&id.to_string()).map(|v| v.to_string());

        match (route, special_role) {
            (_, Some(special_role)) => snapshot.special_routes.push(SpecialRouteDef {
                route_id: id,
                special_role,
                slots,
                meta,
                template: template_name,
                domain_id,
                domain,
                version_id,
            }),
            (Some(route), None) => snapshot.routes.push(RouteDef {
                route_id: id,
                route,
                slots,
                meta,
                next,
                template: template_name,
                domain_id,
                domain,
                order_pos,
                version_id,
            }),
            (None, None) => {
                tracing::warn!(route_id = id, "Route without pattern skipped");
            }
        }
    }

    tracing::debug!(
        apps = snapshot.apps.len(),
        routes = snapshot.routes.len(),
        special_routes = snapshot.special_routes.len(),
        "Registry snapshot loaded"
    );
    Ok(snapshot)
}
