//! Per-request configuration resolution.
//!
//! # Responsibilities
//! - Keep the registry snapshot behind a stale-while-revalidate cache
//! - Scope the snapshot to a hostname and compile its route table, once per
//!   snapshot and domain
//! - Turn a resolved route into a composition plan of fragment references
//!
//! # Design Decisions
//! - Compiled state is swapped atomically when a new snapshot is observed;
//!   readers holding the old one keep using it
//! - Unknown hostnames share one scope entry, so arbitrary `Host` values
//!   cannot grow the per-domain map

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cache::{CacheOptions, CacheStore, CacheWrapper, SystemClock};
use crate::error::{RegistryError, RegistryResult};
use crate::observability::metrics;
use crate::registry::model::{AppKind, ConfigView, JsonMap, RegistrySnapshot, SsrConfig};
use crate::registry::source::ConfigSource;
use crate::routing::{normalize_host, scope_snapshot, Resolution, RouteTable};

/// One slot of a resolved route, with its application's bundles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentRef {
    pub slot: String,
    pub app_name: String,
    pub kind: AppKind,
    pub spa_bundle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css_bundle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssr: Option<SsrConfig>,
    pub props: JsonMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapped_with: Option<String>,
}

/// What the SSR composer needs to render one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionPlan {
    pub route: Resolution,
    pub fragments: Vec<FragmentRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_500: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// Snapshot scoped to one domain, with its compiled table.
struct ScopedConfig {
    snapshot: RegistrySnapshot,
    view: ConfigView,
    table: RouteTable,
}

struct CompiledConfig {
    snapshot: Arc<RegistrySnapshot>,
    scopes: DashMap<String, Arc<ScopedConfig>>,
}

const NO_DOMAIN: &str = "";
const UNKNOWN_DOMAIN: &str = "\0unknown";

pub struct ConfigResolver {
    cache: CacheWrapper<(), Arc<RegistrySnapshot>>,
    compiled: ArcSwapOption<CompiledConfig>,
    source_label: String,
}

impl ConfigResolver {
    /// Resolver over `source` with an in-memory cache.
    pub fn new(source: Arc<dyn ConfigSource>, options: CacheOptions) -> Self {
        let source_label = source.describe();
        let cache = CacheWrapper::new(options, move |()| {
            let source = Arc::clone(&source);
            async move { source.fetch().await.map(Arc::new) }
        });
        Self {
            cache,
            compiled: ArcSwapOption::empty(),
            source_label,
        }
    }

    /// Resolver whose snapshot cache lives in `store`.
    pub fn with_store(
        source: Arc<dyn ConfigSource>,
        options: CacheOptions,
        store: Arc<dyn CacheStore<Arc<RegistrySnapshot>>>,
    ) -> Self {
        let source_label = source.describe();
        let cache = CacheWrapper::with_parts(
            options,
            move |()| {
                let source = Arc::clone(&source);
                async move { source.fetch().await.map(Arc::new) }
            },
            store,
            Arc::new(SystemClock),
        );
        Self {
            cache,
            compiled: ArcSwapOption::empty(),
            source_label,
        }
    }

    pub fn cache(&self) -> &CacheWrapper<(), Arc<RegistrySnapshot>> {
        &self.cache
    }

    /// Current unscoped snapshot.
    pub async fn snapshot(&self) -> RegistryResult<Arc<RegistrySnapshot>> {
        Ok(self.cache.get(()).await?.data)
    }

    /// Load the snapshot once so the first request does not pay for it.
    pub async fn warm_up(&self) -> RegistryResult<()> {
        let snapshot = self.snapshot().await?;
        tracing::info!(
            source = %self.source_label,
            apps = snapshot.apps.len(),
            routes = snapshot.routes.len(),
            "Registry configuration loaded"
        );
        Ok(())
    }

    /// Drop the cached snapshot; the next read reloads it.
    pub fn invalidate(&self) {
        self.cache.invalidate(&());
        tracing::debug!(source = %self.source_label, "Registry snapshot invalidated");
    }

    /// Public `/config` document for `domain`.
    pub async fn config_for(&self, domain: Option<&str>) -> RegistryResult<ConfigView> {
        Ok(self.scoped(domain).await?.view.clone())
    }

    /// Resolve `url` on `domain` to a composition plan.
    pub async fn resolve(&self, domain: Option<&str>, url: &str) -> RegistryResult<CompositionPlan> {
        let scoped = self.scoped(domain).await?;

        let route = match scoped.table.resolve(url) {
            Ok(route) => route,
            Err(e) => {
                metrics::record_resolution("no_match");
                return Err(e);
            }
        };
        metrics::record_resolution(if route.special_role.is_some() {
            "special"
        } else {
            "matched"
        });

        let snapshot = &scoped.snapshot;
        let mut fragments = Vec::with_capacity(route.slots.len());
        for (slot_name, slot) in &route.slots {
            let Some(app) = snapshot.apps.get(&slot.app_name) else {
                tracing::warn!(slot = %slot_name, app = %slot.app_name, "Slot references unknown app, skipped");
                continue;
            };
            let app = snapshot.effective_app(app);

            let mut props = app.props;
            props.extend(slot.props.clone());

            fragments.push(FragmentRef {
                slot: slot_name.clone(),
                app_name: app.name,
                kind: slot.kind.map(AppKind::from).unwrap_or(app.kind),
                spa_bundle: app.spa_bundle,
                css_bundle: app.css_bundle,
                ssr: app.ssr,
                props,
                wrapped_with: app.wrapped_with,
            });
        }

        let domain = domain.map(normalize_host);
        let template_500 = domain
            .as_deref()
            .and_then(|d| snapshot.router_domain(d))
            .and_then(|d| d.template_500.clone());

        Ok(CompositionPlan {
            route,
            fragments,
            template_500,
            domain,
        })
    }

    fn compiled_for(&self, snapshot: Arc<RegistrySnapshot>) -> Arc<CompiledConfig> {
        if let Some(current) = self.compiled.load_full() {
            if Arc::ptr_eq(&current.snapshot, &snapshot) {
                return current;
            }
        }

        let fresh = Arc::new(CompiledConfig {
            snapshot,
            scopes: DashMap::new(),
        });
        self.compiled.store(Some(Arc::clone(&fresh)));
        fresh
    }

    async fn scoped(&self, domain: Option<&str>) -> RegistryResult<Arc<ScopedConfig>> {
        let snapshot = self.snapshot().await?;
        let compiled = self.compiled_for(snapshot);

        let host = domain.map(normalize_host);
        let key = match host.as_deref() {
            None => NO_DOMAIN.to_string(),
            Some(h) if compiled.snapshot.router_domain(h).is_some() => h.to_string(),
            Some(_) => UNKNOWN_DOMAIN.to_string(),
        };

        if let Some(scoped) = compiled.scopes.get(&key) {
            return Ok(Arc::clone(scoped.value()));
        }

        let scoped_snapshot = scope_snapshot(&compiled.snapshot, host.as_deref());
        let table = RouteTable::compile(&scoped_snapshot.routes, &scoped_snapshot.special_routes)
            .map_err(|e| match e {
                RegistryError::Validation(errors) => RegistryError::Versioning(format!(
                    "stored routes do not compile: {}",
                    errors
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                )),
                other => other,
            })?;

        let scoped = Arc::new(ScopedConfig {
            view: ConfigView::from_scoped(&scoped_snapshot),
            snapshot: scoped_snapshot,
            table,
        });
        compiled.scopes.insert(key, Arc::clone(&scoped));
        Ok(scoped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::model::{AppDef, RouteDef, RouterDomainDef, SlotDef, SlotKind};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StaticSource {
        snapshot: RegistrySnapshot,
        fetches: AtomicU32,
    }

    #[async_trait]
    impl ConfigSource for StaticSource {
        async fn fetch(&self) -> RegistryResult<RegistrySnapshot> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.snapshot.clone())
        }

        fn describe(&self) -> String {
            "static".into()
        }
    }

    fn app(name: &str, kind: AppKind) -> AppDef {
        AppDef {
            name: name.into(),
            spa_bundle: format!("https://cdn/{name}.js"),
            css_bundle: None,
            dependencies: JsonMap::new(),
            props: json!({"color": "blue", "size": 1}).as_object().cloned().unwrap(),
            ssr_props: JsonMap::new(),
            ssr: None,
            kind,
            wrapped_with: None,
            l10n_manifest: None,
            discoverable: false,
            config_selector: Vec::new(),
        }
    }

    fn route(id: i64, pattern: &str, template: &str, domain: Option<&str>, slot_app: &str) -> RouteDef {
        RouteDef {
            route_id: id,
            route: pattern.into(),
            slots: BTreeMap::from([(
                "body".to_string(),
                SlotDef {
                    app_name: slot_app.into(),
                    kind: Some(SlotKind::Primary),
                    props: json!({"size": 2}).as_object().cloned().unwrap(),
                },
            )]),
            meta: JsonMap::new(),
            next: false,
            template: Some(template.into()),
            domain_id: domain.map(|_| 1),
            domain: domain.map(String::from),
            order_pos: id,
            version_id: None,
        }
    }

    fn resolver() -> (ConfigResolver, Arc<StaticSource>) {
        let mut snapshot = RegistrySnapshot::default();
        snapshot.apps.insert("home".into(), app("home", AppKind::Regular));
        snapshot.router_domains.push(RouterDomainDef {
            id: 1,
            domain_name: "a.com".into(),
            template_500: Some("a-500".into()),
            props: JsonMap::new(),
        });
        snapshot.routes.push(route(1, "/", "a-template", Some("a.com"), "home"));
        snapshot.routes.push(route(2, "/", "generic", None, "home"));
        snapshot.routes.push(route(3, "/ghost", "generic", None, "missing-app"));

        let source = Arc::new(StaticSource {
            snapshot,
            fetches: AtomicU32::new(0),
        });
        let resolver = ConfigResolver::new(source.clone(), CacheOptions::new("config", 60));
        (resolver, source)
    }

    #[tokio::test]
    async fn test_resolve_scopes_by_domain() {
        let (resolver, source) = resolver();

        let plan = resolver.resolve(Some("A.com:443"), "/").await.unwrap();
        assert_eq!(plan.route.template.as_deref(), Some("a-template"));
        assert_eq!(plan.domain.as_deref(), Some("a.com"));
        assert_eq!(plan.template_500.as_deref(), Some("a-500"));

        let plan = resolver.resolve(Some("b.com"), "/").await.unwrap();
        assert_eq!(plan.route.template.as_deref(), Some("generic"));

        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fragment_props_and_kind() {
        let (resolver, _) = resolver();
        let plan = resolver.resolve(None, "/?utm=1").await.unwrap();

        assert_eq!(plan.fragments.len(), 1);
        let body = &plan.fragments[0];
        assert_eq!(body.slot, "body");
        assert_eq!(body.kind, AppKind::Primary);
        assert_eq!(body.props["color"], "blue");
        assert_eq!(body.props["size"], 2, "slot props override app props");
    }

    #[tokio::test]
    async fn test_unknown_app_slot_is_skipped() {
        let (resolver, _) = resolver();
        let plan = resolver.resolve(None, "/ghost").await.unwrap();
        assert!(plan.fragments.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_reloads_snapshot() {
        let (resolver, source) = resolver();
        resolver.config_for(None).await.unwrap();
        resolver.invalidate();
        resolver.config_for(None).await.unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }
}
