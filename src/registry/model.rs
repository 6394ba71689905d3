//! Registry configuration model.
//!
//! `RegistrySnapshot` is the complete, unscoped configuration as loaded from
//! storage or fetched from an upstream registry. `ConfigView` is the public
//! `/config` shape, produced after domain scoping.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub type JsonMap = Map<String, Value>;

/// Criticality tier of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AppKind {
    Primary,
    Essential,
    #[default]
    Regular,
    /// Wraps another application; never placed in a slot directly.
    Wrapper,
}

impl AppKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AppKind::Primary => "primary",
            AppKind::Essential => "essential",
            AppKind::Regular => "regular",
            AppKind::Wrapper => "wrapper",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "primary" => Some(AppKind::Primary),
            "essential" => Some(AppKind::Essential),
            "regular" => Some(AppKind::Regular),
            "wrapper" => Some(AppKind::Wrapper),
            _ => None,
        }
    }
}

/// Criticality tier of a slot. `None` on a slot means "inherit the app's".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotKind {
    Primary,
    Essential,
    Regular,
}

impl SlotKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SlotKind::Primary => "primary",
            SlotKind::Essential => "essential",
            SlotKind::Regular => "regular",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "primary" => Some(SlotKind::Primary),
            "essential" => Some(SlotKind::Essential),
            "regular" => Some(SlotKind::Regular),
            _ => None,
        }
    }
}

impl From<SlotKind> for AppKind {
    fn from(kind: SlotKind) -> Self {
        match kind {
            SlotKind::Primary => AppKind::Primary,
            SlotKind::Essential => AppKind::Essential,
            SlotKind::Regular => AppKind::Regular,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SsrConfig {
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDef {
    pub name: String,
    pub spa_bundle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css_bundle: Option<String>,
    #[serde(default)]
    pub dependencies: JsonMap,
    #[serde(default)]
    pub props: JsonMap,
    #[serde(default)]
    pub ssr_props: JsonMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssr: Option<SsrConfig>,
    #[serde(default)]
    pub kind: AppKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapped_with: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l10n_manifest: Option<String>,
    #[serde(default)]
    pub discoverable: bool,
    /// Shared-props entries merged under `props`.
    #[serde(default)]
    pub config_selector: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotDef {
    pub app_name: String,
    #[serde(default)]
    pub kind: Option<SlotKind>,
    #[serde(default)]
    pub props: JsonMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDef {
    pub route_id: i64,
    /// Pattern: exact path, `prefix/*`, or `*`.
    pub route: String,
    #[serde(default)]
    pub slots: BTreeMap<String, SlotDef>,
    #[serde(default)]
    pub meta: JsonMap,
    #[serde(default)]
    pub next: bool,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default)]
    pub order_pos: i64,
    #[serde(default)]
    pub version_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialRouteDef {
    pub route_id: i64,
    /// Role name, e.g. `"404"`.
    pub special_role: String,
    #[serde(default)]
    pub slots: BTreeMap<String, SlotDef>,
    #[serde(default)]
    pub meta: JsonMap,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default)]
    pub version_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedLibDef {
    pub name: String,
    pub spa_bundle: String,
    #[serde(default)]
    pub l10n_manifest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedPropsDef {
    pub name: String,
    #[serde(default)]
    pub props: JsonMap,
    #[serde(default)]
    pub ssr_props: JsonMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterDomainDef {
    pub id: i64,
    pub domain_name: String,
    #[serde(default)]
    pub template_500: Option<String>,
    #[serde(default)]
    pub props: JsonMap,
}

/// Unscoped registry configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
    pub apps: BTreeMap<String, AppDef>,
    /// Ordered by `orderPos`, then id.
    pub routes: Vec<RouteDef>,
    pub special_routes: Vec<SpecialRouteDef>,
    /// Effective global values of public settings.
    pub settings: JsonMap,
    /// Per-domain overrides of public settings, keyed by domain name.
    #[serde(default)]
    pub domain_settings: BTreeMap<String, JsonMap>,
    pub shared_libs: BTreeMap<String, SharedLibDef>,
    #[serde(default)]
    pub shared_props: BTreeMap<String, SharedPropsDef>,
    #[serde(default)]
    pub router_domains: Vec<RouterDomainDef>,
}

impl RegistrySnapshot {
    pub fn router_domain(&self, domain: &str) -> Option<&RouterDomainDef> {
        self.router_domains.iter().find(|d| d.domain_name == domain)
    }

    /// App props with the shared props named by `configSelector` merged
    /// underneath.
    pub fn effective_app(&self, app: &AppDef) -> AppDef {
        let mut effective = app.clone();
        if app.config_selector.is_empty() {
            return effective;
        }

        let mut props = JsonMap::new();
        let mut ssr_props = JsonMap::new();
        for name in &app.config_selector {
            match self.shared_props.get(name) {
                Some(shared) => {
                    props.extend(shared.props.clone());
                    ssr_props.extend(shared.ssr_props.clone());
                }
                None => tracing::warn!(app = %app.name, shared_props = %name, "Unknown shared props in configSelector"),
            }
        }
        props.extend(app.props.clone());
        ssr_props.extend(app.ssr_props.clone());
        effective.props = props;
        effective.ssr_props = ssr_props;
        effective
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicLib {
    pub spa_bundle: String,
    #[serde(default)]
    pub l10n_manifest: Option<String>,
}

/// Public `/config` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigView {
    pub apps: BTreeMap<String, AppDef>,
    pub routes: Vec<RouteDef>,
    pub special_routes: BTreeMap<String, SpecialRouteDef>,
    pub settings: JsonMap,
    pub shared_libs: BTreeMap<String, String>,
    pub dynamic_libs: BTreeMap<String, DynamicLib>,
}

impl ConfigView {
    /// Build the public document from an already scoped snapshot.
    pub fn from_scoped(snapshot: &RegistrySnapshot) -> Self {
        let apps = snapshot
            .apps
            .iter()
            .map(|(name, app)| (name.clone(), snapshot.effective_app(app)))
            .collect();

        let special_routes = snapshot
            .special_routes
            .iter()
            .map(|r| (r.special_role.clone(), r.clone()))
            .collect();

        let shared_libs = snapshot
            .shared_libs
            .iter()
            .map(|(name, lib)| (name.clone(), lib.spa_bundle.clone()))
            .collect();

        let dynamic_libs = snapshot
            .shared_libs
            .iter()
            .map(|(name, lib)| {
                (
                    name.clone(),
                    DynamicLib {
                        spa_bundle: lib.spa_bundle.clone(),
                        l10n_manifest: lib.l10n_manifest.clone(),
                    },
                )
            })
            .collect();

        Self {
            apps,
            routes: snapshot.routes.clone(),
            special_routes,
            settings: snapshot.settings.clone(),
            shared_libs,
            dynamic_libs,
        }
    }
}
