//! Route lookup and layered resolution.
//!
//! # Responsibilities
//! - Compile an ordered route list into a `RouteTable`
//! - Resolve a request URL by scanning routes in order
//! - Merge matched routes with default-fill semantics
//! - Fall back to the `404` special route when nothing terminal matches
//!
//! # Design Decisions
//! - Immutable after construction; shared by readers without locks
//! - First matched route wins every conflict; later `next` layers only
//!   fill gaps, key by key for `meta` and `slots`
//! - Reaching a terminal route without a template is a configuration
//!   defect, reported as `NoRouteMatch` rather than a request 404

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{RegistryError, RegistryResult};
use crate::registry::model::{JsonMap, RouteDef, SlotDef, SpecialRouteDef};
use crate::routing::matcher::PathMatcher;

/// Role of the special route used when no regular route terminates.
pub const NOT_FOUND_ROLE: &str = "404";

/// Merged outcome of resolving one URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub route_id: Option<i64>,
    pub route: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_role: Option<String>,
    pub slots: BTreeMap<String, SlotDef>,
    pub meta: JsonMap,
    pub template: Option<String>,
    pub base_path: String,
    pub req_url: String,
}

impl Resolution {
    fn fill_from_route(&mut self, route: &RouteDef) {
        self.route_id.get_or_insert(route.route_id);
        if self.route.is_none() {
            self.route = Some(route.route.clone());
        }
        if self.template.is_none() {
            self.template = route.template.clone();
        }
        fill_json(&mut self.meta, &route.meta);
        fill_slots(&mut self.slots, &route.slots);
    }

    fn fill_from_special(&mut self, special: &SpecialRouteDef) {
        self.route_id.get_or_insert(special.route_id);
        if self.special_role.is_none() {
            self.special_role = Some(special.special_role.clone());
        }
        if self.template.is_none() {
            self.template = special.template.clone();
        }
        fill_json(&mut self.meta, &special.meta);
        fill_slots(&mut self.slots, &special.slots);
    }
}

/// Copy keys missing from `target`; recurse into objects present on both sides.
fn fill_json(target: &mut JsonMap, source: &JsonMap) {
    for (key, value) in source {
        match target.get_mut(key) {
            None => {
                target.insert(key.clone(), value.clone());
            }
            Some(Value::Object(existing)) => {
                if let Value::Object(incoming) = value {
                    fill_json(existing, incoming);
                }
            }
            Some(_) => {}
        }
    }
}

fn fill_slots(target: &mut BTreeMap<String, SlotDef>, source: &BTreeMap<String, SlotDef>) {
    for (name, slot) in source {
        match target.get_mut(name) {
            None => {
                target.insert(name.clone(), slot.clone());
            }
            Some(existing) => {
                if existing.kind.is_none() {
                    existing.kind = slot.kind;
                }
                fill_json(&mut existing.props, &slot.props);
            }
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledRoute {
    def: RouteDef,
    matcher: PathMatcher,
}

/// Compiled, immutable route table for one domain scope.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<CompiledRoute>,
    not_found: Option<SpecialRouteDef>,
}

impl RouteTable {
    /// Compile `routes` in the given order.
    pub fn compile(routes: &[RouteDef], special_routes: &[SpecialRouteDef]) -> RegistryResult<Self> {
        let compiled = routes
            .iter()
            .map(|def| {
                PathMatcher::compile(&def.route)
                    .map(|matcher| CompiledRoute {
                        def: def.clone(),
                        matcher,
                    })
                    .map_err(|e| {
                        RegistryError::invalid(
                            "route",
                            format!("pattern '{}' does not compile: {}", def.route, e),
                        )
                    })
            })
            .collect::<RegistryResult<Vec<_>>>()?;

        let not_found = special_routes
            .iter()
            .find(|r| r.special_role == NOT_FOUND_ROLE)
            .cloned();

        Ok(Self {
            routes: compiled,
            not_found,
        })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Resolve `url` (path plus optional query) to a merged route.
    pub fn resolve(&self, url: &str) -> RegistryResult<Resolution> {
        let path = strip_query(url);
        let mut result = Resolution::default();

        for compiled in &self.routes {
            let Some(base_path) = compiled.matcher.base_path(path) else {
                continue;
            };

            result.fill_from_route(&compiled.def);
            if compiled.def.next {
                continue;
            }

            if result.template.is_none() {
                return Err(RegistryError::NoRouteMatch {
                    path: path.to_string(),
                    detail: format!(
                        "terminal route '{}' resolves no template",
                        compiled.def.route
                    ),
                });
            }

            result.base_path = base_path;
            result.req_url = url.to_string();
            return Ok(result);
        }

        let Some(special) = &self.not_found else {
            return Err(RegistryError::NoRouteMatch {
                path: path.to_string(),
                detail: "no terminal route and no 404 special route".to_string(),
            });
        };

        let mut fallback = Resolution::default();
        fallback.fill_from_special(special);
        if fallback.template.is_none() {
            return Err(RegistryError::NoRouteMatch {
                path: path.to_string(),
                detail: "404 special route resolves no template".to_string(),
            });
        }
        fallback.base_path = path.to_string();
        fallback.req_url = url.to_string();
        Ok(fallback)
    }
}

fn strip_query(url: &str) -> &str {
    match url.find(|c| c == '?' || c == '#') {
        Some(idx) => &url[..idx],
        None => url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::model::SlotKind;
    use serde_json::json;

    fn route(id: i64, pattern: &str, next: bool, template: Option<&str>, meta: Value) -> RouteDef {
        RouteDef {
            route_id: id,
            route: pattern.into(),
            slots: BTreeMap::new(),
            meta: meta.as_object().cloned().unwrap_or_default(),
            next,
            template: template.map(String::from),
            domain_id: None,
            domain: None,
            order_pos: id,
            version_id: None,
        }
    }

    fn not_found(template: Option<&str>) -> SpecialRouteDef {
        SpecialRouteDef {
            route_id: 99,
            special_role: NOT_FOUND_ROLE.into(),
            slots: BTreeMap::new(),
            meta: JsonMap::new(),
            template: template.map(String::from),
            domain_id: None,
            domain: None,
            version_id: None,
        }
    }

    fn slot(app: &str, kind: Option<SlotKind>, props: Value) -> SlotDef {
        SlotDef {
            app_name: app.into(),
            kind,
            props: props.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_first_match_wins_over_layer() {
        let table = RouteTable::compile(
            &[
                route(1, "/a", false, Some("T1"), json!({})),
                route(2, "*", true, Some("T2"), json!({})),
            ],
            &[],
        )
        .unwrap();

        let res = table.resolve("/a").unwrap();
        assert_eq!(res.template.as_deref(), Some("T1"));
        assert_eq!(res.route_id, Some(1));
        assert_eq!(res.base_path, "/a");
        assert_eq!(res.req_url, "/a");
    }

    #[test]
    fn test_layering_route_fills_gaps() {
        let table = RouteTable::compile(
            &[
                route(1, "/a", true, None, json!({"x": 1})),
                route(2, "*", false, Some("T"), json!({"y": 2})),
            ],
            &[],
        )
        .unwrap();

        let res = table.resolve("/a").unwrap();
        assert_eq!(res.template.as_deref(), Some("T"));
        assert_eq!(serde_json::Value::Object(res.meta), json!({"x": 1, "y": 2}));
        assert_eq!(res.route.as_deref(), Some("/a"));
        assert_eq!(res.base_path, "/a", "basePath comes from the terminal route");
    }

    #[test]
    fn test_layer_does_not_override_earlier_meta() {
        let table = RouteTable::compile(
            &[
                route(1, "*", true, None, json!({"title": "Site", "seo": {"index": true}})),
                route(2, "/news/*", false, Some("news"), json!({"title": "News", "seo": {"lang": "en"}})),
            ],
            &[],
        )
        .unwrap();

        let res = table.resolve("/news/today?page=2").unwrap();
        assert_eq!(res.meta["title"], "Site");
        assert_eq!(res.meta["seo"], json!({"index": true, "lang": "en"}));
        assert_eq!(res.base_path, "/news");
        assert_eq!(res.req_url, "/news/today?page=2");
    }

    #[test]
    fn test_slots_are_filled_per_slot() {
        let mut layer = route(1, "*", true, None, json!({}));
        layer.slots.insert("navbar".into(), slot("navbar", Some(SlotKind::Essential), json!({"a": 1})));
        layer.slots.insert("body".into(), slot("home", None, json!({"b": 1})));

        let mut terminal = route(2, "/", false, Some("master"), json!({}));
        terminal.slots.insert("body".into(), slot("landing", Some(SlotKind::Primary), json!({"c": 1})));

        let table = RouteTable::compile(&[layer, terminal], &[]).unwrap();
        let res = table.resolve("/").unwrap();

        assert_eq!(res.slots.len(), 2);
        assert_eq!(res.slots["navbar"].app_name, "navbar");
        // Earlier layer owns "body"; the terminal route only fills its gaps.
        assert_eq!(res.slots["body"].app_name, "home");
        assert_eq!(res.slots["body"].kind, Some(SlotKind::Primary));
        assert_eq!(res.slots["body"].props["b"], 1);
        assert_eq!(res.slots["body"].props["c"], 1);
    }

    #[test]
    fn test_falls_back_to_404_special_route() {
        let table = RouteTable::compile(
            &[route(1, "/only", false, Some("T"), json!({}))],
            &[not_found(Some("404-template"))],
        )
        .unwrap();

        let res = table.resolve("/missing").unwrap();
        assert_eq!(res.template.as_deref(), Some("404-template"));
        assert_eq!(res.special_role.as_deref(), Some("404"));
        assert_eq!(res.req_url, "/missing");
    }

    #[test]
    fn test_no_match_without_404_is_an_error() {
        let table =
            RouteTable::compile(&[route(1, "/only", false, Some("T"), json!({}))], &[]).unwrap();

        match table.resolve("/missing") {
            Err(RegistryError::NoRouteMatch { path, .. }) => assert_eq!(path, "/missing"),
            other => panic!("expected NoRouteMatch, got {:?}", other),
        }
    }

    #[test]
    fn test_terminal_route_without_template_is_an_error() {
        let table = RouteTable::compile(
            &[
                route(1, "*", true, None, json!({})),
                route(2, "/a", false, None, json!({})),
            ],
            &[not_found(Some("404"))],
        )
        .unwrap();

        assert!(matches!(
            table.resolve("/a"),
            Err(RegistryError::NoRouteMatch { .. })
        ));
    }

    #[test]
    fn test_layer_only_chain_falls_through_to_404() {
        let table = RouteTable::compile(
            &[route(1, "*", true, Some("layered"), json!({"x": 1}))],
            &[not_found(Some("404-template"))],
        )
        .unwrap();

        let res = table.resolve("/anything").unwrap();
        assert_eq!(res.template.as_deref(), Some("404-template"));
        assert!(res.meta.is_empty(), "404 fallback starts from an empty result");
    }
}
