//! Domain scoping of registry entities.
//!
//! # Responsibilities
//! - Narrow domain-taggable entities to the requesting hostname
//! - Apply per-domain setting overrides
//!
//! # Design Decisions
//! - All-or-nothing: if any entity is tagged for the domain, untagged
//!   entities are dropped entirely, never mixed in
//! - A declared domain of `*` counts as tagged for every domain
//! - Filters are a closed enum, each kind a pure function

use crate::registry::model::{RegistrySnapshot, RouteDef, SpecialRouteDef};
use crate::routing::matcher::normalize_host;

/// Declared domain that applies to every requested domain.
pub const ANY_DOMAIN: &str = "*";

/// An entity that may be tagged with a domain.
pub trait DomainScoped {
    fn declared_domain(&self) -> Option<&str>;
}

impl DomainScoped for RouteDef {
    fn declared_domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }
}

impl DomainScoped for SpecialRouteDef {
    fn declared_domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }
}

/// Keep the entities tagged for `domain` if there are any, otherwise the
/// untagged ones. Order is preserved.
///
/// Without a requested domain only `*`-tagged entities count as tagged.
pub fn filter_by_domain<T: DomainScoped + Clone>(nodes: &[T], domain: Option<&str>) -> Vec<T> {
    let domain = domain.map(normalize_host);

    let mut with_domain = Vec::new();
    let mut without_domain = Vec::new();
    for node in nodes {
        match node.declared_domain() {
            None => without_domain.push(node.clone()),
            Some(declared) => {
                let applies = declared == ANY_DOMAIN
                    || domain
                        .as_deref()
                        .is_some_and(|d| normalize_host(declared) == d);
                if applies {
                    with_domain.push(node.clone());
                }
            }
        }
    }

    if !with_domain.is_empty() {
        with_domain
    } else {
        without_domain
    }
}

/// Kinds of domain-sensitive data in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeFilter {
    Routes,
    SpecialRoutes,
    Settings,
}

impl ScopeFilter {
    pub const ALL: [ScopeFilter; 3] = [
        ScopeFilter::Routes,
        ScopeFilter::SpecialRoutes,
        ScopeFilter::Settings,
    ];

    pub fn apply(self, snapshot: &mut RegistrySnapshot, domain: Option<&str>) {
        match self {
            ScopeFilter::Routes => {
                snapshot.routes = filter_by_domain(&snapshot.routes, domain);
            }
            ScopeFilter::SpecialRoutes => {
                snapshot.special_routes = filter_by_domain(&snapshot.special_routes, domain);
            }
            ScopeFilter::Settings => {
                let overrides = domain
                    .map(normalize_host)
                    .and_then(|d| snapshot.domain_settings.get(&d).cloned());
                if let Some(overrides) = overrides {
                    snapshot.settings.extend(overrides);
                }
            }
        }
    }
}

/// Copy of `snapshot` with every filter applied for `domain`.
pub fn scope_snapshot(snapshot: &RegistrySnapshot, domain: Option<&str>) -> RegistrySnapshot {
    let mut scoped = snapshot.clone();
    for filter in ScopeFilter::ALL {
        filter.apply(&mut scoped, domain);
    }
    scoped.domain_settings.clear();
    scoped
}
