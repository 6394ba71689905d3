//! Versioned entity descriptors.
//!
//! Each entity type names its table, primary key and the related child
//! tables whose rows travel with it in a snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Configuration entities whose mutations are versioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Apps,
    Routes,
    Templates,
    SharedLibs,
    SharedProps,
    RouterDomains,
    Settings,
    AuthEntities,
}

/// Child table stored alongside its parent row.
#[derive(Debug)]
pub struct RelatedTable {
    pub table: &'static str,
    /// Column holding the parent's id.
    pub foreign_key: &'static str,
    /// Columns identifying a child row within its parent, used to recover
    /// redacted fields from the live row.
    pub key_columns: &'static [&'static str],
    pub columns: &'static [&'static str],
}

#[derive(Debug)]
pub struct EntitySchema {
    pub table: &'static str,
    pub id_column: &'static str,
    /// Whether the id column is an INTEGER rowid rather than a text name.
    pub integer_id: bool,
    pub columns: &'static [&'static str],
    pub related: &'static [RelatedTable],
}

const APPS: EntitySchema = EntitySchema {
    table: "apps",
    id_column: "name",
    integer_id: false,
    columns: &[
        "name",
        "spa_bundle",
        "css_bundle",
        "dependencies",
        "props",
        "ssr_props",
        "ssr",
        "kind",
        "wrapped_with",
        "l10n_manifest",
        "discoverable",
        "config_selector",
    ],
    related: &[],
};

const ROUTES: EntitySchema = EntitySchema {
    table: "routes",
    id_column: "id",
    integer_id: true,
    columns: &[
        "id",
        "route",
        "next",
        "template_name",
        "meta",
        "domain_id",
        "order_pos",
    ],
    related: &[RelatedTable {
        table: "route_slots",
        foreign_key: "route_id",
        key_columns: &["name"],
        columns: &["id", "route_id", "name", "app_name", "kind", "props"],
    }],
};

const TEMPLATES: EntitySchema = EntitySchema {
    table: "templates",
    id_column: "name",
    integer_id: false,
    columns: &["name", "content"],
    related: &[RelatedTable {
        table: "templates_localized",
        foreign_key: "template_name",
        key_columns: &["locale"],
        columns: &["template_name", "locale", "content"],
    }],
};

const SHARED_LIBS: EntitySchema = EntitySchema {
    table: "shared_libs",
    id_column: "name",
    integer_id: false,
    columns: &["name", "spa_bundle", "l10n_manifest", "admin_notes"],
    related: &[],
};

const SHARED_PROPS: EntitySchema = EntitySchema {
    table: "shared_props",
    id_column: "name",
    integer_id: false,
    columns: &["name", "props", "ssr_props"],
    related: &[],
};

const ROUTER_DOMAINS: EntitySchema = EntitySchema {
    table: "router_domains",
    id_column: "id",
    integer_id: true,
    columns: &["id", "domain_name", "template_500", "props"],
    related: &[],
};

const SETTINGS: EntitySchema = EntitySchema {
    table: "settings",
    id_column: "key",
    integer_id: false,
    columns: &["key", "value", "default", "scope", "secret"],
    related: &[RelatedTable {
        table: "settings_domain_value",
        foreign_key: "key",
        key_columns: &["domain_id"],
        columns: &["id", "key", "domain_id", "value"],
    }],
};

const AUTH_ENTITIES: EntitySchema = EntitySchema {
    table: "auth_entities",
    id_column: "id",
    integer_id: true,
    columns: &["id", "identifier", "secret", "provider", "role"],
    related: &[],
};

impl EntityType {
    pub const ALL: [EntityType; 8] = [
        EntityType::Apps,
        EntityType::Routes,
        EntityType::Templates,
        EntityType::SharedLibs,
        EntityType::SharedProps,
        EntityType::RouterDomains,
        EntityType::Settings,
        EntityType::AuthEntities,
    ];

    pub fn schema(self) -> &'static EntitySchema {
        match self {
            EntityType::Apps => &APPS,
            EntityType::Routes => &ROUTES,
            EntityType::Templates => &TEMPLATES,
            EntityType::SharedLibs => &SHARED_LIBS,
            EntityType::SharedProps => &SHARED_PROPS,
            EntityType::RouterDomains => &ROUTER_DOMAINS,
            EntityType::Settings => &SETTINGS,
            EntityType::AuthEntities => &AUTH_ENTITIES,
        }
    }

    pub fn as_str(self) -> &'static str {
        self.schema().table
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| format!("unknown entity type '{s}'"))
    }
}
