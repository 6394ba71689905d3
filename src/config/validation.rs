//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Refuse the placeholder admin key while auth is required
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Pure function: RegistryConfig → Result<(), Vec<FieldError>>

use std::net::SocketAddr;
use url::Url;

use crate::config::schema::RegistryConfig;
use crate::error::FieldError;

const PLACEHOLDER_KEY: &str = "CHANGE_ME_IN_PRODUCTION";
const MIN_KEY_LEN: usize = 16;

pub fn validate_config(config: &RegistryConfig) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(FieldError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(FieldError::new("listener.max_connections", "must be > 0"));
    }

    if !config.database.url.starts_with("sqlite:") {
        errors.push(FieldError::new("database.url", "must be a sqlite: URL"));
    }
    if config.database.max_connections == 0 {
        errors.push(FieldError::new("database.max_connections", "must be > 0"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(FieldError::new("timeouts.request_secs", "must be > 0"));
    }
    if config.timeouts.upstream_secs == 0 {
        errors.push(FieldError::new("timeouts.upstream_secs", "must be > 0"));
    }

    if let Some(registry_url) = &config.upstream.registry_url {
        match Url::parse(registry_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => errors.push(FieldError::new(
                "upstream.registry_url",
                "must be an http(s) URL",
            )),
        }
    }

    if config.admin.require_auth {
        if config.admin.api_key == PLACEHOLDER_KEY {
            errors.push(FieldError::new(
                "admin.api_key",
                "placeholder key must be replaced",
            ));
        } else if config.admin.api_key.len() < MIN_KEY_LEN {
            errors.push(FieldError::new(
                "admin.api_key",
                format!("must be at least {MIN_KEY_LEN} characters"),
            ));
        }
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(FieldError::new(
            "observability.metrics_address",
            "is not a socket address",
        ));
    }

    if config.security.max_body_size == 0 {
        errors.push(FieldError::new("security.max_body_size", "must be > 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
