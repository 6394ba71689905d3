//! Configuration loading from disk.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::RegistryConfig;
use crate::config::validation::validate_config;
use crate::error::FieldError;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
    Validation(Vec<FieldError>),
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<RegistryConfig, ConfigError> {
    resolve_config(Some(path), None)
}

/// Load `path` (or built-in defaults), apply an admin key override, then
/// validate the result.
pub fn resolve_config(
    path: Option<&Path>,
    api_key: Option<String>,
) -> Result<RegistryConfig, ConfigError> {
    let content = match path {
        Some(path) => fs::read_to_string(path)?,
        None => String::new(),
    };
    let mut config: RegistryConfig = toml::from_str(&content)?;
    if let Some(key) = api_key {
        config.admin.api_key = key;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}
