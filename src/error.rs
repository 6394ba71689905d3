//! Error taxonomy for the registry.
//!
//! Every fallible operation in the crate returns [`RegistryResult`]. Request
//! handlers return it directly; the [`IntoResponse`] impl below decides the
//! HTTP status and the structured body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::cache::CacheRefreshError;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Errors produced by the registry core and its HTTP surface.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No terminal route matched and no 404 special route exists, or a
    /// terminal route was reached without a template. Operator-facing.
    #[error("No route match for '{path}': {detail}")]
    NoRouteMatch { path: String, detail: String },

    /// Malformed mutation input, rejected before any transaction opens.
    #[error("Validation failed: {}", join_fields(.0))]
    Validation(Vec<FieldError>),

    /// Referenced entity does not exist.
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// Foreign key constraint violated by a write.
    #[error("Foreign key constraint violated: {0}")]
    ForeignConstraint(String),

    /// Unique constraint violated by a write.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Any other storage failure.
    #[error("Database error: {0}")]
    Db(#[source] sqlx::Error),

    /// Snapshot or column payload could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Version {0} does not exist")]
    NonExistingVersion(i64),

    #[error("Version can not be reverted: {reason}")]
    NonRevertable { reason: String },

    #[error("Versioning error: {0}")]
    Versioning(String),

    /// A refresh failed and nothing was cached for the key yet.
    #[error(transparent)]
    CacheRefresh(#[from] CacheRefreshError),

    #[error("Upstream registry error: {0}")]
    Upstream(String),

    /// Runtime configuration cannot be used, e.g. a malformed upstream URL.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing or invalid credentials")]
    Unauthorized,

    #[error("Credentials do not allow this operation")]
    Forbidden,
}

/// Result type used throughout the registry.
pub type RegistryResult<T> = Result<T, RegistryError>;

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl RegistryError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    pub fn non_revertable(reason: impl Into<String>) -> Self {
        Self::NonRevertable {
            reason: reason.into(),
        }
    }

    /// HTTP status this error maps to at the request boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound { .. } | Self::NonExistingVersion(_) => StatusCode::NOT_FOUND,
            Self::NonRevertable { .. } => StatusCode::BAD_REQUEST,
            Self::ForeignConstraint(_) | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::CacheRefresh(_) | Self::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::NoRouteMatch { .. }
            | Self::Db(_)
            | Self::Serialization(_)
            | Self::Versioning(_)
            | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::NoRouteMatch { .. } => "NO_ROUTE_MATCH",
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::ForeignConstraint(_) => "FOREIGN_CONSTRAINT",
            Self::Conflict(_) => "CONFLICT",
            Self::Db(_) => "DB_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::NonExistingVersion(_) => "NON_EXISTING_VERSION",
            Self::NonRevertable { .. } => "NON_REVERTABLE",
            Self::Versioning(_) => "VERSIONING_ERROR",
            Self::CacheRefresh(_) => "CACHE_REFRESH_FAILED",
            Self::Upstream(_) => "UPSTREAM_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
        }
    }
}

impl From<sqlx::Error> for RegistryError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind;

        if let Some(db_err) = err.as_database_error() {
            match db_err.kind() {
                ErrorKind::ForeignKeyViolation => {
                    return Self::ForeignConstraint(db_err.message().to_string())
                }
                ErrorKind::UniqueViolation => return Self::Conflict(db_err.message().to_string()),
                _ => {}
            }
        }
        Self::Db(err)
    }
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        let body = match &self {
            Self::Validation(errors) => json!({
                "error": self.code(),
                "message": "Validation failed",
                "errors": errors,
            }),
            Self::NonRevertable { reason } => json!({
                "error": self.code(),
                "reason": reason,
            }),
            // Storage details stay in the logs.
            Self::Db(_) => json!({
                "error": self.code(),
                "message": "Database operation failed",
            }),
            _ => json!({
                "error": self.code(),
                "message": self.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RegistryError::Validation(vec![
            FieldError::new("name", "must not be empty"),
            FieldError::new("spaBundle", "must be a URL"),
        ]);
        assert_eq!(
            err.to_string(),
            "Validation failed: name: must not be empty, spaBundle: must be a URL"
        );

        let err = RegistryError::not_found("app", "navbar");
        assert_eq!(err.to_string(), "app 'navbar' not found");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            RegistryError::non_revertable("gone").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RegistryError::NonExistingVersion(7).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            RegistryError::invalid("route", "bad").status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            RegistryError::NoRouteMatch {
                path: "/".into(),
                detail: "none".into()
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
