//! Bearer authentication for the admin API.
//!
//! The token is either the configured `admin.api_key` or an
//! `identifier:secret` pair stored in `auth_entities`. The resolved
//! identifier becomes the versioning actor.

use axum::{
    extract::{Request, State},
    http::{header, Method},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};

use crate::db::auth_entities::{self, AuthRole};
use crate::error::{RegistryError, RegistryResult};
use crate::http::server::AppState;

/// Actor name recorded for the master API key.
pub const ROOT_ACTOR: &str = "root";
/// Actor name recorded when authentication is disabled.
pub const ANONYMOUS_ACTOR: &str = "anonymous";

/// Authenticated caller, available to handlers as an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub identifier: String,
    pub role: AuthRole,
}

impl Actor {
    pub fn can_write(&self) -> bool {
        self.role == AuthRole::Admin
    }
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Compare digests so the comparison time does not depend on the key prefix.
fn matches_api_key(token: &str, api_key: &str) -> bool {
    !api_key.is_empty() && Sha256::digest(token.as_bytes()) == Sha256::digest(api_key.as_bytes())
}

async fn authenticate(state: &AppState, token: Option<&str>) -> RegistryResult<Actor> {
    let Some(token) = token else {
        if state.config.admin.require_auth {
            return Err(RegistryError::Unauthorized);
        }
        return Ok(Actor {
            identifier: ANONYMOUS_ACTOR.to_string(),
            role: AuthRole::Admin,
        });
    };

    if matches_api_key(token, &state.config.admin.api_key) {
        return Ok(Actor {
            identifier: ROOT_ACTOR.to_string(),
            role: AuthRole::Admin,
        });
    }

    let (identifier, secret) = token.split_once(':').ok_or(RegistryError::Unauthorized)?;
    match auth_entities::verify(&state.pool, identifier, secret).await? {
        Some(role) => Ok(Actor {
            identifier: identifier.to_string(),
            role,
        }),
        None => {
            tracing::warn!(identifier, "Rejected admin credentials");
            Err(RegistryError::Unauthorized)
        }
    }
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, RegistryError> {
    let token = bearer_token(&request).map(str::to_owned);
    let actor = authenticate(&state, token.as_deref()).await?;

    let read_only = matches!(*request.method(), Method::GET | Method::HEAD);
    if !read_only && !actor.can_write() {
        tracing::warn!(actor = %actor.identifier, method = %request.method(), "Read-only actor attempted a write");
        return Err(RegistryError::Forbidden);
    }

    request.extensions_mut().insert(actor);
    Ok(next.run(request).await)
}
