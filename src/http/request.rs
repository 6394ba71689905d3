//! Request metadata shared by the public and admin APIs.
//!
//! # Responsibilities
//! - Name the request id header set by `tower_http::request_id`
//! - Work out which domain a config request is asking about
//!
//! # Design Decisions
//! - `X-Request-Host` wins: it is what a fronting proxy or SSR renderer sets
//! - `Host` is only trusted when the deployment says so, since clients
//!   reaching the registry directly all share one hostname

use axum::{
    extract::{FromRequestParts, Query},
    http::{header, request::Parts, HeaderMap},
};
use serde::Deserialize;
use std::convert::Infallible;

use crate::http::server::AppState;
use crate::routing::matcher::normalize_host;

pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_REQUEST_HOST: &str = "x-request-host";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DomainQuery {
    domain_name: Option<String>,
}

fn header_str<'a>(headers: &'a HeaderMap, name: impl header::AsHeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Normalized domain of a request, if any was supplied.
pub fn request_domain(
    headers: &HeaderMap,
    query_domain: Option<&str>,
    trust_host: bool,
) -> Option<String> {
    let host_header = trust_host
        .then(|| header_str(headers, header::HOST))
        .flatten();

    header_str(headers, X_REQUEST_HOST)
        .or(query_domain)
        .or(host_header)
        .map(normalize_host)
        .filter(|d| !d.is_empty())
}

/// Extractor for the request domain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestDomain(pub Option<String>);

impl RequestDomain {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl FromRequestParts<AppState> for RequestDomain {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let query = Query::<DomainQuery>::try_from_uri(&parts.uri)
            .map(|Query(q)| q)
            .unwrap_or_default();

        Ok(RequestDomain(request_domain(
            &parts.headers,
            query.domain_name.as_deref(),
            state.config.api.trust_host_header,
        )))
    }
}

/// Request id of the current request, or `"unknown"`.
pub fn request_id(headers: &HeaderMap) -> &str {
    header_str(headers, X_REQUEST_ID).unwrap_or("unknown")
}
