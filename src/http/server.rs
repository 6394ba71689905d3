//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the public and admin handlers
//! - Wire up middleware (request ID, tracing, limits, timeout, metrics)
//! - Serve on a bound listener until shutdown is triggered

use axum::{
    body::Body,
    http::Request,
    middleware,
    routing::get,
    Router,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin;
use crate::config::RegistryConfig;
use crate::http::config_api;
use crate::http::request::request_id;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::registry::ConfigResolver;
use crate::versioning::VersioningService;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RegistryConfig>,
    pub pool: SqlitePool,
    pub resolver: Arc<ConfigResolver>,
    pub versioning: VersioningService,
}

/// HTTP server for the registry.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        Self {
            router: Self::build_router(state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState) -> Router {
        let config = Arc::clone(&state.config);

        let public = Router::new()
            .route("/ping", get(config_api::ping))
            .route("/api/v1/config", get(config_api::get_config))
            .route("/api/v1/config/snapshot", get(config_api::get_snapshot))
            .route("/api/v1/resolve", get(config_api::resolve))
            .route(
                "/api/v1/template/{name}/rendered",
                get(config_api::rendered_template),
            );

        let stack = ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = %request_id(request.headers()),
                    )
                }),
            )
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(GlobalConcurrencyLimitLayer::new(config.listener.max_connections))
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)));

        public
            .merge(admin::router(state.clone()))
            .with_state(state)
            .layer(middleware::from_fn(metrics::track_metrics))
            .layer(stack)
    }

    /// Router without a listener, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` triggers, then drain.
    pub async fn run(self, listener: TcpListener, shutdown: Arc<Shutdown>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown.wait())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
