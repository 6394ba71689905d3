//! Shared utilities for integration tests.

#![allow(dead_code)]

use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use fragment_registry::config::RegistryConfig;
use fragment_registry::db;
use fragment_registry::http::{AppState, HttpServer};
use fragment_registry::lifecycle::{build_state, Shutdown};

pub const API_KEY: &str = "integration-test-admin-key";

/// Config for an isolated in-memory registry.
pub fn test_config() -> RegistryConfig {
    let mut config = RegistryConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.database.url = "sqlite::memory:".into();
    config.admin.api_key = API_KEY.into();
    config.observability.metrics_enabled = false;
    config
}

/// Pool over a fresh in-memory database with the schema applied.
pub async fn memory_pool() -> SqlitePool {
    db::connect(&test_config().database).await.unwrap()
}

/// A registry served on an ephemeral port.
pub struct TestRegistry {
    pub addr: SocketAddr,
    pub state: AppState,
    pub shutdown: Arc<Shutdown>,
    client: reqwest::Client,
}

impl TestRegistry {
    pub async fn start() -> Self {
        Self::start_with(test_config()).await
    }

    pub async fn start_with(config: RegistryConfig) -> Self {
        let state = build_state(config).await.unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let shutdown = Arc::new(Shutdown::new());
        let server = HttpServer::new(state.clone());
        let server_shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            server.run(listener, server_shutdown).await.unwrap();
        });

        Self {
            addr,
            state,
            shutdown,
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Unauthenticated request.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    /// Request carrying the master API key.
    pub fn admin(&self, method: Method, path: &str) -> RequestBuilder {
        self.request(method, path).bearer_auth(API_KEY)
    }

    pub async fn get_json(&self, path: &str) -> Value {
        let res = self.request(Method::GET, path).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK, "GET {path}");
        res.json().await.unwrap()
    }

    /// Admin POST that must succeed with 201; returns the body.
    pub async fn create(&self, path: &str, body: Value) -> Value {
        let res = self.admin(Method::POST, path).json(&body).send().await.unwrap();
        let status = res.status();
        let text = res.text().await.unwrap();
        assert_eq!(status, StatusCode::CREATED, "POST {path}: {text}");
        serde_json::from_str(&text).unwrap()
    }

    pub async fn seed_template(&self, name: &str) -> Value {
        self.create(
            "/api/v1/template",
            json!({ "name": name, "content": format!("<html><body>{name}</body></html>") }),
        )
        .await
    }

    pub async fn seed_app(&self, name: &str) -> Value {
        self.create(
            "/api/v1/app",
            json!({
                "name": name,
                "spaBundle": format!("http://cdn.local/{name}/app.js"),
                "kind": "primary",
                "props": { "source": "app" },
            }),
        )
        .await
    }

    /// Route `pattern` rendering `app` in slot `body` with `template`.
    pub async fn seed_route(&self, pattern: &str, app: &str, template: &str, extra: Value) -> Value {
        let mut body = json!({
            "route": pattern,
            "templateName": template,
            "slots": { "body": { "appName": app } },
        });
        if let (Some(target), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
            target.extend(extra.clone());
        }
        self.create("/api/v1/route", body).await
    }
}

impl Drop for TestRegistry {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}
