//! HTTP surface tests against a registry on an ephemeral port.

mod common;

use reqwest::{header, Method, StatusCode};
use serde_json::{json, Value};

use common::{test_config, TestRegistry};

fn content_range(res: &reqwest::Response) -> String {
    res.headers()
        .get(header::CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn test_ping_carries_request_id() {
    let registry = TestRegistry::start().await;

    let res = registry
        .request(Method::GET, "/ping")
        .header("x-request-id", "trace-me")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-request-id"], "trace-me");
    assert_eq!(res.json::<Value>().await.unwrap(), json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_admin_requires_credentials() {
    let registry = TestRegistry::start().await;

    let res = registry.request(Method::GET, "/api/v1/app").send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = registry
        .request(Method::GET, "/api/v1/app")
        .bearer_auth("not-the-key")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Public reads stay open.
    let res = registry.request(Method::GET, "/api/v1/config").send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_readonly_entity_can_read_but_not_write() {
    let registry = TestRegistry::start().await;

    let created = registry
        .create(
            "/api/v1/auth_entities",
            json!({ "identifier": "viewer", "secret": "viewer-secret", "role": "readonly" }),
        )
        .await;
    assert_eq!(created["secret"], json!("[SECRET]"));

    let res = registry
        .request(Method::GET, "/api/v1/app")
        .bearer_auth("viewer:viewer-secret")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = registry
        .request(Method::POST, "/api/v1/template")
        .bearer_auth("viewer:viewer-secret")
        .json(&json!({ "name": "master", "content": "<html></html>" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = registry
        .request(Method::GET, "/api/v1/app")
        .bearer_auth("viewer:wrong-secret")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_app_crud_with_content_range() {
    let registry = TestRegistry::start().await;

    registry.seed_app("alpha").await;
    registry.seed_app("beta").await;
    registry.seed_app("gamma").await;

    let res = registry
        .admin(Method::GET, "/api/v1/app")
        .query(&[("range", "[0,1]")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(content_range(&res), "app 0-1/3");
    let page: Vec<Value> = res.json().await.unwrap();
    assert_eq!(page.len(), 2);

    let res = registry
        .admin(Method::PUT, "/api/v1/app/beta")
        .json(&json!({ "name": "beta", "spaBundle": "http://cdn.local/beta/v2.js" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let updated: Value = res.json().await.unwrap();
    assert_eq!(updated["spaBundle"], json!("http://cdn.local/beta/v2.js"));

    let res = registry
        .admin(Method::DELETE, "/api/v1/app/gamma")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = registry
        .admin(Method::GET, "/api/v1/app/gamma")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let config = registry.get_json("/api/v1/config").await;
    let apps = config["apps"].as_object().unwrap();
    assert!(apps.contains_key("alpha"));
    assert!(!apps.contains_key("gamma"));
    assert_eq!(apps["beta"]["spaBundle"], json!("http://cdn.local/beta/v2.js"));
}

#[tokio::test]
async fn test_mutation_errors() {
    let registry = TestRegistry::start().await;
    registry.seed_template("master").await;
    registry.seed_app("shop").await;

    // Malformed input.
    let res = registry
        .admin(Method::POST, "/api/v1/route")
        .json(&json!({ "route": "no-leading-slash", "templateName": "master" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // Slot pointing at a missing app.
    let res = registry
        .admin(Method::POST, "/api/v1/route")
        .json(&json!({
            "route": "/missing",
            "templateName": "master",
            "slots": { "body": { "appName": "ghost" } },
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // Duplicate name.
    let res = registry
        .admin(Method::POST, "/api/v1/app")
        .json(&json!({ "name": "shop", "spaBundle": "http://cdn.local/shop.js" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // Deleting an app a route still uses.
    registry.seed_route("/shop/*", "shop", "master", json!({})).await;
    let res = registry
        .admin(Method::DELETE, "/api/v1/app/shop")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_resolve_route_and_404_fallback() {
    let registry = TestRegistry::start().await;
    registry.seed_template("master").await;
    registry.seed_template("not-found").await;
    registry.seed_app("shop").await;
    registry.seed_app("navbar").await;

    registry
        .create(
            "/api/v1/route",
            json!({
                "route": "*",
                "next": true,
                "slots": { "navbar": { "appName": "navbar" } },
            }),
        )
        .await;
    registry
        .seed_route("/shop/*", "shop", "master", json!({ "meta": { "section": "shop" } }))
        .await;

    // No 404 route yet: an unmatched URL is an error.
    let res = registry
        .request(Method::GET, "/api/v1/resolve")
        .query(&[("url", "/elsewhere")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let plan: Value = registry
        .request(Method::GET, "/api/v1/resolve")
        .query(&[("url", "/shop/item/42?ref=mail")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(plan["route"]["template"], json!("master"));
    assert_eq!(plan["route"]["route"], json!("*"));
    assert_eq!(plan["route"]["reqUrl"], json!("/shop/item/42?ref=mail"));
    assert_eq!(plan["route"]["meta"]["section"], json!("shop"));
    let slots: Vec<&str> = plan["fragments"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["slot"].as_str().unwrap())
        .collect();
    assert_eq!(slots, vec!["body", "navbar"]);
    assert_eq!(plan["fragments"][0]["props"]["source"], json!("app"));

    registry
        .create(
            "/api/v1/route",
            json!({ "specialRole": "404", "templateName": "not-found" }),
        )
        .await;

    let plan: Value = registry
        .request(Method::GET, "/api/v1/resolve")
        .query(&[("url", "/elsewhere")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(plan["route"]["specialRole"], json!("404"));
    assert_eq!(plan["route"]["template"], json!("not-found"));
    assert_eq!(plan["route"]["basePath"], json!("/elsewhere"));
}

#[tokio::test]
async fn test_domain_scoped_config() {
    let registry = TestRegistry::start().await;
    registry.seed_template("master").await;
    registry.seed_app("generic").await;
    registry.seed_app("branded").await;

    let domain = registry
        .create(
            "/api/v1/router_domains",
            json!({ "domainName": "Shop.Example.com", "props": { "brand": "shop" } }),
        )
        .await;
    let domain_id = domain["id"].as_i64().unwrap();

    registry.seed_route("/", "generic", "master", json!({})).await;
    registry
        .seed_route("/", "branded", "master", json!({ "domainId": domain_id }))
        .await;

    let res = registry
        .admin(Method::PUT, &format!("/api/v1/settings/baseUrl/domain/{domain_id}"))
        .json(&json!({ "value": "https://shop.example.com/" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let route_apps = |config: &Value| -> Vec<String> {
        config["routes"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["slots"]["body"]["appName"].as_str().unwrap().to_string())
            .collect()
    };

    let generic = registry.get_json("/api/v1/config").await;
    assert_eq!(route_apps(&generic), vec!["generic"]);
    assert_eq!(generic["settings"]["baseUrl"], json!("http://localhost:8233/"));

    let scoped: Value = registry
        .request(Method::GET, "/api/v1/config")
        .header("x-request-host", "shop.example.com:443")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(route_apps(&scoped), vec!["branded"]);
    assert_eq!(scoped["settings"]["baseUrl"], json!("https://shop.example.com/"));

    // The query parameter names the domain too.
    let by_query = registry
        .get_json("/api/v1/config?domainName=shop.example.com")
        .await;
    assert_eq!(route_apps(&by_query), vec!["branded"]);

    // Host is ignored unless trusted.
    let by_host: Value = registry
        .request(Method::GET, "/api/v1/config")
        .header(header::HOST, "shop.example.com")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(route_apps(&by_host), vec!["generic"]);
}

#[tokio::test]
async fn test_secret_settings_never_leave_the_registry() {
    let registry = TestRegistry::start().await;

    let res = registry
        .admin(Method::PUT, "/api/v1/settings/authToken")
        .json(&json!({ "value": "super-secret-token" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let setting: Value = registry
        .admin(Method::GET, "/api/v1/settings/authToken")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(setting["value"], json!("[SECRET]"));

    let config = registry.get_json("/api/v1/config").await;
    assert!(config["settings"].get("authToken").is_none());

    let body = registry
        .admin(Method::GET, "/api/v1/versioning")
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(!body.contains("super-secret-token"));
}

#[tokio::test]
async fn test_rendered_template_locale() {
    let registry = TestRegistry::start().await;
    registry
        .create(
            "/api/v1/template",
            json!({
                "name": "master",
                "content": "<html>hello</html>",
                "localized": { "fr-FR": "<html>bonjour</html>" },
            }),
        )
        .await;

    let res = registry
        .request(Method::GET, "/api/v1/template/master/rendered?locale=fr-FR")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    assert_eq!(res.text().await.unwrap(), "<html>bonjour</html>");

    let fallback = registry
        .request(Method::GET, "/api/v1/template/master/rendered?locale=de-DE")
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(fallback, "<html>hello</html>");

    let res = registry
        .request(Method::GET, "/api/v1/template/absent/rendered")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_versioning_list_and_revert() {
    let registry = TestRegistry::start().await;
    registry.seed_app("catalog").await;

    let res = registry
        .admin(Method::PUT, "/api/v1/app/catalog")
        .json(&json!({ "name": "catalog", "spaBundle": "http://cdn.local/catalog/v2.js" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = registry
        .admin(Method::GET, "/api/v1/versioning")
        .query(&[(
            "filter",
            r#"{"entity_type":"apps","entity_id":"catalog"}"#,
        )])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(content_range(&res), "versioning 0-1/2");
    let versions: Vec<Value> = res.json().await.unwrap();
    assert_eq!(versions[0]["createdBy"], json!("root"));
    let update_id = versions[0]["id"].as_i64().unwrap();

    let res = registry
        .admin(Method::POST, &format!("/api/v1/versioning/{update_id}/revert"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let reverted: Value = res.json().await.unwrap();
    assert_eq!(reverted["status"], json!("ok"));
    assert!(reverted["versionId"].as_i64().unwrap() > update_id);

    // The resolver sees the reverted state right away.
    let config = registry.get_json("/api/v1/config").await;
    assert_eq!(
        config["apps"]["catalog"]["spaBundle"],
        json!("http://cdn.local/catalog/app.js")
    );

    let res = registry
        .admin(Method::POST, "/api/v1/versioning/999999/revert")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = registry
        .admin(Method::GET, "/api/v1/versioning")
        .query(&[("filter", "{not json")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_non_revertable_version_is_bad_request() {
    let registry = TestRegistry::start().await;
    registry.seed_template("master").await;
    registry.seed_app("shop").await;
    let route = registry.seed_route("/shop/*", "shop", "master", json!({})).await;
    let route_id = route["id"].as_i64().unwrap();

    let res = registry
        .admin(Method::DELETE, &format!("/api/v1/route/{route_id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    let res = registry
        .admin(Method::DELETE, "/api/v1/app/shop")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let versions: Vec<Value> = registry
        .admin(Method::GET, "/api/v1/versioning")
        .query(&[(
            "filter",
            format!(r#"{{"entity_type":"routes","entity_id":"{route_id}"}}"#),
        )])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let deletion_id = versions[0]["id"].as_i64().unwrap();

    let res = registry
        .admin(Method::POST, &format!("/api/v1/versioning/{deletion_id}/revert"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_downstream_registry_reads_upstream_snapshot() {
    let upstream = TestRegistry::start().await;
    upstream.seed_template("master").await;
    upstream.seed_app("shop").await;
    upstream.seed_route("/shop/*", "shop", "master", json!({})).await;

    let mut config = test_config();
    config.upstream.registry_url = Some(upstream.url("/"));
    let downstream = TestRegistry::start_with(config).await;

    let plan: Value = downstream
        .request(Method::GET, "/api/v1/resolve")
        .query(&[("url", "/shop/cart")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(plan["route"]["template"], json!("master"));
    assert_eq!(plan["fragments"][0]["appName"], json!("shop"));
}
