//! Failure injection: unreachable or slow backends, key endpoint outages
//! and key rotation.

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::Value;

mod common;

use common::*;

#[tokio::test]
async fn test_connection_refused_is_generic_503() {
    let jwks = MockJwks::start(JWKS_KEY_1).await;
    let dead = unused_addr().await;

    let mut config = base_config(&jwks.url());
    config
        .routes
        .push(route("projects", "/api/projects", &format!("http://{}", dead)));
    let gateway = spawn_gateway(config).await;

    let res = client().get(gateway.url("/api/projects")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "UpstreamUnavailable");
    let rendered = body.to_string();
    assert!(!rendered.contains("127.0.0.1"));
    assert!(!rendered.contains(&dead.port().to_string()));
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let jwks = MockJwks::start(JWKS_KEY_1).await;
    let backend = start_slow_backend(200, Duration::from_secs(3)).await;

    let mut config = base_config(&jwks.url());
    config.timeouts.response_secs = 1;
    config.routes.push(route("slow", "/api/slow", &backend.target()));
    let gateway = spawn_gateway(config).await;

    let started = std::time::Instant::now();
    let res = client().get(gateway.url("/api/slow")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(backend.call_count(), 1);
}

#[tokio::test]
async fn test_backend_errors_pass_through() {
    let jwks = MockJwks::start(JWKS_KEY_1).await;
    let failing = start_backend(500).await;
    let missing = start_backend(404).await;

    let mut config = base_config(&jwks.url());
    config.routes.push(route("failing", "/api/failing", &failing.target()));
    config.routes.push(route("missing", "/api/missing/:id", &missing.target()));
    let gateway = spawn_gateway(config).await;

    let res = client().get(gateway.url("/api/failing")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.headers()["x-backend"], "mock");
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["backend"], "mock");

    let res = client().get(gateway.url("/api/missing/9")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["path"], "/api/missing/9");
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn test_starts_without_key_endpoint() {
    let dead = unused_addr().await;
    let backend = start_backend(200).await;

    let mut config = base_config(&format!("http://{}/.well-known/jwks.json", dead));
    config
        .routes
        .push(protected_route("profile", "/api/profile", &backend.target()));
    config.routes.push(route("public", "/api/public", &backend.target()));
    let gateway = spawn_gateway(config).await;

    let res = client().get(gateway.url("/api/public")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let token = mint("1", &claims("user-1", &[], &[]));
    let res = client()
        .get(gateway.url("/api/profile"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["reason"], "KeyNotFound");
    assert_eq!(backend.call_count(), 1);
}

#[tokio::test]
async fn test_key_rotation_refreshes_once() {
    let jwks = MockJwks::start(JWKS_KEY_1).await;
    let backend = start_backend(200).await;

    let mut config = base_config(&jwks.url());
    config
        .routes
        .push(protected_route("profile", "/api/profile", &backend.target()));
    let gateway = spawn_gateway(config).await;
    assert_eq!(jwks.fetches(), 1);

    jwks.replace(JWKS_BOTH);
    let token = mint("2", &claims("rotated", &[], &[]));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let url = gateway.url("/api/profile");
        let token = token.clone();
        handles.push(tokio::spawn(async move {
            client().get(url).bearer_auth(token).send().await.unwrap().status()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    assert_eq!(jwks.fetches(), 2);
    assert_eq!(backend.call_count(), 8);

    // Old key keeps working after rotation.
    let old = mint("1", &claims("legacy", &[], &[]));
    let res = client()
        .get(gateway.url("/api/profile"))
        .bearer_auth(old)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(jwks.fetches(), 2);
}

#[tokio::test]
async fn test_unknown_kid_after_refresh_is_rejected() {
    let jwks = MockJwks::start(JWKS_KEY_1).await;
    let backend = start_backend(200).await;

    let mut config = base_config(&jwks.url());
    config
        .routes
        .push(protected_route("profile", "/api/profile", &backend.target()));
    let gateway = spawn_gateway(config).await;

    let token = mint("2", &claims("stranger", &[], &[]));
    let res = client()
        .get(gateway.url("/api/profile"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["reason"], "KeyNotFound");
    assert_eq!(jwks.fetches(), 2);
    assert_eq!(backend.call_count(), 0);
}
