//! Concurrency and limit tests: fixed-window rate limiting, per-target
//! in-flight bounds and bursts of parallel traffic.

use std::time::{Duration, Instant};

use axum::http::StatusCode;
use serde_json::Value;

mod common;

use common::*;

#[tokio::test]
async fn test_rate_limit_rejects_after_max() {
    let jwks = MockJwks::start(JWKS_KEY_1).await;
    let backend = start_backend(200).await;

    let mut config = base_config(&jwks.url());
    with_class(&mut config, "strict", 3600, 3);
    let mut rule = route("login", "/api/auth/login", &backend.target());
    rule.rate_limit_class = "strict".to_string();
    config.routes.push(rule);
    let gateway = spawn_gateway(config).await;

    for _ in 0..3 {
        let res = client().post(gateway.url("/api/auth/login")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    let res = client().post(gateway.url("/api/auth/login")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = res.headers()["retry-after"].to_str().unwrap().parse().unwrap();
    assert!((1..=3600).contains(&retry_after));

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "RateLimitExceeded");
    assert_eq!(body["class"], "strict");
    assert_eq!(body["retryAfterSeconds"], retry_after);

    assert_eq!(backend.call_count(), 3);
}

#[tokio::test]
async fn test_rate_classes_are_independent() {
    let jwks = MockJwks::start(JWKS_KEY_1).await;
    let backend = start_backend(200).await;

    let mut config = base_config(&jwks.url());
    with_class(&mut config, "strict", 3600, 1);
    with_class(&mut config, "standard", 60, 50);
    let mut login = route("login", "/api/auth/login", &backend.target());
    login.rate_limit_class = "strict".to_string();
    config.routes.push(login);
    config.routes.push(route("projects", "/api/projects", &backend.target()));
    let gateway = spawn_gateway(config).await;

    let res = client().post(gateway.url("/api/auth/login")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let res = client().post(gateway.url("/api/auth/login")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);

    for _ in 0..5 {
        let res = client().get(gateway.url("/api/projects")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_rate_limit_applies_before_authentication() {
    let jwks = MockJwks::start(JWKS_KEY_1).await;
    let backend = start_backend(200).await;

    let mut config = base_config(&jwks.url());
    with_class(&mut config, "standard", 3600, 2);
    config
        .routes
        .push(protected_route("profile", "/api/profile", &backend.target()));
    let gateway = spawn_gateway(config).await;

    for _ in 0..2 {
        let res = client().get(gateway.url("/api/profile")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    let token = mint("1", &claims("user-1", &[], &[]));
    let res = client()
        .get(gateway.url("/api/profile"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_disabled_rate_limiting_admits_everything() {
    let jwks = MockJwks::start(JWKS_KEY_1).await;
    let backend = start_backend(200).await;

    let mut config = base_config(&jwks.url());
    with_class(&mut config, "standard", 60, 1);
    config.rate_limit.enabled = false;
    config.routes.push(route("projects", "/api/projects", &backend.target()));
    let gateway = spawn_gateway(config).await;

    for _ in 0..5 {
        let res = client().get(gateway.url("/api/projects")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_in_flight_limit_per_target() {
    let jwks = MockJwks::start(JWKS_KEY_1).await;
    let slow = start_slow_backend(200, Duration::from_millis(800)).await;
    let fast = start_backend(200).await;

    let mut config = base_config(&jwks.url());
    config.upstream.max_in_flight_per_target = 1;
    config.routes.push(route("slow", "/api/slow", &slow.target()));
    config.routes.push(route("fast", "/api/fast", &fast.target()));
    let gateway = spawn_gateway(config).await;

    let first_url = gateway.url("/api/slow");
    let first = tokio::spawn(async move { client().get(first_url).send().await.unwrap().status() });
    tokio::time::sleep(Duration::from_millis(200)).await;

    let res = client().get(gateway.url("/api/slow")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

    // Other targets are unaffected by a saturated one.
    let res = client().get(gateway.url("/api/fast")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    assert_eq!(first.await.unwrap(), StatusCode::OK);
    assert_eq!(slow.call_count(), 1);

    // The slot is released once the first response body has been sent.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let res = client().get(gateway.url("/api/slow")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_client_disconnect_releases_in_flight_slot() {
    let jwks = MockJwks::start(JWKS_KEY_1).await;
    let slow = start_slow_backend(200, Duration::from_secs(3)).await;

    let mut config = base_config(&jwks.url());
    config.upstream.max_in_flight_per_target = 1;
    config.routes.push(route("slow", "/api/slow", &slow.target()));
    let gateway = spawn_gateway(config).await;

    let impatient = reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_millis(300))
        .build()
        .unwrap();
    let started = Instant::now();
    assert!(impatient.get(gateway.url("/api/slow")).send().await.is_err());
    assert_eq!(slow.call_count(), 1);

    // The backend is still sleeping; dropping the client must free the slot.
    let deadline = started + Duration::from_secs(2);
    while gateway.in_flight(&slow) > 0 {
        assert!(Instant::now() < deadline, "slot held after the client went away");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let res = client().get(gateway.url("/api/slow")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(slow.call_count(), 2);
}

#[tokio::test]
async fn test_connection_limit_is_shared_across_routes() {
    let jwks = MockJwks::start(JWKS_KEY_1).await;
    let slow = start_slow_backend(200, Duration::from_millis(800)).await;

    let mut config = base_config(&jwks.url());
    config.listener.max_connections = 1;
    config.routes.push(route("slow", "/api/slow", &slow.target()));
    let gateway = spawn_gateway(config).await;

    let first_url = gateway.url("/api/slow");
    let first = tokio::spawn(async move { client().get(first_url).send().await.unwrap().status() });
    tokio::time::sleep(Duration::from_millis(200)).await;

    // /health is a different route but waits for the same permit.
    let started = Instant::now();
    let res = client().get(gateway.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(started.elapsed() >= Duration::from_millis(300));

    assert_eq!(first.await.unwrap(), StatusCode::OK);
}

#[tokio::test]
async fn test_parallel_burst_is_forwarded() {
    let jwks = MockJwks::start(JWKS_KEY_1).await;
    let backend = start_backend(200).await;

    let mut config = base_config(&jwks.url());
    with_class(&mut config, "standard", 60, 1_000);
    config
        .routes
        .push(protected_route("projects", "/api/projects/:id", &backend.target()));
    let gateway = spawn_gateway(config).await;

    let token = mint("1", &claims("burst", &["viewer"], &[]));
    let mut handles = Vec::new();
    for i in 0..50 {
        let url = gateway.url(&format!("/api/projects/{}", i));
        let token = token.clone();
        handles.push(tokio::spawn(async move {
            client().get(url).bearer_auth(token).send().await.unwrap().status()
        }));
    }

    let results = futures_util::future::join_all(handles).await;
    for status in results {
        assert_eq!(status.unwrap(), StatusCode::OK);
    }
    assert_eq!(backend.call_count(), 50);
}
