//! Shared utilities for integration tests: mock backends, a mock key set
//! endpoint, token minting and an in-process gateway.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use portfolio_gateway::config::{GatewayConfig, RateClassConfig, RouteConfig};
use portfolio_gateway::http::Pipeline;
use portfolio_gateway::lifecycle::{GatewayComponents, Shutdown};
use portfolio_gateway::HttpServer;

pub const ISSUER: &str = "portfolio-api";
pub const AUDIENCE: &str = "portfolio-client";

pub const RSA_KEY_1: &str = include_str!("../fixtures/rsa_key_1.pem");
pub const RSA_KEY_2: &str = include_str!("../fixtures/rsa_key_2.pem");
pub const JWKS_KEY_1: &str = include_str!("../fixtures/jwks_key_1.json");
pub const JWKS_KEY_2: &str = include_str!("../fixtures/jwks_key_2.json");
pub const JWKS_BOTH: &str = include_str!("../fixtures/jwks_both.json");

/// A request as seen by a mock backend.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
}

#[derive(Clone)]
struct BackendState {
    status: StatusCode,
    delay: Duration,
    calls: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// A backend that records every request and answers with a fixed status.
pub struct MockBackend {
    pub addr: SocketAddr,
    calls: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockBackend {
    pub fn target(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn calls(&self) -> Vec<RecordedRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_call(&self) -> RecordedRequest {
        self.calls().pop().expect("backend was not called")
    }
}

pub async fn start_backend(status: u16) -> MockBackend {
    start_slow_backend(status, Duration::ZERO).await
}

/// Backend that waits `delay` before answering.
pub async fn start_slow_backend(status: u16, delay: Duration) -> MockBackend {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let state = BackendState {
        status: StatusCode::from_u16(status).unwrap(),
        delay,
        calls: calls.clone(),
    };
    let app = Router::new().fallback(record).with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockBackend { addr, calls }
}

async fn record(State(state): State<BackendState>, request: Request<Body>) -> Response {
    let recorded = RecordedRequest {
        method: request.method().to_string(),
        path: request.uri().path().to_string(),
        query: request.uri().query().map(str::to_string),
        headers: request.headers().clone(),
    };
    state.calls.lock().unwrap().push(recorded.clone());

    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }

    let mut response = (
        state.status,
        Json(json!({ "backend": "mock", "path": recorded.path })),
    )
        .into_response();
    response
        .headers_mut()
        .insert("x-backend", "mock".parse().unwrap());
    response
}

/// An address nothing is listening on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

#[derive(Clone)]
struct JwksState {
    document: Arc<Mutex<String>>,
    fetches: Arc<AtomicUsize>,
}

/// Serves a swappable key set at `/.well-known/jwks.json`.
pub struct MockJwks {
    pub addr: SocketAddr,
    state: JwksState,
}

impl MockJwks {
    pub async fn start(document: &str) -> Self {
        let state = JwksState {
            document: Arc::new(Mutex::new(document.to_string())),
            fetches: Arc::new(AtomicUsize::new(0)),
        };
        let app = Router::new()
            .route("/.well-known/jwks.json", get(serve_jwks))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}/.well-known/jwks.json", self.addr)
    }

    pub fn replace(&self, document: &str) {
        *self.state.document.lock().unwrap() = document.to_string();
    }

    pub fn fetches(&self) -> usize {
        self.state.fetches.load(Ordering::SeqCst)
    }
}

async fn serve_jwks(State(state): State<JwksState>) -> Response {
    state.fetches.fetch_add(1, Ordering::SeqCst);
    let document = state.document.lock().unwrap().clone();
    ([("content-type", "application/json")], document).into_response()
}

/// Claims the gateway under test accepts.
pub fn claims(sub: &str, roles: &[&str], permissions: &[&str]) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "iss": ISSUER,
        "aud": AUDIENCE,
        "sub": sub,
        "email": format!("{}@example.com", sub),
        "roles": roles,
        "permissions": permissions,
        "iat": now,
        "exp": now + 3600,
    })
}

/// Sign `claims` with fixture key `kid` ("1" or "2").
pub fn mint(kid: &str, claims: &Value) -> String {
    let pem = match kid {
        "1" => RSA_KEY_1,
        "2" => RSA_KEY_2,
        other => panic!("no fixture key {}", other),
    };
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    encode(&header, claims, &EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap()).unwrap()
}

pub fn route(name: &str, path: &str, target: &str) -> RouteConfig {
    RouteConfig {
        name: name.to_string(),
        path: path.to_string(),
        method: "ANY".to_string(),
        target: target.to_string(),
        auth_required: false,
        rate_limit_class: "standard".to_string(),
        roles: Vec::new(),
        permissions: Vec::new(),
    }
}

pub fn protected_route(name: &str, path: &str, target: &str) -> RouteConfig {
    RouteConfig {
        auth_required: true,
        ..route(name, path, target)
    }
}

/// Config pointing at `jwks_url` with metrics off and an in-memory store.
pub fn base_config(jwks_url: &str) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.auth.issuer = ISSUER.to_string();
    config.auth.audience = AUDIENCE.to_string();
    config.auth.jwks_url = Some(jwks_url.to_string());
    config.auth.jwks_timeout_secs = 2;
    config.observability.metrics_enabled = false;
    config.timeouts.connect_ms = 500;
    config.timeouts.response_secs = 5;
    config
}

pub fn with_class(config: &mut GatewayConfig, name: &str, window_secs: u64, max_requests: u64) {
    config
        .rate_limit
        .classes
        .insert(name.to_string(), RateClassConfig { window_secs, max_requests });
}

/// A gateway served on a loopback port until dropped.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub pipeline: Arc<Pipeline>,
    shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Calls currently in flight to `backend`.
    pub fn in_flight(&self, backend: &MockBackend) -> usize {
        self.pipeline
            .forwarder()
            .targets()
            .get(&backend.addr.to_string())
            .map(|target| target.in_flight())
            .expect("backend is a registered target")
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn spawn_gateway(config: GatewayConfig) -> TestGateway {
    let components = GatewayComponents::from_config(&config)
        .await
        .expect("gateway components");
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(&config, components);
    let pipeline = server.pipeline().clone();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestGateway {
        addr,
        pipeline,
        shutdown,
    }
}

/// Client without connection reuse or proxies.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
