//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router: `/health` plus a catch-all into the pipeline
//! - Wire up middleware (request ID, tracing, concurrency, body limit)
//! - Serve on a listener until the shutdown channel fires

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::Response,
    routing::{any, get},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::http::health::health;
use crate::http::pipeline::Pipeline;
use crate::http::request::X_REQUEST_ID;
use crate::lifecycle::startup::GatewayComponents;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    pipeline: Arc<Pipeline>,
}

impl HttpServer {
    /// Create a new HTTP server from configuration and built components.
    pub fn new(config: &GatewayConfig, components: GatewayComponents) -> Self {
        let pipeline = Arc::new(components.into_pipeline(config.listener.trust_forwarded_for));
        let state = AppState {
            pipeline: pipeline.clone(),
        };
        let router = Self::build_router(config, state);
        Self { router, pipeline }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Layers wrap outward, so the request-id layer added last runs first
    /// and every span and handler sees the ID. `Router::layer` applies a
    /// layer to each route separately, so the concurrency bound uses one
    /// semaphore shared by every clone.
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(GlobalConcurrencyLimitLayer::new(config.listener.max_connections))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    let request_id = request
                        .headers()
                        .get(X_REQUEST_ID)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-");
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        path = %request.uri().path(),
                        request_id = %request_id,
                    )
                }),
            )
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.pipeline.routes().len(),
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Catch-all handler: every non-health request enters the pipeline.
async fn gateway_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    state.pipeline.handle(request, peer).await
}
