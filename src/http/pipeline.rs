//! Per-request admission pipeline.
//!
//! # Data Flow
//! ```text
//! Received
//!   → route lookup              (RouteNotFound → Rejected)
//!   → rate limit                (RateLimitExceeded → Rejected)   → RateLimitChecked
//!   → authenticate              (AuthenticationFailed → Rejected) → Authenticated?
//!   → authorize                 (PermissionDenied → Rejected)     → Authorized?
//!   → build outbound + forward                                    → Forwarded
//!   → backend response or UpstreamUnavailable                     → Responded
//! ```
//!
//! Every stage returns `Result`; the first `Err` short-circuits, so nothing
//! is forwarded once any gate has rejected.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{request, Request};
use axum::response::{IntoResponse, Response};

use crate::auth::credentials::CredentialExtractor;
use crate::auth::guard::authorize;
use crate::auth::identity::Identity;
use crate::auth::token::{AuthFailure, AuthFailureReason, TokenVerifier};
use crate::error::GatewayError;
use crate::http::request::{client_ip, request_id};
use crate::observability::metrics;
use crate::routing::{RouteRule, RouteTable};
use crate::security::headers::ForwardContext;
use crate::security::rate_limit::{ClientKey, RateLimiter};
use crate::upstream::{build_outbound, Forwarder};

/// Where a request is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    RateLimitChecked,
    Authenticated,
    Authorized,
    Forwarded,
    Responded,
    Rejected,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestState::Responded | RequestState::Rejected)
    }

    pub fn can_transition_to(self, next: RequestState) -> bool {
        use RequestState::*;
        match (self, next) {
            (Received, RateLimitChecked) => true,
            (RateLimitChecked, Authenticated | Forwarded) => true,
            (Authenticated, Authorized | Forwarded) => true,
            (Authorized, Forwarded) => true,
            (Forwarded, Responded) => true,
            // Gates can reject; a dispatched request always ends Responded.
            (Received | RateLimitChecked | Authenticated | Authorized, Rejected) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Tracks one request through the pipeline.
#[derive(Debug)]
pub struct RequestLifecycle {
    state: RequestState,
    route: Option<String>,
    started: Instant,
}

impl RequestLifecycle {
    pub fn new() -> Self {
        Self {
            state: RequestState::Received,
            route: None,
            started: Instant::now(),
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn advance(&mut self, next: RequestState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid request transition {} -> {}",
            self.state,
            next
        );
        if !self.state.can_transition_to(next) {
            tracing::error!(from = %self.state, to = %next, "Invalid request state transition");
        }
        self.state = next;
    }

    /// Close out a failed request: `Rejected` at a gate, `Responded` if it
    /// had already been dispatched.
    pub fn fail(&mut self) {
        let next = if self.state == RequestState::Forwarded {
            RequestState::Responded
        } else {
            RequestState::Rejected
        };
        self.advance(next);
    }
}

impl Default for RequestLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// The composed admission pipeline.
pub struct Pipeline {
    routes: Arc<RouteTable>,
    limiter: Arc<RateLimiter>,
    verifier: Arc<TokenVerifier>,
    credentials: CredentialExtractor,
    forwarder: Arc<Forwarder>,
    trust_forwarded_for: bool,
}

impl Pipeline {
    pub fn new(
        routes: Arc<RouteTable>,
        limiter: Arc<RateLimiter>,
        verifier: Arc<TokenVerifier>,
        credentials: CredentialExtractor,
        forwarder: Arc<Forwarder>,
        trust_forwarded_for: bool,
    ) -> Self {
        Self {
            routes,
            limiter,
            verifier,
            credentials,
            forwarder,
            trust_forwarded_for,
        }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn forwarder(&self) -> &Forwarder {
        &self.forwarder
    }

    /// Run a request through every gate and forward it if admitted.
    pub async fn handle(&self, request: Request<Body>, peer: SocketAddr) -> Response {
        let (parts, body) = request.into_parts();
        let request_id = request_id(&parts.headers);
        let mut lifecycle = RequestLifecycle::new();

        let result = self
            .admit_and_forward(&mut lifecycle, &parts, body, peer, &request_id)
            .await;
        let route = lifecycle.route.take().unwrap_or_else(|| "none".to_string());

        let response = match result {
            Ok(response) => {
                lifecycle.advance(RequestState::Responded);
                let status = response.status();
                if !status.is_success() {
                    tracing::debug!(
                        request_id = %request_id,
                        route = %route,
                        status = status.as_u16(),
                        kind = "UpstreamError",
                        "Upstream returned non-success status"
                    );
                }
                response
            }
            Err(error) => {
                lifecycle.fail();
                self.log_failure(&error, &request_id, &route, &parts);
                error.into_response()
            }
        };

        metrics::record_request(&route, response.status().as_u16(), lifecycle.started);
        tracing::debug!(
            request_id = %request_id,
            route = %route,
            state = %lifecycle.state(),
            status = response.status().as_u16(),
            elapsed_ms = lifecycle.started.elapsed().as_millis() as u64,
            "Request finished"
        );
        response
    }

    async fn admit_and_forward(
        &self,
        lifecycle: &mut RequestLifecycle,
        parts: &request::Parts,
        body: Body,
        peer: SocketAddr,
        request_id: &str,
    ) -> Result<Response, GatewayError> {
        let matched = self.routes.match_route(&parts.method, parts.uri.path())?;
        let rule = matched.rule;
        lifecycle.route = Some(rule.name.clone());

        let ip = client_ip(&parts.headers, peer, self.trust_forwarded_for);
        self.limiter
            .check(&ClientKey::Ip(ip), &rule.rate_limit_class)
            .await
            .into_result()?;
        lifecycle.advance(RequestState::RateLimitChecked);

        let identity = self.authenticate(parts, &rule, request_id).await?;
        if let Some(identity) = &identity {
            lifecycle.advance(RequestState::Authenticated);
            if rule.auth_required {
                authorize(identity, &rule.requirement)?;
                lifecycle.advance(RequestState::Authorized);
            }
        }

        let ctx = ForwardContext {
            client_ip: ip,
            request_id,
            identity: identity.as_ref(),
            trust_forwarded_for: self.trust_forwarded_for,
        };
        let outbound = build_outbound(parts, body, &rule, &ctx, self.credentials.query_param()).map_err(|e| {
            tracing::error!(request_id, route = %rule.name, error = %e, "Failed to build outbound request");
            GatewayError::UpstreamUnavailable
        })?;

        lifecycle.advance(RequestState::Forwarded);
        self.forwarder
            .forward(&rule.target_authority, outbound)
            .await
            .map_err(|e| {
                tracing::warn!(
                    request_id,
                    route = %rule.name,
                    target = %rule.target_authority,
                    error = %e,
                    "Forwarding failed"
                );
                GatewayError::UpstreamUnavailable
            })
    }

    /// `Ok(None)` means anonymous. On routes without `auth_required` a bad
    /// or missing credential also means anonymous.
    async fn authenticate(
        &self,
        parts: &request::Parts,
        rule: &RouteRule,
        request_id: &str,
    ) -> Result<Option<Identity>, GatewayError> {
        let credential = match self.credentials.extract(&parts.headers, parts.uri.query()) {
            Ok(credential) => credential,
            Err(failure) if rule.auth_required => return Err(failure.into()),
            Err(_) => None,
        };

        let Some(credential) = credential else {
            if rule.auth_required {
                return Err(AuthFailure::new(AuthFailureReason::MissingCredential, "no credential presented").into());
            }
            return Ok(None);
        };

        match self.verifier.verify(&credential.token).await {
            Ok(identity) => {
                tracing::debug!(
                    request_id,
                    sub = %identity.subject_id,
                    source = credential.source.as_str(),
                    "Credential verified"
                );
                Ok(Some(identity))
            }
            Err(failure) if rule.auth_required => Err(failure.into()),
            Err(failure) => {
                tracing::debug!(
                    request_id,
                    reason = %failure.reason,
                    "Ignoring invalid credential on public route"
                );
                Ok(None)
            }
        }
    }

    fn log_failure(&self, error: &GatewayError, request_id: &str, route: &str, parts: &request::Parts) {
        let kind = error.kind().as_str();
        match error {
            GatewayError::AuthenticationFailed(failure) => {
                metrics::record_rejection(kind, failure.reason.as_str());
                tracing::info!(
                    request_id,
                    route,
                    reason = %failure.reason,
                    detail = %failure.detail,
                    "Authentication failed"
                );
            }
            GatewayError::PermissionDenied { missing } => {
                metrics::record_rejection(kind, "insufficient_grants");
                tracing::info!(request_id, route, missing = ?missing, "Permission denied");
            }
            GatewayError::RateLimitExceeded { class, retry_after_secs } => {
                metrics::record_rejection(kind, "over_limit");
                tracing::info!(request_id, route, class = %class, retry_after_secs, "Rate limited");
            }
            GatewayError::RouteNotFound { .. } => {
                metrics::record_rejection(kind, "no_route");
                tracing::debug!(request_id, method = %parts.method, path = %parts.uri.path(), "No route matched");
            }
            GatewayError::UpstreamUnavailable => {
                metrics::record_rejection(kind, "transport");
            }
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("routes", &self.routes.len())
            .field("limiter", &self.limiter)
            .field("trust_forwarded_for", &self.trust_forwarded_for)
            .finish_non_exhaustive()
    }
}
