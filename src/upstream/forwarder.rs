//! Request forwarding.
//!
//! # Responsibilities
//! - Build the outbound request from an admitted one (pure transformation)
//! - Claim an in-flight slot on the target, dial once, bound the wait
//! - Stream the response back with hop-by-hop headers stripped
//!
//! # Design Decisions
//! - No retries: one attempt per request
//! - Bodies stream in both directions, nothing is buffered
//! - The slot guard rides inside the response body, so it is released when
//!   the body finishes or the client goes away
//! - Non-2xx responses are returned as-is; only transport failures are errors

use std::time::Duration;

use axum::body::Body;
use axum::http::{request, Request, Response, Uri};
use http_body_util::BodyExt;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;

use crate::auth::credentials::strip_query_param;
use crate::config::{TimeoutConfig, UpstreamConfig};
use crate::routing::{RouteRule, RouteTable};
use crate::security::headers::{outbound_headers, response_headers, ForwardContext};
use crate::upstream::pool::TargetRegistry;

/// Transport-level forwarding failures. None of these reach the client
/// verbatim.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("target {0} has no free in-flight slots")]
    Saturated(String),

    #[error("target {0} is not registered")]
    UnknownTarget(String),

    #[error("invalid outbound request: {0}")]
    InvalidRequest(String),

    #[error("connect to {target} failed: {source}")]
    Connect {
        target: String,
        #[source]
        source: hyper_util::client::legacy::Error,
    },

    #[error("request to {target} failed: {source}")]
    Request {
        target: String,
        #[source]
        source: hyper_util::client::legacy::Error,
    },

    #[error("no response from {target} within {timeout:?}")]
    Timeout { target: String, timeout: Duration },
}

/// Build the request sent to the route's target.
///
/// The path and method are preserved, `strip_param` is removed from the
/// query, and headers are rewritten by [`outbound_headers`].
pub fn build_outbound(
    parts: &request::Parts,
    body: Body,
    rule: &RouteRule,
    ctx: &ForwardContext<'_>,
    strip_param: Option<&str>,
) -> Result<Request<Body>, ForwardError> {
    let query = match (parts.uri.query(), strip_param) {
        (Some(query), Some(param)) => strip_query_param(query, param),
        (query, _) => query.map(str::to_string),
    };
    let url = rule.outbound_url(parts.uri.path(), query.as_deref());
    let uri = Uri::try_from(url.as_str()).map_err(|e| ForwardError::InvalidRequest(e.to_string()))?;

    let mut outbound = Request::new(body);
    *outbound.method_mut() = parts.method.clone();
    *outbound.uri_mut() = uri;
    *outbound.headers_mut() = outbound_headers(&parts.headers, ctx);
    Ok(outbound)
}

pub struct Forwarder {
    client: Client<HttpConnector, Body>,
    targets: TargetRegistry,
    response_timeout: Duration,
}

impl Forwarder {
    pub fn new(timeouts: &TimeoutConfig, upstream: &UpstreamConfig, routes: &RouteTable) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_millis(timeouts.connect_ms)));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(timeouts.idle_secs))
            .build(connector);

        Self {
            client,
            targets: TargetRegistry::from_routes(routes, upstream.max_in_flight_per_target),
            response_timeout: Duration::from_secs(timeouts.response_secs),
        }
    }

    pub fn targets(&self) -> &TargetRegistry {
        &self.targets
    }

    /// Send `outbound` to `target` (a registered `host:port`).
    pub async fn forward(&self, target: &str, outbound: Request<Body>) -> Result<Response<Body>, ForwardError> {
        let slot = self
            .targets
            .get(target)
            .ok_or_else(|| ForwardError::UnknownTarget(target.to_string()))?
            .try_acquire()
            .ok_or_else(|| ForwardError::Saturated(target.to_string()))?;

        let response = match tokio::time::timeout(self.response_timeout, self.client.request(outbound)).await {
            Ok(Ok(response)) => response,
            Ok(Err(source)) if source.is_connect() => {
                return Err(ForwardError::Connect {
                    target: target.to_string(),
                    source,
                })
            }
            Ok(Err(source)) => {
                return Err(ForwardError::Request {
                    target: target.to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(ForwardError::Timeout {
                    target: target.to_string(),
                    timeout: self.response_timeout,
                })
            }
        };

        let (parts, body) = response.into_parts();
        let body = body.map_frame(move |frame| {
            let _held = &slot;
            frame
        });

        let mut response = Response::new(Body::new(body));
        *response.status_mut() = parts.status;
        *response.headers_mut() = response_headers(&parts.headers);
        Ok(response)
    }
}

impl std::fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarder")
            .field("targets", &self.targets.len())
            .field("response_timeout", &self.response_timeout)
            .finish_non_exhaustive()
    }
}
