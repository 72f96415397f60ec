//! Client-visible error taxonomy.
//!
//! Every gate in the admission pipeline fails with a [`GatewayError`]. The
//! HTTP rendering lives in `http::response`; this module only classifies.

use axum::http::{Method, StatusCode};

use crate::auth::token::AuthFailure;

/// Stable error kinds exposed to clients and used as metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AuthenticationFailed,
    PermissionDenied,
    RateLimitExceeded,
    RouteNotFound,
    UpstreamUnavailable,
    UpstreamError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AuthenticationFailed => "AuthenticationFailed",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::RateLimitExceeded => "RateLimitExceeded",
            ErrorKind::RouteNotFound => "RouteNotFound",
            ErrorKind::UpstreamUnavailable => "UpstreamUnavailable",
            ErrorKind::UpstreamError => "UpstreamError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request rejected by the gateway itself.
///
/// Upstream non-2xx responses are not represented here: they are passed
/// through verbatim and only classified as [`ErrorKind::UpstreamError`].
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(#[from] AuthFailure),

    #[error("permission denied: missing {missing:?}")]
    PermissionDenied { missing: Vec<String> },

    #[error("rate limit exceeded for class '{class}', retry after {retry_after_secs}s")]
    RateLimitExceeded { class: String, retry_after_secs: u64 },

    #[error("no route matches {method} {path}")]
    RouteNotFound { method: Method, path: String },

    /// Connect failure, timeout or saturated target. Details are logged by
    /// the forwarder and deliberately not carried here.
    #[error("upstream unavailable")]
    UpstreamUnavailable,
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::AuthenticationFailed(_) => ErrorKind::AuthenticationFailed,
            GatewayError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            GatewayError::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            GatewayError::RouteNotFound { .. } => ErrorKind::RouteNotFound,
            GatewayError::UpstreamUnavailable => ErrorKind::UpstreamUnavailable,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::AuthenticationFailed(_) => StatusCode::UNAUTHORIZED,
            GatewayError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            GatewayError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::AuthFailureReason;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                GatewayError::AuthenticationFailed(AuthFailure::new(
                    AuthFailureReason::Expired,
                    "exp in the past",
                )),
                StatusCode::UNAUTHORIZED,
            ),
            (GatewayError::PermissionDenied { missing: vec![] }, StatusCode::FORBIDDEN),
            (
                GatewayError::RateLimitExceeded { class: "standard".into(), retry_after_secs: 60 },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                GatewayError::RouteNotFound { method: Method::GET, path: "/nope".into() },
                StatusCode::NOT_FOUND,
            ),
            (GatewayError::UpstreamUnavailable, StatusCode::SERVICE_UNAVAILABLE),
        ];

        for (err, status) in cases {
            assert_eq!(err.status(), status, "{}", err.kind());
        }
    }
}
