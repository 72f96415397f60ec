//! Error responses.
//!
//! # Responsibilities
//! - Render every `GatewayError` as structured JSON with a stable kind
//! - Add `Retry-After` to 429s and `WWW-Authenticate` to 401s
//!
//! # Design Decisions
//! - Messages are fixed per kind; internal detail (hosts, socket errors,
//!   token parse errors) is logged, never rendered
//! - Field names are camelCase

use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::GatewayError;
use crate::security::rate_limit::humanize_retry_after;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

impl ErrorBody {
    fn new(error: &GatewayError, message: impl Into<String>) -> Self {
        Self {
            error: error.kind().as_str(),
            message: message.into(),
            reason: None,
            class: None,
            retry_after: None,
            retry_after_seconds: None,
        }
    }
}

impl From<&GatewayError> for ErrorBody {
    fn from(error: &GatewayError) -> Self {
        match error {
            GatewayError::AuthenticationFailed(failure) => ErrorBody {
                reason: Some(failure.reason.as_str()),
                ..ErrorBody::new(error, failure.reason.client_message())
            },
            GatewayError::PermissionDenied { .. } => {
                ErrorBody::new(error, "You do not have permission to access this resource")
            }
            GatewayError::RateLimitExceeded { class, retry_after_secs } => {
                let human = humanize_retry_after(*retry_after_secs);
                let mut body = ErrorBody::new(error, format!("Too many requests, try again in {}", human));
                body.class = Some(class.clone());
                body.retry_after = Some(human);
                body.retry_after_seconds = Some(*retry_after_secs);
                body
            }
            GatewayError::RouteNotFound { method, path } => {
                ErrorBody::new(error, format!("No route for {} {}", method, path))
            }
            GatewayError::UpstreamUnavailable => {
                ErrorBody::new(error, "The upstream service is temporarily unavailable")
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = ErrorBody::from(&self);
        let mut response = (self.status(), Json(body)).into_response();

        match &self {
            GatewayError::RateLimitExceeded { retry_after_secs, .. } => {
                if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
            }
            GatewayError::AuthenticationFailed(_) => {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            _ => {}
        }
        response
    }
}
