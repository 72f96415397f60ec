//! Request metadata helpers.
//!
//! # Responsibilities
//! - Read the request ID assigned by the request-id layer
//! - Determine the client IP used for rate limiting and X-Forwarded-For
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing (outermost layer)
//! - X-Forwarded-For is ignored unless the listener is configured to trust it

use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;

pub use crate::security::headers::X_REQUEST_ID;

/// The request's ID, or a fresh UUID if none was assigned.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Client IP: the last X-Forwarded-For entry when trusted and parsable,
/// otherwise the TCP peer.
///
/// Only the last entry was written by the trusted hop; everything to its
/// left came from the client and can be forged.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr, trust_forwarded_for: bool) -> IpAddr {
    if trust_forwarded_for {
        let forwarded = headers
            .get_all("x-forwarded-for")
            .iter()
            .last()
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit(',').next())
            .and_then(|last| last.trim().parse::<IpAddr>().ok());
        if let Some(ip) = forwarded {
            return ip;
        }
    }
    peer.ip()
}
