//! Header transformation for proxied traffic.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Strip client-supplied `X-User-*` headers and set them from the verified
//!   identity
//! - Add X-Forwarded-For, X-Forwarded-Proto, X-Forwarded-Host, X-Request-Id
//!
//! # Design Decisions
//! - Pure functions: inbound headers in, new outbound headers out
//! - Existing X-Forwarded-For is only extended when the listener trusts it
//! - `Host` is not copied; the client sets it from the outbound URL

use std::collections::HashSet;
use std::net::IpAddr;

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};

use crate::auth::identity::Identity;

pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_USER_ID: &str = "x-user-id";
pub const X_USER_ROLES: &str = "x-user-roles";
pub const X_USER_PERMISSIONS: &str = "x-user-permissions";
pub const X_USER_EMAIL: &str = "x-user-email";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";

const IDENTITY_PREFIX: &str = "x-user-";

/// Headers that apply to a single connection only.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Per-request facts the outbound headers are derived from.
#[derive(Debug, Clone, Copy)]
pub struct ForwardContext<'a> {
    pub client_ip: IpAddr,
    pub request_id: &'a str,
    pub identity: Option<&'a Identity>,
    pub trust_forwarded_for: bool,
}

/// Build the header map sent to the backend.
pub fn outbound_headers(inbound: &HeaderMap, ctx: &ForwardContext<'_>) -> HeaderMap {
    let connection_named = connection_listed(inbound);
    let mut out = HeaderMap::with_capacity(inbound.len() + 6);

    for (name, value) in inbound {
        let lower = name.as_str();
        if is_hop_by_hop(name, &connection_named)
            || *name == header::HOST
            || lower.starts_with(IDENTITY_PREFIX)
            || matches!(lower, X_REQUEST_ID | X_FORWARDED_FOR | X_FORWARDED_PROTO | X_FORWARDED_HOST)
        {
            continue;
        }
        out.append(name.clone(), value.clone());
    }

    let forwarded_for = match inbound.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) if ctx.trust_forwarded_for && !prior.trim().is_empty() => {
            format!("{}, {}", prior.trim(), ctx.client_ip)
        }
        _ => ctx.client_ip.to_string(),
    };
    set(&mut out, X_FORWARDED_FOR, &forwarded_for);
    out.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
    if let Some(host) = inbound.get(header::HOST) {
        out.insert(X_FORWARDED_HOST, host.clone());
    }
    set(&mut out, X_REQUEST_ID, ctx.request_id);

    if let Some(identity) = ctx.identity {
        set(&mut out, X_USER_ID, &identity.subject_id);
        set(&mut out, X_USER_ROLES, &identity.roles_header());
        set(&mut out, X_USER_PERMISSIONS, &identity.permissions_header());
        if let Some(email) = &identity.email {
            set(&mut out, X_USER_EMAIL, email);
        }
    }

    out
}

/// Copy of a backend response's headers without hop-by-hop headers.
pub fn response_headers(upstream: &HeaderMap) -> HeaderMap {
    let connection_named = connection_listed(upstream);
    let mut out = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        if !is_hop_by_hop(name, &connection_named) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// Header names listed in `Connection`, which are hop-by-hop for this hop.
fn connection_listed(headers: &HeaderMap) -> HashSet<String> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
}

fn is_hop_by_hop(name: &HeaderName, connection_named: &HashSet<String>) -> bool {
    HOP_BY_HOP.contains(&name.as_str()) || connection_named.contains(name.as_str())
}

fn set(headers: &mut HeaderMap, name: &'static str, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => tracing::warn!(header = name, "Dropping header with non-visible characters"),
    }
}
