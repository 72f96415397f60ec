//! Credential extraction.
//!
//! Precedence: `Authorization: Bearer` header, then the session cookie, then
//! the query parameter (when enabled). The first source present wins; later
//! sources are not consulted even if the first one fails verification.

use axum::http::{header, HeaderMap};
use axum_extra::extract::cookie::CookieJar;

use crate::auth::token::{AuthFailure, AuthFailureReason};
use crate::config::AuthConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Header,
    Cookie,
    Query,
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialSource::Header => "header",
            CredentialSource::Cookie => "cookie",
            CredentialSource::Query => "query",
        }
    }
}

/// A raw, unverified bearer credential.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub source: CredentialSource,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("source", &self.source)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CredentialExtractor {
    cookie_name: String,
    query_param: Option<String>,
}

impl CredentialExtractor {
    pub fn new(cookie_name: impl Into<String>, query_param: Option<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            query_param,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            config.cookie_name.clone(),
            config.allow_query_token.then(|| config.query_param.clone()),
        )
    }

    /// Query parameter carrying credentials, if query credentials are enabled.
    pub fn query_param(&self) -> Option<&str> {
        self.query_param.as_deref()
    }

    /// `Ok(None)` when the request carries no credential at all. An
    /// `Authorization` header that is not a non-empty bearer token is
    /// `Malformed`.
    pub fn extract(&self, headers: &HeaderMap, query: Option<&str>) -> Result<Option<Credential>, AuthFailure> {
        if let Some(value) = headers.get(header::AUTHORIZATION) {
            let value = value.to_str().map_err(|_| {
                AuthFailure::new(AuthFailureReason::Malformed, "non-ASCII authorization header")
            })?;
            let token = bearer_token(value).ok_or_else(|| {
                AuthFailure::new(AuthFailureReason::Malformed, "authorization header is not a bearer token")
            })?;
            return Ok(Some(Credential {
                token: token.to_string(),
                source: CredentialSource::Header,
            }));
        }

        let jar = CookieJar::from_headers(headers);
        if let Some(cookie) = jar.get(&self.cookie_name) {
            if !cookie.value().is_empty() {
                return Ok(Some(Credential {
                    token: cookie.value().to_string(),
                    source: CredentialSource::Cookie,
                }));
            }
        }

        if let (Some(param), Some(query)) = (self.query_param.as_deref(), query) {
            let found = url::form_urlencoded::parse(query.as_bytes())
                .find(|(name, value)| name == param && !value.is_empty());
            if let Some((_, value)) = found {
                return Ok(Some(Credential {
                    token: value.into_owned(),
                    source: CredentialSource::Query,
                }));
            }
        }

        Ok(None)
    }
}

fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Remove every occurrence of `param` from a query string. Returns `None`
/// when nothing remains.
pub fn strip_query_param(query: &str, param: &str) -> Option<String> {
    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| {
            let name = pair.split_once('=').map_or(*pair, |(name, _)| name);
            !pair.is_empty() && name != param
        })
        .collect();
    (!kept.is_empty()).then(|| kept.join("&"))
}
