//! Route lookup.
//!
//! # Responsibilities
//! - Compile `RouteConfig` entries into immutable `RouteRule`s
//! - Look up the first rule matching (method, path)
//! - Return the matched rule or an explicit `RouteNotFound`
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) ordered scan, first match wins; table order is config order
//! - Explicit no-match rather than a silent default route

use std::sync::Arc;

use axum::http::Method;
use url::Url;

use crate::auth::guard::AuthRequirement;
use crate::auth::identity::{Permission, Role};
use crate::config::RouteConfig;
use crate::error::GatewayError;
use crate::routing::matcher::{MethodMatcher, PathParams, PathPattern, RouteError};

/// A compiled route.
#[derive(Debug, Clone)]
pub struct RouteRule {
    pub name: String,
    pub pattern: PathPattern,
    pub method: MethodMatcher,
    pub target: Url,
    /// `host:port` of the target, used to key per-target limits.
    pub target_authority: String,
    pub auth_required: bool,
    pub rate_limit_class: String,
    pub requirement: AuthRequirement,
}

impl RouteRule {
    pub fn from_config(config: &RouteConfig) -> Result<Self, RouteError> {
        let pattern = PathPattern::parse(&config.path)?;
        let method = MethodMatcher::parse(&config.method)?;
        let (target, target_authority) = parse_target(&config.target)?;

        let roles = config
            .roles
            .iter()
            .map(|r| Role::parse(r).ok_or_else(|| RouteError::InvalidRole(r.clone())))
            .collect::<Result<_, _>>()?;
        let permissions = config
            .permissions
            .iter()
            .map(|p| Permission::parse(p).ok_or_else(|| RouteError::InvalidPermission(p.clone())))
            .collect::<Result<_, _>>()?;

        Ok(Self {
            name: config.name.clone(),
            pattern,
            method,
            target,
            target_authority,
            auth_required: config.auth_required,
            rate_limit_class: config.rate_limit_class.clone(),
            requirement: AuthRequirement { roles, permissions },
        })
    }

    /// Outbound URL: the target base URL (including any path prefix of its
    /// own) followed by the request path and query.
    pub fn outbound_url(&self, path: &str, query: Option<&str>) -> String {
        let base = self.target.as_str().trim_end_matches('/');
        let path = if path.starts_with('/') { path.to_string() } else { format!("/{}", path) };
        match query {
            Some(q) if !q.is_empty() => format!("{}{}?{}", base, path, q),
            _ => format!("{}{}", base, path),
        }
    }
}

fn parse_target(raw: &str) -> Result<(Url, String), RouteError> {
    let invalid = |reason: &str| RouteError::InvalidTarget {
        target: raw.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(raw.trim()).map_err(|e| invalid(&e.to_string()))?;
    if url.scheme() != "http" {
        return Err(invalid("only http:// targets are supported"));
    }
    let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("must not carry a query or fragment"));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(invalid("must not carry credentials"));
    }
    let port = url.port_or_known_default().ok_or_else(|| invalid("missing port"))?;
    let authority = format!("{}:{}", host, port);

    Ok((url, authority))
}

/// A successful lookup.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub rule: Arc<RouteRule>,
    pub params: PathParams,
}

/// Ordered, immutable route table.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    rules: Vec<Arc<RouteRule>>,
}

impl RouteTable {
    pub fn new(rules: Vec<RouteRule>) -> Self {
        Self {
            rules: rules.into_iter().map(Arc::new).collect(),
        }
    }

    /// Compile a table, failing on the first bad route. Config validation
    /// reports every bad route before this runs.
    pub fn from_config(routes: &[RouteConfig]) -> Result<Self, RouteError> {
        let rules = routes
            .iter()
            .map(RouteRule::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(rules))
    }

    pub fn match_route(&self, method: &Method, path: &str) -> Result<RouteMatch, GatewayError> {
        self.rules
            .iter()
            .filter(|rule| rule.method.matches(method))
            .find_map(|rule| {
                rule.pattern.matches(path).map(|params| RouteMatch {
                    rule: rule.clone(),
                    params,
                })
            })
            .ok_or_else(|| GatewayError::RouteNotFound {
                method: method.clone(),
                path: path.to_string(),
            })
    }

    pub fn rules(&self) -> &[Arc<RouteRule>] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
