//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference existing rate classes)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Compile every route pattern once so bad patterns fail at startup
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use url::Url;

use crate::auth::identity::{Permission, Role};
use crate::auth::token::parse_algorithm;
use crate::config::schema::{CounterStoreKind, GatewayConfig};
use crate::routing::router::RouteRule;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_listener(config, &mut errors);
    validate_auth(config, &mut errors);
    validate_rate_limit(config, &mut errors);
    validate_routes(config, &mut errors);

    if config.timeouts.connect_ms == 0 {
        errors.push(ValidationError::new("timeouts.connect_ms", "must be greater than 0"));
    }
    if config.timeouts.response_secs == 0 {
        errors.push(ValidationError::new("timeouts.response_secs", "must be greater than 0"));
    }
    if config.upstream.max_in_flight_per_target == 0 {
        errors.push(ValidationError::new(
            "upstream.max_in_flight_per_target",
            "must be greater than 0",
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_listener(config: &GatewayConfig, errors: &mut Vec<ValidationError>) {
    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }
}

fn validate_auth(config: &GatewayConfig, errors: &mut Vec<ValidationError>) {
    let auth = &config.auth;

    if auth.issuer.trim().is_empty() {
        errors.push(ValidationError::new("auth.issuer", "must not be empty"));
    }
    if auth.audience.trim().is_empty() {
        errors.push(ValidationError::new("auth.audience", "must not be empty"));
    }

    let endpoint = auth.jwks_endpoint();
    match Url::parse(&endpoint) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(ValidationError::new(
            "auth.jwks_url",
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(
            "auth.jwks_url",
            format!("'{}' is not a URL: {}", endpoint, e),
        )),
    }

    if auth.allowed_algorithms.is_empty() {
        errors.push(ValidationError::new("auth.allowed_algorithms", "must not be empty"));
    }
    for alg in &auth.allowed_algorithms {
        if let Err(message) = parse_algorithm(alg) {
            errors.push(ValidationError::new("auth.allowed_algorithms", message));
        }
    }

    if auth.key_cache_ttl_secs == 0 {
        errors.push(ValidationError::new("auth.key_cache_ttl_secs", "must be greater than 0"));
    }
    if auth.jwks_timeout_secs == 0 {
        errors.push(ValidationError::new("auth.jwks_timeout_secs", "must be greater than 0"));
    }
    if auth.cookie_name.trim().is_empty() {
        errors.push(ValidationError::new("auth.cookie_name", "must not be empty"));
    }
    if auth.allow_query_token && auth.query_param.trim().is_empty() {
        errors.push(ValidationError::new("auth.query_param", "must not be empty"));
    }

    for role in &auth.known_roles {
        if Role::parse(role).is_none() {
            errors.push(ValidationError::new("auth.known_roles", format!("invalid role '{}'", role)));
        }
    }
    for permission in &auth.known_permissions {
        if Permission::parse(permission).is_none() {
            errors.push(ValidationError::new(
                "auth.known_permissions",
                format!("invalid permission '{}'", permission),
            ));
        }
    }
}

fn validate_rate_limit(config: &GatewayConfig, errors: &mut Vec<ValidationError>) {
    let rate_limit = &config.rate_limit;

    if rate_limit.classes.is_empty() {
        errors.push(ValidationError::new("rate_limit.classes", "at least one class is required"));
    }
    if !rate_limit.classes.contains_key(&rate_limit.default_class) {
        errors.push(ValidationError::new(
            "rate_limit.default_class",
            format!("unknown class '{}'", rate_limit.default_class),
        ));
    }
    for (name, class) in &rate_limit.classes {
        if class.window_secs == 0 {
            errors.push(ValidationError::new(
                format!("rate_limit.classes.{}.window_secs", name),
                "must be greater than 0",
            ));
        }
        if class.max_requests == 0 {
            errors.push(ValidationError::new(
                format!("rate_limit.classes.{}.max_requests", name),
                "must be greater than 0",
            ));
        }
    }
    if rate_limit.store == CounterStoreKind::Redis && rate_limit.redis_url.is_none() {
        errors.push(ValidationError::new(
            "rate_limit.redis_url",
            "required when store = \"redis\"",
        ));
    }
    if rate_limit.redis_timeout_ms == 0 {
        errors.push(ValidationError::new("rate_limit.redis_timeout_ms", "must be greater than 0"));
    }
}

fn validate_routes(config: &GatewayConfig, errors: &mut Vec<ValidationError>) {
    let mut names = HashSet::new();

    for (index, route) in config.routes.iter().enumerate() {
        let field = format!("routes[{}]", index);

        if !names.insert(route.name.as_str()) {
            errors.push(ValidationError::new(
                &field,
                format!("duplicate route name '{}'", route.name),
            ));
        }
        if let Err(e) = RouteRule::from_config(route) {
            errors.push(ValidationError::new(&field, e.to_string()));
        }
        if !config.rate_limit.classes.contains_key(&route.rate_limit_class) {
            errors.push(ValidationError::new(
                &field,
                format!("unknown rate limit class '{}'", route.rate_limit_class),
            ));
        }
        if !route.auth_required && (!route.roles.is_empty() || !route.permissions.is_empty()) {
            errors.push(ValidationError::new(
                &field,
                "roles/permissions require auth_required = true",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::RouteConfig;

    fn route(name: &str, path: &str) -> RouteConfig {
        RouteConfig {
            name: name.to_string(),
            path: path.to_string(),
            method: "GET".to_string(),
            target: "http://127.0.0.1:3001".to_string(),
            auth_required: false,
            rate_limit_class: "standard".to_string(),
            roles: Vec::new(),
            permissions: Vec::new(),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "not-an-address".to_string();
        config.auth.allowed_algorithms = vec!["none".to_string(), "HS256".to_string()];
        config.rate_limit.default_class = "missing".to_string();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();

        assert!(fields.contains(&"listener.bind_address"));
        assert_eq!(
            fields.iter().filter(|f| **f == "auth.allowed_algorithms").count(),
            2
        );
        assert!(fields.contains(&"rate_limit.default_class"));
    }

    #[test]
    fn test_route_errors() {
        let mut config = GatewayConfig::default();
        config.routes.push(route("a", "/api/*"));
        config.routes.push(route("a", "/api/ok"));
        let mut unknown_class = route("b", "/api/b");
        unknown_class.rate_limit_class = "gold".to_string();
        config.routes.push(unknown_class);
        let mut guarded_public = route("c", "/api/c");
        guarded_public.roles = vec!["admin".to_string()];
        config.routes.push(guarded_public);

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4, "{:?}", errors);
        assert!(errors.iter().any(|e| e.message.contains("duplicate route name")));
        assert!(errors.iter().any(|e| e.message.contains("unknown rate limit class 'gold'")));
    }

    #[test]
    fn test_redis_store_requires_url() {
        let mut config = GatewayConfig::default();
        config.rate_limit.store = CounterStoreKind::Redis;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "rate_limit.redis_url");
    }
}
