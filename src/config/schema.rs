//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, inbound limits).
    pub listener: ListenerConfig,

    /// Token verification and key resolution settings.
    pub auth: AuthConfig,

    /// Ordered route table. First match wins.
    pub routes: Vec<RouteConfig>,

    /// Rate limiting classes and counter store.
    pub rate_limit: RateLimitConfig,

    /// Timeouts applied to forwarded calls.
    pub timeouts: TimeoutConfig,

    /// Upstream connection settings.
    pub upstream: UpstreamConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Request hardening.
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrently processed inbound requests (backpressure).
    pub max_connections: usize,

    /// Take the client IP from the first `X-Forwarded-For` entry.
    /// Only enable behind a trusted load balancer.
    pub trust_forwarded_for: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
            trust_forwarded_for: false,
        }
    }
}

/// Token verification settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Expected `iss` claim.
    pub issuer: String,

    /// Base URL of the issuer; the key set is published under
    /// `<issuer_url>/.well-known/jwks.json`.
    pub issuer_url: String,

    /// Explicit key set URL, overriding the one derived from `issuer_url`.
    pub jwks_url: Option<String>,

    /// Expected `aud` claim.
    pub audience: String,

    /// Signing algorithms accepted in token headers.
    pub allowed_algorithms: Vec<String>,

    /// How long a fetched key set stays fresh.
    pub key_cache_ttl_secs: u64,

    /// Request timeout for key set fetches.
    pub jwks_timeout_secs: u64,

    /// Clock skew tolerated on `exp`/`nbf`.
    pub leeway_secs: u64,

    /// Cookie carrying the credential when no `Authorization` header is sent.
    pub cookie_name: String,

    /// Query parameter carrying the credential (lowest priority).
    pub query_param: String,

    /// Accept credentials from the query string at all.
    pub allow_query_token: bool,

    /// Roles a token may grant. Empty accepts any well-formed role.
    pub known_roles: Vec<String>,

    /// Permissions a token may grant. Empty accepts any well-formed permission.
    pub known_permissions: Vec<String>,
}

impl AuthConfig {
    /// The URL the key set is fetched from.
    pub fn jwks_endpoint(&self) -> String {
        match &self.jwks_url {
            Some(url) => url.clone(),
            None => format!(
                "{}/.well-known/jwks.json",
                self.issuer_url.trim_end_matches('/')
            ),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "portfolio-api".to_string(),
            issuer_url: "http://localhost:4000".to_string(),
            jwks_url: None,
            audience: "portfolio-client".to_string(),
            allowed_algorithms: vec!["RS256".to_string()],
            key_cache_ttl_secs: 3600,
            jwks_timeout_secs: 10,
            leeway_secs: 30,
            cookie_name: "access_token".to_string(),
            query_param: "token".to_string(),
            allow_query_token: true,
            known_roles: Vec::new(),
            known_permissions: Vec::new(),
        }
    }
}

/// A single route rule.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Path pattern, e.g. `/api/projects/:id`.
    pub path: String,

    /// HTTP method, or `ANY`.
    #[serde(default = "default_method")]
    pub method: String,

    /// Target base URL, e.g. `http://project-service:3002`.
    pub target: String,

    /// Whether a verified credential is mandatory.
    #[serde(default)]
    pub auth_required: bool,

    /// Rate limit class name.
    #[serde(default = "default_rate_class")]
    pub rate_limit_class: String,

    /// Identity must hold at least one of these roles.
    #[serde(default)]
    pub roles: Vec<String>,

    /// Identity must hold all of these permissions.
    #[serde(default)]
    pub permissions: Vec<String>,
}

fn default_method() -> String {
    "ANY".to_string()
}

fn default_rate_class() -> String {
    "standard".to_string()
}

/// Which counter store backs the rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CounterStoreKind {
    #[default]
    Memory,
    Redis,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Class used when a route names an unknown class.
    pub default_class: String,

    /// Counter store backend.
    pub store: CounterStoreKind,

    /// Redis URL, required when `store = "redis"`.
    pub redis_url: Option<String>,

    /// Per-call deadline for Redis operations in milliseconds.
    pub redis_timeout_ms: u64,

    /// Named classes.
    pub classes: BTreeMap<String, RateClassConfig>,
}

/// Window size and maximum for one rate limit class.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct RateClassConfig {
    /// Window length in seconds. Windows are aligned to the wall clock.
    pub window_secs: u64,

    /// Requests admitted per window.
    pub max_requests: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let mut classes = BTreeMap::new();
        classes.insert(
            "standard".to_string(),
            RateClassConfig { window_secs: 60, max_requests: 100 },
        );
        classes.insert(
            "strict".to_string(),
            RateClassConfig { window_secs: 60, max_requests: 10 },
        );
        classes.insert(
            "public".to_string(),
            RateClassConfig { window_secs: 60, max_requests: 300 },
        );

        Self {
            enabled: true,
            default_class: "standard".to_string(),
            store: CounterStoreKind::Memory,
            redis_url: None,
            redis_timeout_ms: 100,
            classes,
        }
    }
}

/// Timeout configuration for forwarded calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in milliseconds.
    pub connect_ms: u64,

    /// Time allowed for the backend to produce a response head, in seconds.
    pub response_secs: u64,

    /// Idle pooled connection timeout in seconds.
    pub idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 2_000,
            response_secs: 30,
            idle_secs: 60,
        }
    }
}

/// Upstream connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Maximum concurrently in-flight calls to any one target.
    pub max_in_flight_per_target: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            max_in_flight_per_target: 100,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum inbound body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}
