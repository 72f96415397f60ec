//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use crate::config::schema::{CounterStoreKind, GatewayConfig, LogFormat};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: {message}")]
    Env { var: &'static str, message: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, apply environment overrides and validate configuration.
///
/// Without a path the built-in defaults are the starting point.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => GatewayConfig::default(),
    };

    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay environment-level settings onto a parsed configuration.
///
/// `lookup` abstracts the process environment so overrides can be tested
/// without mutating global state.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(addr) = lookup("GATEWAY_BIND_ADDRESS") {
        config.listener.bind_address = addr;
    }
    if let Some(url) = lookup("GATEWAY_ISSUER_URL") {
        config.auth.issuer_url = url;
    }
    if let Some(issuer) = lookup("GATEWAY_ISSUER") {
        config.auth.issuer = issuer;
    }
    if let Some(url) = lookup("GATEWAY_JWKS_URL") {
        config.auth.jwks_url = Some(url);
    }
    if let Some(audience) = lookup("GATEWAY_AUDIENCE") {
        config.auth.audience = audience;
    }
    if let Some(algs) = lookup("GATEWAY_ALLOWED_ALGORITHMS") {
        config.auth.allowed_algorithms = algs
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect();
    }
    if let Some(url) = lookup("GATEWAY_REDIS_URL") {
        config.rate_limit.store = CounterStoreKind::Redis;
        config.rate_limit.redis_url = Some(url);
    }
    if let Some(level) = lookup("GATEWAY_LOG_LEVEL") {
        config.observability.log_level = level;
    }
    if let Some(format) = lookup("GATEWAY_LOG_FORMAT") {
        config.observability.log_format = match format.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            other => {
                return Err(ConfigError::Env {
                    var: "GATEWAY_LOG_FORMAT",
                    message: format!("expected 'json' or 'pretty', got '{}'", other),
                })
            }
        };
    }

    Ok(())
}
