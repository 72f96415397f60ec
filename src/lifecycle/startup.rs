//! Startup orchestration.
//!
//! # Responsibilities
//! - Compile the route table from configuration
//! - Build the key resolver, token verifier, rate limiter and forwarder
//! - Connect the counter store and warm the key cache
//!
//! # Design Decisions
//! - Fail fast: an invalid route or unreachable Redis is fatal
//! - An unreachable key endpoint is not; keys are fetched on first use
//! - `build` takes its collaborators as trait objects so tests can run the
//!   full pipeline against in-memory sources

use std::sync::Arc;
use std::time::Duration;

use crate::auth::credentials::CredentialExtractor;
use crate::auth::jwks::{HttpKeySource, KeyResolver, KeySource};
use crate::auth::token::{TokenVerifier, VerifierSettings};
use crate::config::{CounterStoreKind, GatewayConfig};
use crate::http::pipeline::Pipeline;
use crate::routing::{RouteError, RouteTable};
use crate::security::clock::{Clock, SystemClock};
use crate::security::rate_limit::RateLimiter;
use crate::security::store::{CounterStore, MemoryCounterStore, RedisCounterStore, StoreError};
use crate::upstream::Forwarder;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid route: {0}")]
    Route(#[from] RouteError),

    #[error("failed to build key set client: {0}")]
    KeyClient(#[from] reqwest::Error),

    #[error("counter store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("rate_limit.redis_url is required for the redis store")]
    MissingRedisUrl,
}

/// Everything the request pipeline needs, built once at startup.
pub struct GatewayComponents {
    pub routes: Arc<RouteTable>,
    pub verifier: Arc<TokenVerifier>,
    pub limiter: Arc<RateLimiter>,
    pub forwarder: Arc<Forwarder>,
    pub credentials: CredentialExtractor,
}

impl GatewayComponents {
    /// Assemble components from explicit collaborators. Does no I/O.
    pub fn build(
        config: &GatewayConfig,
        key_source: Arc<dyn KeySource>,
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StartupError> {
        let routes = Arc::new(RouteTable::from_config(&config.routes)?);

        let settings = VerifierSettings::from_config(&config.auth);
        let resolver = Arc::new(KeyResolver::new(
            key_source,
            settings.allowed_algorithms.clone(),
            Duration::from_secs(config.auth.key_cache_ttl_secs),
        ));
        let verifier = Arc::new(TokenVerifier::new(resolver, settings));
        let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit, store, clock));
        let forwarder = Arc::new(Forwarder::new(&config.timeouts, &config.upstream, &routes));

        Ok(Self {
            routes,
            verifier,
            limiter,
            forwarder,
            credentials: CredentialExtractor::from_config(&config.auth),
        })
    }

    /// Build production components: HTTP key source, configured counter
    /// store and the system clock. Warms the key cache before returning.
    pub async fn from_config(config: &GatewayConfig) -> Result<Self, StartupError> {
        let key_source = Arc::new(HttpKeySource::new(
            config.auth.jwks_endpoint(),
            Duration::from_secs(config.auth.jwks_timeout_secs),
        )?);

        let store: Arc<dyn CounterStore> = match config.rate_limit.store {
            CounterStoreKind::Memory => Arc::new(MemoryCounterStore::new()),
            CounterStoreKind::Redis => {
                let url = config
                    .rate_limit
                    .redis_url
                    .as_deref()
                    .ok_or(StartupError::MissingRedisUrl)?;
                let timeout = Duration::from_millis(config.rate_limit.redis_timeout_ms);
                Arc::new(RedisCounterStore::connect(url, timeout).await?)
            }
        };
        tracing::info!(store = store.name(), "Counter store ready");

        let components = Self::build(config, key_source, store, Arc::new(SystemClock))?;
        if components.verifier.resolver().warm().await {
            tracing::info!(endpoint = %config.auth.jwks_endpoint(), "Signing keys loaded");
        }
        Ok(components)
    }

    pub fn into_pipeline(self, trust_forwarded_for: bool) -> Pipeline {
        Pipeline::new(
            self.routes,
            self.limiter,
            self.verifier,
            self.credentials,
            self.forwarder,
            trust_forwarded_for,
        )
    }
}
