//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (environment overrides: GATEWAY_*)
//!     → validation.rs (semantic checks, route compilation)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changing routes requires a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AuthConfig, CounterStoreKind, GatewayConfig, ListenerConfig, LogFormat, ObservabilityConfig,
    RateClassConfig, RateLimitConfig, RouteConfig, TimeoutConfig, UpstreamConfig,
};
pub use validation::ValidationError;
