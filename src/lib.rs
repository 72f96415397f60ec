//! Portfolio API gateway library.
//!
//! Every request passes rate limiting, authentication and authorization
//! before it is forwarded to a backend service.

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod security;
pub mod upstream;

#[cfg(test)]
mod testutil;

pub use config::schema::GatewayConfig;
pub use error::GatewayError;
pub use http::HttpServer;
pub use lifecycle::{GatewayComponents, Shutdown};
