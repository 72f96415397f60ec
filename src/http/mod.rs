//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, limits)
//!     → /health → health.rs
//!     → anything else → pipeline.rs
//!         (route → rate limit → authenticate → authorize → forward)
//!     → response.rs (errors rendered as JSON)
//!     → Send to client
//! ```

pub mod health;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod server;

pub use pipeline::{Pipeline, RequestLifecycle, RequestState};
pub use request::X_REQUEST_ID;
pub use response::ErrorBody;
pub use server::{AppState, HttpServer};
