//! Upstream subsystem: forwarding admitted requests to backend services.
//!
//! # Data Flow
//! ```text
//! Admitted request + RouteRule + Identity?
//!     → forwarder.rs build_outbound (URL, headers via security::headers)
//!     → pool.rs (target for rule authority)
//!     → target.rs (claim in-flight slot, CAS bounded)
//!     → hyper-util client (connect timeout, response timeout)
//!     → Response streamed back, slot released when body ends
//! ```
//!
//! # Design Decisions
//! - Single attempt, no retries
//! - A saturated target fails fast without dialing
//! - Transport errors are logged with detail, clients see a generic 503

pub mod forwarder;
pub mod pool;
pub mod target;

pub use forwarder::{build_outbound, ForwardError, Forwarder};
pub use pool::TargetRegistry;
pub use target::{InFlightGuard, UpstreamTarget};
