//! Observability: structured logs and Prometheus metrics.
//!
//! # Data Flow
//! ```text
//! pipeline, key resolver, rate limiter, forwarder
//!     → logging.rs (tracing events, request_id on every rejection)
//!     → metrics.rs (gateway_* counters, gauges, histograms)
//!
//! Sinks:
//!     → stdout (pretty for development, JSON in production)
//!     → Prometheus scrape listener on observability.metrics_address
//! ```
//!
//! # Design Decisions
//! - Client-facing errors stay generic; detail goes to the logs only
//! - Metric labels come from config (route, class, target), never from
//!   request data, so cardinality is bounded

pub mod logging;
pub mod metrics;
