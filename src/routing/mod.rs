//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → router.rs (ordered rule scan)
//!     → matcher.rs (method + segment pattern)
//!     → Return: RouteMatch { rule, params } or RouteNotFound
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → Parse patterns, methods, targets, requirements
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime; changes need a restart
//! - No regex in hot path
//! - Deterministic: same input always matches same route
//! - First match wins (config order)

pub mod matcher;
pub mod router;

pub use matcher::{MethodMatcher, PathParams, PathPattern, RouteError};
pub use router::{RouteMatch, RouteRule, RouteTable};
