//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (count per client key + route class, decide)
//!         → store.rs (atomic window counter: memory or Redis)
//!         → clock.rs (window alignment)
//!     → headers.rs (strip hop-by-hop and spoofed identity, add X-Forwarded-*)
//! ```
//!
//! # Design Decisions
//! - Rate limiting runs before authentication, so it keys on client IP
//! - Rate limiting fails open when the shared store is unreachable
//! - No trust in client input: identity headers are always rewritten

pub mod clock;
pub mod headers;
pub mod rate_limit;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use rate_limit::{humanize_retry_after, ClientKey, RateClass, RateDecision, RateLimiter};
pub use store::{CounterStore, MemoryCounterStore, RedisCounterStore, StoreError};
