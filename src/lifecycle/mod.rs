//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → routes → key resolver → verifier
//!         → counter store → rate limiter → forwarder → GatewayComponents
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     Trigger → server stops accepting → in-flight requests drain → exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then components, then the listener
//! - Configuration is not reloaded; a restart picks up changes

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::{spawn_signal_handler, wait_for_signal};
pub use startup::{GatewayComponents, StartupError};
