//! Authentication and authorization subsystem.
//!
//! # Data Flow
//! ```text
//! Request headers / cookie / query
//!     → credentials.rs (extract raw bearer token)
//!     → token.rs (verify signature + claims)
//!         → jwks.rs (resolve signing key by kid, cached, single-flight refresh)
//!     → identity.rs (Identity with validated roles/permissions)
//!     → guard.rs (route role/permission requirement)
//! ```
//!
//! # Design Decisions
//! - Asymmetric algorithms only; the allow-list is explicit and `none` can
//!   never be configured
//! - Key set is process-wide and replaced atomically, never patched
//! - Every failure carries a reason code; details go to logs, not clients

pub mod credentials;
pub mod guard;
pub mod identity;
pub mod jwks;
pub mod token;

pub use credentials::{Credential, CredentialExtractor, CredentialSource};
pub use guard::{authorize, AuthRequirement};
pub use identity::{Identity, Permission, Role};
pub use jwks::{HttpKeySource, KeyResolver, KeyResolverError, KeySource};
pub use token::{AuthFailure, AuthFailureReason, TokenVerifier, VerifierSettings};
