//! Bearer token verification.
//!
//! ```text
//! token → decode header (untrusted) → kid + alg
//!       → alg in allow-list?            (SignatureInvalid)
//!       → KeyResolver::resolve(kid)     (KeyNotFound)
//!       → alg matches the key's alg?    (SignatureInvalid)
//!       → signature + iss/aud/exp/nbf   (SignatureInvalid / Expired / ClaimMismatch)
//!       → claims → Identity             (roles/permissions filtered)
//! ```
//!
//! A failed signature check is final; the only recovery anywhere in this path
//! is the resolver's single forced refresh on an unknown `kid`.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde::Deserialize;

use crate::auth::identity::{Identity, Permission, Role};
use crate::auth::jwks::KeyResolver;
use crate::config::AuthConfig;

/// Reason code attached to every authentication failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthFailureReason {
    MissingCredential,
    KeyNotFound,
    SignatureInvalid,
    Expired,
    ClaimMismatch,
    Malformed,
}

impl AuthFailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthFailureReason::MissingCredential => "MissingCredential",
            AuthFailureReason::KeyNotFound => "KeyNotFound",
            AuthFailureReason::SignatureInvalid => "SignatureInvalid",
            AuthFailureReason::Expired => "Expired",
            AuthFailureReason::ClaimMismatch => "ClaimMismatch",
            AuthFailureReason::Malformed => "Malformed",
        }
    }

    /// Message safe to show to clients.
    pub fn client_message(&self) -> &'static str {
        match self {
            AuthFailureReason::MissingCredential => "Authentication required",
            AuthFailureReason::KeyNotFound => "Token signing key is not recognised",
            AuthFailureReason::SignatureInvalid => "Token signature is invalid",
            AuthFailureReason::Expired => "Token has expired",
            AuthFailureReason::ClaimMismatch => "Token was not issued for this service",
            AuthFailureReason::Malformed => "Token is malformed",
        }
    }
}

impl fmt::Display for AuthFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication failure. `detail` is for logs only.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{reason}: {detail}")]
pub struct AuthFailure {
    pub reason: AuthFailureReason,
    pub detail: String,
}

impl AuthFailure {
    pub fn new(reason: AuthFailureReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

/// Parse an allow-listed algorithm name. Only asymmetric RSA families are
/// accepted; `none` and HMAC algorithms are refused.
pub fn parse_algorithm(name: &str) -> Result<Algorithm, String> {
    let alg = Algorithm::from_str(name).map_err(|_| format!("unknown algorithm '{}'", name))?;
    match alg {
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => Ok(alg),
        other => Err(format!("algorithm {:?} is not an RSA signature algorithm", other)),
    }
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    sub: String,
    exp: i64,
    #[serde(default)]
    iat: Option<i64>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
    #[serde(default)]
    permissions: Vec<String>,
}

/// Static verification policy.
#[derive(Debug, Clone)]
pub struct VerifierSettings {
    pub issuer: String,
    pub audience: String,
    pub allowed_algorithms: Vec<Algorithm>,
    pub leeway_secs: u64,
    pub known_roles: HashSet<String>,
    pub known_permissions: HashSet<String>,
}

impl VerifierSettings {
    /// Build settings from validated config; invalid algorithm names are
    /// rejected by config validation before this runs and skipped here.
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            allowed_algorithms: config
                .allowed_algorithms
                .iter()
                .filter_map(|a| parse_algorithm(a).ok())
                .collect(),
            leeway_secs: config.leeway_secs,
            known_roles: config.known_roles.iter().cloned().collect(),
            known_permissions: config.known_permissions.iter().cloned().collect(),
        }
    }
}

/// Verifies bearer tokens and derives an [`Identity`].
#[derive(Debug)]
pub struct TokenVerifier {
    resolver: Arc<KeyResolver>,
    settings: VerifierSettings,
}

impl TokenVerifier {
    pub fn new(resolver: Arc<KeyResolver>, settings: VerifierSettings) -> Self {
        Self { resolver, settings }
    }

    pub fn resolver(&self) -> &Arc<KeyResolver> {
        &self.resolver
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn verify(&self, token: &str) -> Result<Identity, AuthFailure> {
        let header = decode_header(token).map_err(|e| {
            AuthFailure::new(AuthFailureReason::Malformed, format!("undecodable header: {}", e))
        })?;

        if !self.settings.allowed_algorithms.contains(&header.alg) {
            return Err(AuthFailure::new(
                AuthFailureReason::SignatureInvalid,
                format!("algorithm {:?} not allowed", header.alg),
            ));
        }

        let kid = header
            .kid
            .as_deref()
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| AuthFailure::new(AuthFailureReason::Malformed, "missing kid"))?;

        let key = self
            .resolver
            .resolve(kid)
            .await
            .map_err(|e| AuthFailure::new(AuthFailureReason::KeyNotFound, e.to_string()))?;

        if let Some(pinned) = key.algorithm {
            if pinned != header.alg {
                return Err(AuthFailure::new(
                    AuthFailureReason::SignatureInvalid,
                    format!("key {} is pinned to {:?}, token uses {:?}", kid, pinned, header.alg),
                ));
            }
        }

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[&self.settings.issuer]);
        validation.set_audience(&[&self.settings.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.leeway = self.settings.leeway_secs;
        validation.validate_nbf = true;

        let data = decode::<TokenClaims>(token, &key.decoding_key, &validation).map_err(|e| {
            let reason = classify(e.kind());
            AuthFailure::new(reason, e.to_string())
        })?;

        self.to_identity(data.claims)
    }

    fn to_identity(&self, claims: TokenClaims) -> Result<Identity, AuthFailure> {
        if claims.sub.trim().is_empty() {
            return Err(AuthFailure::new(AuthFailureReason::ClaimMismatch, "empty sub"));
        }

        let expires_at = timestamp(claims.exp)
            .ok_or_else(|| AuthFailure::new(AuthFailureReason::Malformed, "exp out of range"))?;

        let roles = filter_names(&claims.sub, "role", claims.roles, &self.settings.known_roles, Role::parse);
        let permissions = filter_names(
            &claims.sub,
            "permission",
            claims.permissions,
            &self.settings.known_permissions,
            Permission::parse,
        );

        Ok(Identity {
            subject_id: claims.sub,
            email: claims.email.filter(|e| !e.is_empty()),
            roles,
            permissions,
            issued_at: claims.iat.and_then(timestamp),
            expires_at,
        })
    }
}

fn classify(kind: &ErrorKind) -> AuthFailureReason {
    match kind {
        ErrorKind::ExpiredSignature => AuthFailureReason::Expired,
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName
        | ErrorKind::InvalidKeyFormat
        | ErrorKind::InvalidRsaKey(_) => AuthFailureReason::SignatureInvalid,
        ErrorKind::InvalidIssuer
        | ErrorKind::InvalidAudience
        | ErrorKind::InvalidSubject
        | ErrorKind::ImmatureSignature
        | ErrorKind::MissingRequiredClaim(_) => AuthFailureReason::ClaimMismatch,
        _ => AuthFailureReason::Malformed,
    }
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

/// Keep well-formed names that are on the allow-list (when one is configured).
fn filter_names<T: Ord>(
    sub: &str,
    kind: &'static str,
    raw: Vec<String>,
    known: &HashSet<String>,
    parse: fn(&str) -> Option<T>,
) -> BTreeSet<T> {
    let mut accepted = BTreeSet::new();
    for name in raw {
        if !known.is_empty() && !known.contains(&name) {
            tracing::warn!(sub, kind, name = %name, "Discarding claim value not on allow-list");
            continue;
        }
        match parse(&name) {
            Some(value) => {
                accepted.insert(value);
            }
            None => tracing::warn!(sub, kind, name = %name, "Discarding malformed claim value"),
        }
    }
    accepted
}
