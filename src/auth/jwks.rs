//! Issuer key set resolution.
//!
//! # Cache Behavior
//!
//! - The whole key set is cached as one immutable [`CachedKeySet`] and
//!   replaced atomically on refresh; individual keys are never patched.
//! - TTL expiry or a `kid` miss triggers one forced refresh.
//! - Refreshes are single-flight: callers that queued behind an in-progress
//!   refresh reuse its result instead of fetching again.
//! - If a refresh fails and an expired set still holds the requested key,
//!   the stale key is served.
//!
//! # Lifecycle
//!
//! `KeyResolver::new` (empty) → `warm` (startup fetch, warn-only) →
//! `resolve`/`refresh` (lazy) → `clear` (drop cached keys).

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::observability::metrics;

/// Connect timeout for key set fetches.
const JWKS_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Key resolution errors.
#[derive(Debug, thiserror::Error)]
pub enum KeyResolverError {
    #[error("Signing key not found: {kid}")]
    KeyNotFound { kid: String },

    #[error("Failed to fetch key set from {url}: {error}")]
    FetchFailed { url: String, error: String },

    #[error("Failed to parse key set from {url}: {error}")]
    ParseFailed { url: String, error: String },
}

/// One entry of a published key set document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwkEntry {
    pub kid: Option<String>,
    pub kty: String,
    pub alg: Option<String>,
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    pub n: Option<String>,
    pub e: Option<String>,
}

/// `{ "keys": [...] }` as served from `/.well-known/jwks.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct JwkSetDocument {
    pub keys: Vec<JwkEntry>,
}

/// Where key set documents come from.
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn fetch(&self) -> Result<JwkSetDocument, KeyResolverError>;

    /// Human-readable location for logs.
    fn location(&self) -> &str;
}

/// Fetches the key set over HTTP.
pub struct HttpKeySource {
    client: reqwest::Client,
    url: String,
}

impl HttpKeySource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(JWKS_CONNECT_TIMEOUT.min(timeout))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl KeySource for HttpKeySource {
    async fn fetch(&self) -> Result<JwkSetDocument, KeyResolverError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| KeyResolverError::FetchFailed {
                url: self.url.clone(),
                error: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(KeyResolverError::FetchFailed {
                url: self.url.clone(),
                error: format!("HTTP {}", response.status()),
            });
        }

        response
            .json::<JwkSetDocument>()
            .await
            .map_err(|e| KeyResolverError::ParseFailed {
                url: self.url.clone(),
                error: e.to_string(),
            })
    }

    fn location(&self) -> &str {
        &self.url
    }
}

/// A public verification key. Immutable once cached.
#[derive(Clone)]
pub struct SigningKey {
    pub id: String,
    /// Algorithm pinned by the issuer, when the key set publishes one.
    pub algorithm: Option<Algorithm>,
    pub decoding_key: DecodingKey,
    pub fetched_at: Instant,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("id", &self.id)
            .field("algorithm", &self.algorithm)
            .field("fetched_at", &self.fetched_at)
            .finish_non_exhaustive()
    }
}

/// A complete key set snapshot.
#[derive(Debug)]
pub struct CachedKeySet {
    keys: HashMap<String, Arc<SigningKey>>,
    fetched_at: Instant,
    ttl: Duration,
    generation: u64,
}

impl CachedKeySet {
    pub fn get(&self, kid: &str) -> Option<Arc<SigningKey>> {
        self.keys.get(kid).cloned()
    }

    pub fn is_expired(&self) -> bool {
        self.fetched_at.elapsed() >= self.ttl
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Increments on every successful refresh.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn key_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

/// Resolves signing keys by id from the issuer's published key set.
pub struct KeyResolver {
    source: Arc<dyn KeySource>,
    allowed_algorithms: Vec<Algorithm>,
    ttl: Duration,
    cache: ArcSwapOption<CachedKeySet>,
    /// Serialises refreshes; held across the fetch.
    refresh_lock: Mutex<()>,
    /// Refreshes finished, successful or not.
    completed_refreshes: AtomicU64,
    generation: AtomicU64,
}

impl KeyResolver {
    pub fn new(source: Arc<dyn KeySource>, allowed_algorithms: Vec<Algorithm>, ttl: Duration) -> Self {
        Self {
            source,
            allowed_algorithms,
            ttl,
            cache: ArcSwapOption::empty(),
            refresh_lock: Mutex::new(()),
            completed_refreshes: AtomicU64::new(0),
            generation: AtomicU64::new(0),
        }
    }

    /// Fetch the key set once at startup. Failure is logged, not fatal.
    pub async fn warm(&self) -> bool {
        match self.refresh().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    source = self.source.location(),
                    error = %e,
                    "Failed to fetch signing keys at startup (will retry on first token)"
                );
                false
            }
        }
    }

    /// Look up a key by id, refreshing at most once on a miss or expiry.
    pub async fn resolve(&self, kid: &str) -> Result<Arc<SigningKey>, KeyResolverError> {
        // Read the counter before the cache so a refresh landing in between
        // is detected below.
        let completed_seen = self.completed_refreshes.load(Ordering::Acquire);
        let observed = self.cache.load_full();
        if let Some(set) = &observed {
            if !set.is_expired() {
                if let Some(key) = set.get(kid) {
                    return Ok(key);
                }
            }
        }

        let _guard = self.refresh_lock.lock().await;

        // A refresh finished while we were queued: share its outcome.
        if self.completed_refreshes.load(Ordering::Acquire) != completed_seen {
            return match self.cache.load_full().and_then(|set| set.get(kid)) {
                Some(key) => Ok(key),
                None => Err(KeyResolverError::KeyNotFound { kid: kid.to_string() }),
            };
        }

        tracing::debug!(kid, "Signing key cache miss, refreshing key set");
        match self.fetch_and_swap().await {
            Ok(set) => set.get(kid).ok_or_else(|| {
                tracing::warn!(kid, kid_count = set.len(), "Key id absent after refresh");
                KeyResolverError::KeyNotFound { kid: kid.to_string() }
            }),
            Err(e) => match observed.and_then(|set| set.get(kid)) {
                Some(stale) => {
                    tracing::warn!(kid, error = %e, "Key set refresh failed, serving stale key");
                    Ok(stale)
                }
                None => Err(e),
            },
        }
    }

    /// Unconditionally re-fetch the key set and swap it in.
    pub async fn refresh(&self) -> Result<(), KeyResolverError> {
        let _guard = self.refresh_lock.lock().await;
        self.fetch_and_swap().await.map(|_| ())
    }

    /// Drop the cached key set; the next lookup fetches.
    pub fn clear(&self) {
        self.cache.store(None);
    }

    /// Current snapshot, if any.
    pub fn snapshot(&self) -> Option<Arc<CachedKeySet>> {
        self.cache.load_full()
    }

    /// Number of refreshes finished so far.
    pub fn completed_refreshes(&self) -> u64 {
        self.completed_refreshes.load(Ordering::Acquire)
    }

    /// Must be called with `refresh_lock` held.
    async fn fetch_and_swap(&self) -> Result<Arc<CachedKeySet>, KeyResolverError> {
        let fetched = self.source.fetch().await;
        let document = match fetched {
            Ok(document) => document,
            Err(e) => {
                self.completed_refreshes.fetch_add(1, Ordering::AcqRel);
                metrics::record_jwks_refresh("error");
                return Err(e);
            }
        };

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let set = Arc::new(self.build_key_set(&document, generation));
        self.cache.store(Some(set.clone()));
        self.completed_refreshes.fetch_add(1, Ordering::AcqRel);

        metrics::record_jwks_refresh("success");
        tracing::info!(
            source = self.source.location(),
            kid_count = set.len(),
            generation,
            "Signing key set cached"
        );
        Ok(set)
    }

    fn build_key_set(&self, document: &JwkSetDocument, generation: u64) -> CachedKeySet {
        let fetched_at = Instant::now();
        let mut keys = HashMap::new();

        for entry in &document.keys {
            let Some(kid) = entry.kid.as_deref() else {
                tracing::debug!("Skipping JWK without kid");
                continue;
            };
            if keys.contains_key(kid) {
                tracing::warn!(kid, "Duplicate kid in key set, keeping first occurrence");
                continue;
            }
            match self.decode_entry(entry) {
                Ok((algorithm, decoding_key)) => {
                    keys.insert(
                        kid.to_string(),
                        Arc::new(SigningKey {
                            id: kid.to_string(),
                            algorithm,
                            decoding_key,
                            fetched_at,
                        }),
                    );
                }
                Err(reason) => {
                    tracing::debug!(kid, reason, "Skipping JWK");
                }
            }
        }

        CachedKeySet {
            keys,
            fetched_at,
            ttl: self.ttl,
            generation,
        }
    }

    fn decode_entry(&self, entry: &JwkEntry) -> Result<(Option<Algorithm>, DecodingKey), String> {
        if entry.kty != "RSA" {
            return Err(format!("unsupported key type '{}'", entry.kty));
        }
        if entry.key_use.as_deref().is_some_and(|u| u != "sig") {
            return Err("key is not a signing key".to_string());
        }

        let algorithm = match entry.alg.as_deref() {
            Some(alg) => {
                let alg = Algorithm::from_str(alg).map_err(|_| format!("unknown alg '{}'", alg))?;
                if !self.allowed_algorithms.contains(&alg) {
                    return Err(format!("alg {:?} not allowed", alg));
                }
                Some(alg)
            }
            None => None,
        };

        let (Some(n), Some(e)) = (entry.n.as_deref(), entry.e.as_deref()) else {
            return Err("missing RSA components".to_string());
        };
        let key = DecodingKey::from_rsa_components(n, e).map_err(|e| e.to_string())?;

        Ok((algorithm, key))
    }
}

impl fmt::Debug for KeyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cached = self.cache.load();
        f.debug_struct("KeyResolver")
            .field("source", &self.source.location())
            .field("cached_keys", &cached.as_ref().map(|set| set.len()))
            .field("ttl", &self.ttl)
            .finish()
    }
}
