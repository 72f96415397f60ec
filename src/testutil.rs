//! Shared helpers for unit tests: fixture RSA keys, key set documents and
//! token minting.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};

use crate::auth::jwks::{JwkSetDocument, KeyResolverError, KeySource};

pub const ISSUER: &str = "portfolio-api";
pub const AUDIENCE: &str = "portfolio-client";

const RSA_KEY_1: &str = include_str!("../tests/fixtures/rsa_key_1.pem");
const RSA_KEY_2: &str = include_str!("../tests/fixtures/rsa_key_2.pem");
const JWKS_BOTH: &str = include_str!("../tests/fixtures/jwks_both.json");

/// Key set containing the fixture keys with the given ids ("1" and/or "2").
pub fn jwks_document(kids: &[&str]) -> JwkSetDocument {
    let all: JwkSetDocument = serde_json::from_str(JWKS_BOTH).unwrap();
    JwkSetDocument {
        keys: all
            .keys
            .into_iter()
            .filter(|k| k.kid.as_deref().is_some_and(|kid| kids.contains(&kid)))
            .collect(),
    }
}

/// Claims accepted by a verifier configured with [`ISSUER`] and [`AUDIENCE`].
pub fn valid_claims(sub: &str, roles: &[&str]) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "iss": ISSUER,
        "aud": AUDIENCE,
        "sub": sub,
        "email": format!("{}@example.com", sub),
        "roles": roles,
        "permissions": [],
        "iat": now,
        "exp": now + 3600,
    })
}

/// Sign `claims` with fixture key `signing_key` ("1" or "2") and put `kid`
/// in the header.
pub fn mint_with(signing_key: &str, kid: Option<&str>, alg: Algorithm, claims: &Value) -> String {
    let pem = match signing_key {
        "1" => RSA_KEY_1,
        "2" => RSA_KEY_2,
        other => panic!("no fixture key {}", other),
    };
    let mut header = Header::new(alg);
    header.kid = kid.map(str::to_string);
    encode(&header, claims, &EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap()).unwrap()
}

pub fn mint(kid: &str, claims: &Value) -> String {
    mint_with(kid, Some(kid), Algorithm::RS256, claims)
}

/// In-memory key source that counts fetches.
pub struct StaticKeySource {
    document: Mutex<JwkSetDocument>,
    fetches: AtomicUsize,
    delay: Duration,
    fail: AtomicBool,
}

impl StaticKeySource {
    pub fn new(document: JwkSetDocument) -> Self {
        Self {
            document: Mutex::new(document),
            fetches: AtomicUsize::new(0),
            delay: Duration::ZERO,
            fail: AtomicBool::new(false),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn replace(&self, document: JwkSetDocument) {
        *self.document.lock().unwrap() = document;
    }

    pub fn fail_next_fetches(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySource for StaticKeySource {
    async fn fetch(&self) -> Result<JwkSetDocument, KeyResolverError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(KeyResolverError::FetchFailed {
                url: "memory://jwks".to_string(),
                error: "injected failure".to_string(),
            });
        }
        Ok(self.document.lock().unwrap().clone())
    }

    fn location(&self) -> &str {
        "memory://jwks"
    }
}
