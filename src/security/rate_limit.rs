//! Fixed-window rate limiting per (client, rate class).
//!
//! Windows are aligned to wall-clock multiples of the class window. Every
//! request increments its window's counter, including rejected ones, so a
//! flood keeps the client limited until the window rolls over.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use crate::config::RateLimitConfig;
use crate::error::GatewayError;
use crate::observability::metrics;
use crate::security::clock::Clock;
use crate::security::store::CounterStore;

/// Who a counter belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClientKey {
    Identity(String),
    Ip(IpAddr),
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientKey::Identity(subject) => write!(f, "user:{}", subject),
            ClientKey::Ip(ip) => write!(f, "ip:{}", ip),
        }
    }
}

/// A named limit: at most `max_requests` per `window_secs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateClass {
    pub name: String,
    pub window_secs: u64,
    pub max_requests: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Rejected { class: String, retry_after_secs: u64 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }

    pub fn into_result(self) -> Result<(), GatewayError> {
        match self {
            RateDecision::Allowed => Ok(()),
            RateDecision::Rejected { class, retry_after_secs } => {
                Err(GatewayError::RateLimitExceeded { class, retry_after_secs })
            }
        }
    }
}

pub struct RateLimiter {
    enabled: bool,
    classes: HashMap<String, RateClass>,
    default_class: String,
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(
        classes: Vec<RateClass>,
        default_class: impl Into<String>,
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            enabled: true,
            classes: classes.into_iter().map(|c| (c.name.clone(), c)).collect(),
            default_class: default_class.into(),
            store,
            clock,
        }
    }

    pub fn from_config(config: &RateLimitConfig, store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        let classes = config
            .classes
            .iter()
            .map(|(name, class)| RateClass {
                name: name.clone(),
                window_secs: class.window_secs,
                max_requests: class.max_requests,
            })
            .collect();
        let mut limiter = Self::new(classes, config.default_class.clone(), store, clock);
        limiter.enabled = config.enabled;
        limiter
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Resolve a class by name, falling back to the default class.
    pub fn class(&self, name: &str) -> Option<&RateClass> {
        self.classes
            .get(name)
            .or_else(|| self.classes.get(&self.default_class))
    }

    /// Count this request and decide. Store failures allow the request.
    pub async fn check(&self, key: &ClientKey, class_name: &str) -> RateDecision {
        if !self.enabled {
            return RateDecision::Allowed;
        }
        let Some(class) = self.class(class_name) else {
            tracing::warn!(class = class_name, "No rate limit class configured, allowing request");
            return RateDecision::Allowed;
        };
        if class.window_secs == 0 {
            return RateDecision::Allowed;
        }

        let now = self.clock.now_secs();
        let window_start = now - now % class.window_secs;
        let counter_key = format!("{}|{}", key, class.name);

        let count = match self
            .store
            .increment(&counter_key, window_start, class.window_secs)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                metrics::record_store_error(self.store.name());
                tracing::warn!(
                    store = self.store.name(),
                    class = %class.name,
                    error = %e,
                    "Rate limit store unavailable, allowing request"
                );
                return RateDecision::Allowed;
            }
        };

        if count <= class.max_requests {
            return RateDecision::Allowed;
        }

        let retry_after_secs = (window_start + class.window_secs).saturating_sub(now).max(1);
        metrics::record_rate_limited(&class.name);
        tracing::debug!(
            client = %key,
            class = %class.name,
            count,
            limit = class.max_requests,
            retry_after_secs,
            "Rate limit exceeded"
        );
        RateDecision::Rejected {
            class: class.name.clone(),
            retry_after_secs,
        }
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("enabled", &self.enabled)
            .field("classes", &self.classes)
            .field("default_class", &self.default_class)
            .field("store", &self.store.name())
            .finish()
    }
}

/// "1 minute", "2 minutes", "45 seconds".
pub fn humanize_retry_after(secs: u64) -> String {
    let plural = |n: u64, unit: &str| {
        if n == 1 {
            format!("1 {}", unit)
        } else {
            format!("{} {}s", n, unit)
        }
    };
    if secs >= 60 && secs % 60 == 0 {
        plural(secs / 60, "minute")
    } else {
        plural(secs, "second")
    }
}
