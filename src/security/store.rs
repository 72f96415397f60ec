//! Rate-limit counter stores.
//!
//! # Design Decisions
//! - One counter per (client key, class, window start); a new window is a
//!   new counter, old ones are left to expire
//! - Increment-and-read is a single atomic step in every store
//! - The Redis store bounds each call with a short timeout; the caller
//!   decides what an error means (the rate limiter fails open)
//!
//! # Cross-replica consistency
//!
//! With the Redis store every replica shares one counter per window. When
//! Redis is unreachable each replica fails open on its own: no local
//! fallback counting is attempted, so during an outage the effective limit
//! is unenforced rather than multiplied by the replica count.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;

/// Purge stale in-memory windows every this many increments.
const PURGE_INTERVAL: u64 = 4096;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("counter store timed out after {0:?}")]
    Timeout(Duration),
}

/// Atomic fixed-window counters.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment the counter for `key` in the window starting at
    /// `window_start` and return the post-increment count.
    async fn increment(&self, key: &str, window_start: u64, window_secs: u64) -> Result<u64, StoreError>;

    /// Store name for logs and metrics.
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    window_start: u64,
    window_secs: u64,
    count: u64,
}

impl WindowCounter {
    fn expired_at(&self, now: u64) -> bool {
        self.window_start.saturating_add(self.window_secs) <= now
    }
}

/// Process-local counters. Not shared between replicas.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    counters: DashMap<String, WindowCounter>,
    increments: AtomicU64,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop counters whose own window has ended by `now`. Each counter is
    /// judged by its own class window, so a short class never evicts a
    /// longer one mid-window.
    pub fn purge_expired(&self, now: u64) {
        self.counters.retain(|_, counter| !counter.expired_at(now));
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str, window_start: u64, window_secs: u64) -> Result<u64, StoreError> {
        let count = {
            // The entry guard holds the shard lock, so reset-or-increment is atomic.
            let mut entry = self
                .counters
                .entry(key.to_string())
                .or_insert(WindowCounter { window_start, window_secs, count: 0 });
            if entry.window_start < window_start {
                *entry = WindowCounter { window_start, window_secs, count: 0 };
            }
            entry.count += 1;
            entry.count
        };

        if self.increments.fetch_add(1, Ordering::Relaxed) % PURGE_INTERVAL == PURGE_INTERVAL - 1 {
            // The caller's window start is a lower bound on the current time.
            self.purge_expired(window_start);
        }

        Ok(count)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Counters shared between replicas through Redis.
#[derive(Clone)]
pub struct RedisCounterStore {
    conn: ConnectionManager,
    timeout: Duration,
    prefix: String,
}

impl RedisCounterStore {
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::from_connection(conn, timeout))
    }

    pub fn from_connection(conn: ConnectionManager, timeout: Duration) -> Self {
        Self {
            conn,
            timeout,
            prefix: "gateway:ratelimit".to_string(),
        }
    }

    fn redis_key(&self, key: &str, window_start: u64) -> String {
        format!("{}:{}:{}", self.prefix, key, window_start)
    }
}

impl std::fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("timeout", &self.timeout)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str, window_start: u64, window_secs: u64) -> Result<u64, StoreError> {
        let redis_key = self.redis_key(key, window_start);
        // ConnectionManager clones share one multiplexed connection.
        let mut conn = self.conn.clone();
        // One extra window so a counter outlives clock skew between replicas.
        let ttl = (window_secs * 2) as i64;

        let query = async {
            let (count,): (u64,) = redis::pipe()
                .atomic()
                .incr(&redis_key, 1u64)
                .expire(&redis_key, ttl)
                .ignore()
                .query_async(&mut conn)
                .await?;
            Ok::<u64, redis::RedisError>(count)
        };

        match tokio::time::timeout(self.timeout, query).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
