//! Query result caching.
//!
//! The cache only ever holds serialized copies of pages that storage can
//! recompute; it is never the source of truth. Two backends implement
//! [`Cache`]:
//!
//! - [`InMemoryCache`]: a mutex-guarded map with lazy expiry on read and a
//!   size-triggered sweep, used
//!   when no Redis URL is configured and in tests.
//! - [`RedisCache`]: Redis via `fred`, with native key expiry.
//!
//! # Example
//!
//! ```ignore
//! use cinekami_common::cache::{Cache, CacheKeys, InMemoryCache};
//! use std::time::Duration;
//!
//! let cache = InMemoryCache::new();
//! cache.set("tallies:42:limit:20", "{}", Duration::from_secs(120)).await?;
//! cache.delete_prefix(&CacheKeys::tallies_prefix(42)).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fred::clients::Client as RedisClient;
use fred::interfaces::KeysInterface;
use fred::types::Expiration;
use futures::TryStreamExt;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::AppResult;

/// TTL for pages over live data (active movies, tallies).
pub const LIVE_PAGE_TTL: Duration = Duration::from_secs(2 * 60);

/// TTL for pages over archived snapshots, which no longer change.
pub const SNAPSHOT_PAGE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// TTL/key/value cache with point and prefix invalidation.
#[async_trait::async_trait]
pub trait Cache: Send + Sync {
    /// Get a value. Returns `Ok(None)` on a miss or an expired entry.
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Store a value. A zero `ttl` stores without expiry.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;

    /// Remove a single key.
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Remove every key starting with `prefix`. Returns the number removed.
    async fn delete_prefix(&self, prefix: &str) -> AppResult<u64>;
}

/// Builders for the cache keys shared by readers and invalidators.
pub struct CacheKeys;

impl CacheKeys {
    /// Prefix of every active-listing page for a month (`YYYY-MM`).
    #[must_use]
    pub fn active_movies_prefix(month: &str) -> String {
        format!("active_movies:{month}:")
    }

    /// Prefix of every tally page for a movie.
    #[must_use]
    pub fn tallies_prefix(movie_id: i64) -> String {
        format!("tallies:{movie_id}:")
    }

    /// Prefix of every snapshot page for a month (`YYYY-MM`).
    #[must_use]
    pub fn snapshots_prefix(month: &str) -> String {
        format!("snapshots:{month}:")
    }

    /// Key of the archived-months listing.
    #[must_use]
    pub const fn snapshots_available() -> &'static str {
        "snapshots:available"
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Entry count at which `set` first sweeps expired entries.
const SWEEP_THRESHOLD: usize = 1024;

#[derive(Debug)]
struct Store {
    entries: HashMap<String, Entry>,
    /// Length at which the next insert sweeps expired entries.
    sweep_at: usize,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            sweep_at: SWEEP_THRESHOLD,
        }
    }
}

impl Store {
    fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        // Live entries alone keep the map large; back off so inserts stay amortized O(1).
        self.sweep_at = SWEEP_THRESHOLD.max(self.entries.len() * 2);
        before - self.entries.len()
    }
}

/// In-process cache.
///
/// Every read/expiry-check/write sequence runs under one lock so a reader
/// never observes an entry another task is replacing. Keys carry
/// client-supplied parts, so entries that are never read again are
/// dropped by a sweep once the map grows past a threshold.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    store: Arc<Mutex<Store>>,
}

impl InMemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all expired entries. Returns the number dropped.
    pub async fn purge_expired(&self) -> usize {
        self.store.lock().await.purge_expired(Instant::now())
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.store.lock().await.entries.len()
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.store.lock().await.entries.is_empty()
    }
}

#[async_trait::async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut store = self.store.lock().await;
        let Some(entry) = store.entries.get(key) else {
            return Ok(None);
        };
        if entry.is_expired(Instant::now()) {
            store.entries.remove(key);
            return Ok(None);
        }
        Ok(Some(entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let now = Instant::now();
        let expires_at = (!ttl.is_zero()).then(|| now + ttl);
        let mut store = self.store.lock().await;
        if store.entries.len() >= store.sweep_at {
            let dropped = store.purge_expired(now);
            debug!(dropped, remaining = store.entries.len(), "Swept expired cache entries");
        }
        store.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.store.lock().await.entries.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> AppResult<u64> {
        let mut store = self.store.lock().await;
        let before = store.entries.len();
        store.entries.retain(|key, _| !key.starts_with(prefix));
        Ok((before - store.entries.len()) as u64)
    }
}

/// Redis-backed cache. Every key is namespaced under the configured prefix.
#[derive(Clone)]
pub struct RedisCache {
    redis: Arc<RedisClient>,
    namespace: String,
}

/// Number of keys requested per SCAN round trip.
const SCAN_BATCH: u32 = 200;

impl RedisCache {
    /// Create a Redis cache. `namespace` is prepended to every key (e.g. `cinekami`).
    #[must_use]
    pub fn new(redis: Arc<RedisClient>, namespace: impl Into<String>) -> Self {
        Self {
            redis,
            namespace: namespace.into(),
        }
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{key}", self.namespace)
    }

    fn pattern(&self, prefix: &str) -> String {
        let escaped: String = prefix
            .chars()
            .flat_map(|c| match c {
                '*' | '?' | '[' | ']' | '\\' => vec!['\\', c],
                _ => vec![c],
            })
            .collect();
        format!("{}:{escaped}*", self.namespace)
    }
}

#[async_trait::async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let value: Option<String> = self.redis.get(self.key(key)).await?;
        debug!(key = %key, hit = value.is_some(), "Redis cache lookup");
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let expiration = (!ttl.is_zero()).then(|| Expiration::EX(ttl.as_secs().max(1) as i64));
        self.redis
            .set::<(), _, _>(self.key(key), value, expiration, None, false)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.redis.del::<(), _>(self.key(key)).await?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> AppResult<u64> {
        let keys: Vec<_> = self
            .redis
            .scan_buffered(self.pattern(prefix), Some(SCAN_BATCH), None)
            .try_collect()
            .await?;

        if keys.is_empty() {
            return Ok(0);
        }

        let mut removed = 0u64;
        for chunk in keys.chunks(SCAN_BATCH as usize) {
            let count: u64 = self.redis.del(chunk.to_vec()).await?;
            removed += count;
        }
        debug!(prefix = %prefix, removed, "Invalidated Redis cache prefix");
        Ok(removed)
    }
}
