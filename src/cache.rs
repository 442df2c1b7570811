//! Fast ephemeral key/value cache: tenant snapshot lookups, rate counters
//! and near-real-time quota counters.
//!
//! The cache is strictly an accelerator. Every error here is a degradation
//! signal, never a request failure: resolution falls back to the durable
//! store and rate limiting fails open. The gateway holds the cache as an
//! `Option<Arc<dyn FastCache>>` so a deployment without a cache endpoint
//! runs in the same degraded mode from startup.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Per-call bound so a hung cache never stalls the admission path.
const CACHE_OP_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
    #[error("cache operation timed out")]
    Timeout,
}

pub type CacheResult<T> = Result<T, CacheError>;

#[async_trait::async_trait]
pub trait FastCache: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;
    /// Atomic increment; creates the key at 1 when absent.
    async fn incr(&self, key: &str) -> CacheResult<i64>;
    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()>;
}

pub type SharedCache = Arc<dyn FastCache>;

// ---------------------------------------------------------------------------
// Redis-backed implementation
// ---------------------------------------------------------------------------

pub struct RedisCache {
    manager: redis::aio::ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let manager = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self { manager })
    }

    async fn bounded<T>(
        fut: impl std::future::Future<Output = redis::RedisResult<T>>,
    ) -> CacheResult<T> {
        match tokio::time::timeout(CACHE_OP_TIMEOUT, fut).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(CacheError::Unavailable(e.to_string())),
            Err(_) => Err(CacheError::Timeout),
        }
    }
}

#[async_trait::async_trait]
impl FastCache for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        use redis::AsyncCommands;
        let mut con = self.manager.clone();
        Self::bounded(con.get::<_, Option<String>>(key)).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        use redis::AsyncCommands;
        let mut con = self.manager.clone();
        Self::bounded(con.set_ex::<_, _, ()>(key, value, ttl.as_secs())).await
    }

    async fn incr(&self, key: &str) -> CacheResult<i64> {
        use redis::AsyncCommands;
        let mut con = self.manager.clone();
        Self::bounded(con.incr::<_, _, i64>(key, 1)).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()> {
        use redis::AsyncCommands;
        let mut con = self.manager.clone();
        Self::bounded(con.expire::<_, ()>(key, ttl.as_secs() as i64)).await
    }
}

/// Connect to Redis if a URL is configured; `None` means degraded mode
/// (no snapshot cache, no rate limiting) and must not prevent startup.
pub async fn connect_optional(url: Option<&str>) -> Option<SharedCache> {
    let url = url?;
    match RedisCache::connect(url).await {
        Ok(cache) => Some(Arc::new(cache)),
        Err(e) => {
            warn!("fast cache init failed, running degraded: {e}");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation (tests, local development)
// ---------------------------------------------------------------------------

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

/// TTL-aware map with a manually advanceable clock so tests can cross rate
/// windows without sleeping.
#[derive(Default)]
pub struct MemoryCache {
    map: Mutex<HashMap<String, Entry>>,
    skew: Mutex<Duration>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shift the cache's notion of "now" forward.
    pub fn advance(&self, d: Duration) {
        *self.skew.lock() += d;
    }

    fn now(&self) -> Instant {
        Instant::now() + *self.skew.lock()
    }

    fn live_value(&self, key: &str) -> Option<String> {
        let now = self.now();
        let mut map = self.map.lock();
        match map.get(key) {
            Some(e) if e.expires_at.map(|t| t > now).unwrap_or(true) => Some(e.value.clone()),
            Some(_) => {
                map.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait::async_trait]
impl FastCache for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.live_value(key))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let expires_at = Some(self.now() + ttl);
        self.map
            .lock()
            .insert(key.to_string(), Entry { value: value.to_string(), expires_at });
        Ok(())
    }

    async fn incr(&self, key: &str) -> CacheResult<i64> {
        let current = self.live_value(key).and_then(|v| v.parse::<i64>().ok()).unwrap_or(0);
        let next = current + 1;
        let mut map = self.map.lock();
        let expires_at = map.get(key).and_then(|e| e.expires_at);
        map.insert(key.to_string(), Entry { value: next.to_string(), expires_at });
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()> {
        let deadline = self.now() + ttl;
        if let Some(e) = self.map.lock().get_mut(key) {
            e.expires_at = Some(deadline);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_and_expiry() {
        let cache = MemoryCache::new();
        cache.set_ex("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        cache.advance(Duration::from_secs(61));
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn incr_counts_and_resets_after_window() {
        let cache = MemoryCache::new();
        assert_eq!(cache.incr("c").await.unwrap(), 1);
        cache.expire("c", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.incr("c").await.unwrap(), 2);
        cache.advance(Duration::from_secs(61));
        assert_eq!(cache.incr("c").await.unwrap(), 1);
    }
}
