//! Two-tier byte cache: an in-process L1 with TTL in front of a shared L2.
//!
//! `Cache` is the capability interface for the L2 tier — a production
//! `RedisCache` and an in-memory `FakeCache` both implement it, so callers
//! (and their tests) depend on the trait, never on Redis directly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::RwLock;

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set_bytes(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;
}

/// Redis-backed L2 cache.
pub struct RedisCache {
    conn: redis::aio::ConnectionManager,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("invalid redis url")?;
        let conn = client
            .get_connection_manager()
            .await
            .context("failed to connect to redis")?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(key).await.context("redis GET failed")?;
        Ok(value)
    }

    async fn set_bytes(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, seconds)
            .await
            .context("redis SETEX failed")?;
        Ok(())
    }
}

/// In-memory stand-in for `Cache`, for tests and single-process deployments
/// that have no Redis configured.
#[derive(Default)]
pub struct FakeCache {
    entries: RwLock<HashMap<String, (Instant, Vec<u8>)>>,
}

impl FakeCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for FakeCache {
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).and_then(|(expires_at, value)| {
            if *expires_at > Instant::now() {
                Some(value.clone())
            } else {
                None
            }
        }))
    }

    async fn set_bytes(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), (Instant::now() + ttl, value));
        Ok(())
    }
}

/// A small in-process cache sitting in front of an L2 `Cache`, so repeated
/// lookups for the same key within one process don't round-trip to Redis.
/// Consulted first; on miss, falls through to L2 and backfills L1.
pub struct L1L2Cache {
    l1: RwLock<HashMap<String, (Instant, Vec<u8>)>>,
    l1_ttl: Duration,
    l2: Arc<dyn Cache>,
}

impl L1L2Cache {
    pub fn new(l2: Arc<dyn Cache>, l1_ttl: Duration) -> Self {
        Self {
            l1: RwLock::new(HashMap::new()),
            l1_ttl,
            l2,
        }
    }

    pub async fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        if let Some(hit) = self.l1_get(key).await {
            return Ok(Some(serde_json::from_slice(&hit).context("l1 json decode failed")?));
        }
        match self.l2.get_bytes(key).await? {
            Some(bytes) => {
                self.l1_put(key, bytes.clone()).await;
                Ok(Some(serde_json::from_slice(&bytes).context("l2 json decode failed")?))
            }
            None => Ok(None),
        }
    }

    pub async fn set_json<T: serde::Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<()> {
        let bytes = serde_json::to_vec(value).context("json encode failed")?;
        self.l2.set_bytes(key, bytes.clone(), ttl).await?;
        self.l1_put(key, bytes).await;
        Ok(())
    }

    pub async fn invalidate(&self, key: &str) {
        self.l1.write().await.remove(key);
    }

    async fn l1_get(&self, key: &str) -> Option<Vec<u8>> {
        let entries = self.l1.read().await;
        entries.get(key).and_then(|(expires_at, value)| {
            if *expires_at > Instant::now() {
                Some(value.clone())
            } else {
                None
            }
        })
    }

    async fn l1_put(&self, key: &str, value: Vec<u8>) {
        let mut entries = self.l1.write().await;
        entries.insert(key.to_string(), (Instant::now() + self.l1_ttl, value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_cache_respects_ttl() {
        let cache = FakeCache::new();
        cache
            .set_bytes("k", b"v".to_vec(), Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(cache.get_bytes("k").await.unwrap(), Some(b"v".to_vec()));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get_bytes("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn l1l2_backfills_l1_from_l2_on_miss() {
        let l2 = Arc::new(FakeCache::new());
        l2.set_bytes("name", b"\"Jita\"".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        let tiered = L1L2Cache::new(l2, Duration::from_secs(60));

        let value: Option<String> = tiered.get_json("name").await.unwrap();
        assert_eq!(value.as_deref(), Some("Jita"));

        // Second read must come from L1 without touching L2 again; there is
        // no observable difference here other than it still returning the
        // same value, which confirms the backfill path didn't corrupt data.
        let value_again: Option<String> = tiered.get_json("name").await.unwrap();
        assert_eq!(value_again.as_deref(), Some("Jita"));
    }
}
