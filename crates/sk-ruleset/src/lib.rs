//! Ruleset cache (C2): serves the single active admission ruleset from an
//! in-process cache, invalidated across replicas via the shared event bus
//! and falling back to a TTL when pub/sub is unavailable.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use sk_cache::{Bus, BusEvent};
use sk_schemas::Ruleset;
use tokio::sync::RwLock;
use tracing::warn;

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Capability interface over the ruleset's backing store. Production code
/// talks to Postgres; tests substitute an in-memory fake.
#[async_trait]
pub trait RulesetSource: Send + Sync {
    async fn load(&self) -> Result<Ruleset>;
    async fn save(&self, ruleset: &Ruleset) -> Result<Ruleset>;
}

/// Postgres-backed source. Seeds a permissive default on first read so
/// ingestion has something to filter against before an operator has ever
/// configured a ruleset.
pub struct PgRulesetSource {
    pool: sqlx::PgPool,
}

impl PgRulesetSource {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RulesetSource for PgRulesetSource {
    async fn load(&self) -> Result<Ruleset> {
        match sk_db::ruleset::fetch(&self.pool).await? {
            Some(ruleset) => Ok(ruleset),
            None => {
                let mut default = Ruleset::permissive_default("test");
                default.updated_by = "system-default".to_string();
                sk_db::ruleset::upsert(&self.pool, &default).await
            }
        }
    }

    async fn save(&self, ruleset: &Ruleset) -> Result<Ruleset> {
        sk_db::ruleset::upsert(&self.pool, ruleset).await
    }
}

/// In-memory source for tests: starts out permissive, `save` just replaces
/// the held value.
pub struct FakeRulesetSource {
    state: RwLock<Ruleset>,
}

impl FakeRulesetSource {
    pub fn new(initial: Ruleset) -> Self {
        Self {
            state: RwLock::new(initial),
        }
    }
}

impl Default for FakeRulesetSource {
    fn default() -> Self {
        Self::new(Ruleset::permissive_default("test"))
    }
}

#[async_trait]
impl RulesetSource for FakeRulesetSource {
    async fn load(&self) -> Result<Ruleset> {
        Ok(self.state.read().await.clone())
    }

    async fn save(&self, ruleset: &Ruleset) -> Result<Ruleset> {
        ruleset
            .validate()
            .map_err(|e| anyhow::anyhow!("ruleset rejected: {e}"))?;
        let mut guard = self.state.write().await;
        *guard = ruleset.clone();
        Ok(guard.clone())
    }
}

struct Cached {
    ruleset: Ruleset,
    fetched_at: Instant,
}

/// TTL cache over a `RulesetSource`, with cross-replica invalidation via
/// the shared bus. A background task subscribes to `BusEvent::RulesetInvalidated`
/// and drops the cached value as soon as it arrives; a missed or absent
/// pub/sub connection degrades to the TTL, never to staleness beyond it.
pub struct RulesetCache {
    source: Arc<dyn RulesetSource>,
    ttl: Duration,
    cached: Arc<RwLock<Option<Cached>>>,
    bus: Bus,
    redis_url: Option<String>,
}

impl RulesetCache {
    pub fn new(source: Arc<dyn RulesetSource>, ttl: Duration, bus: Bus, redis_url: Option<String>) -> Self {
        let cached: Arc<RwLock<Option<Cached>>> = Arc::new(RwLock::new(None));

        let mut invalidations = bus.subscribe();
        let background_cache = cached.clone();
        tokio::spawn(async move {
            loop {
                match invalidations.recv().await {
                    Ok(BusEvent::RulesetInvalidated) => {
                        *background_cache.write().await = None;
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                        // Missed events under load; the TTL still bounds staleness.
                        warn!("ruleset invalidation bus lagged, relying on TTL");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Self {
            source,
            ttl,
            cached,
            bus,
            redis_url,
        }
    }

    /// Serve from cache if fresh; otherwise reload from the source and
    /// re-cache.
    pub async fn get(&self) -> Result<Ruleset> {
        if let Some(cached) = self.cached.read().await.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(cached.ruleset.clone());
            }
        }

        let ruleset = self.source.load().await.context("ruleset load failed")?;
        *self.cached.write().await = Some(Cached {
            ruleset: ruleset.clone(),
            fetched_at: Instant::now(),
        });
        Ok(ruleset)
    }

    /// Drop the local cache unconditionally.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    /// Write a new ruleset and tell every replica (including this one) to
    /// drop its cache.
    pub async fn update(&self, ruleset: &Ruleset) -> Result<Ruleset> {
        let saved = self.source.save(ruleset).await?;
        self.invalidate().await;
        self.bus
            .publish(self.redis_url.as_deref(), BusEvent::RulesetInvalidated)
            .await
            .context("ruleset invalidation publish failed")?;
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cache_serves_fresh_value_without_reloading() {
        let source = Arc::new(FakeRulesetSource::default());
        let cache = RulesetCache::new(source.clone(), Duration::from_secs(300), Bus::new_local(), None);

        let first = cache.get().await.unwrap();
        source
            .save(&Ruleset {
                min_pilots: 7,
                ..Ruleset::permissive_default("test")
            })
            .await
            .unwrap();
        let second = cache.get().await.unwrap();

        assert_eq!(first.min_pilots, second.min_pilots);
    }

    #[tokio::test]
    async fn update_invalidates_immediately() {
        let source = Arc::new(FakeRulesetSource::default());
        let cache = RulesetCache::new(source, Duration::from_secs(300), Bus::new_local(), None);

        cache.get().await.unwrap();
        let updated = Ruleset {
            min_pilots: 4,
            updated_by: "operator".to_string(),
            ..Ruleset::permissive_default("test")
        };
        cache.update(&updated).await.unwrap();

        let reloaded = cache.get().await.unwrap();
        assert_eq!(reloaded.min_pilots, 4);
    }

    #[tokio::test]
    async fn expired_ttl_forces_reload() {
        let source = Arc::new(FakeRulesetSource::default());
        let cache = RulesetCache::new(source.clone(), Duration::from_millis(10), Bus::new_local(), None);

        cache.get().await.unwrap();
        source
            .save(&Ruleset {
                min_pilots: 9,
                ..Ruleset::permissive_default("test")
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let reloaded = cache.get().await.unwrap();
        assert_eq!(reloaded.min_pilots, 9);
    }
}
