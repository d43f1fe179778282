//! Shared rate-limit ledger: a floating-window spend counter used by the
//! external identity API client (C3) so every replica of the client shares
//! one view of quota consumption instead of each guessing independently.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use tokio::sync::Mutex;

#[async_trait]
pub trait RateLimitLedger: Send + Sync {
    /// Record a spend of `cost` against `key`, then return the total spend
    /// recorded for `key` within the trailing `window`. A cost of 0 can be
    /// used to read the current count without recording a new spend.
    async fn spend(&self, key: &str, cost: i64, window: Duration) -> Result<i64>;

    /// Reconcile this ledger against the upstream's own accounting: if the
    /// server reports fewer requests remaining than our spend count implies,
    /// the server is authoritative, so append a corrective spend to close
    /// the gap. Never moves the ledger the other way — a higher
    /// server-reported remaining is left alone rather than refunded, since a
    /// false "quota available" reading is the unsafe direction to drift.
    async fn reconcile(
        &self,
        key: &str,
        window: Duration,
        quota: i64,
        server_remaining: i64,
    ) -> Result<()> {
        let current = self.spend(key, 0, window).await?;
        let implied_remaining = quota - current;
        if server_remaining < implied_remaining {
            let shortfall = implied_remaining - server_remaining;
            self.spend(key, shortfall, window).await?;
        }
        Ok(())
    }
}

/// Redis sorted-set implementation: each spend is a member scored by its
/// timestamp in milliseconds; `ZREMRANGEBYSCORE` evicts anything older than
/// the window before `ZCARD` reports the live count. Atomic enough for this
/// purpose — the fleet tolerates slight over-admission near the boundary,
/// never under-admission, since the ledger is advisory against an
/// authoritative upstream quota, which reconciles periodically.
pub struct RedisRateLimitLedger {
    conn: redis::aio::ConnectionManager,
}

impl RedisRateLimitLedger {
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
impl RateLimitLedger for RedisRateLimitLedger {
    async fn spend(&self, key: &str, cost: i64, window: Duration) -> Result<i64> {
        let mut conn = self.conn.clone();
        let now_millis = Utc::now().timestamp_millis();
        let window_start = now_millis - window.as_millis() as i64;

        let mut pipe = redis::pipe();
        pipe.atomic();
        if cost > 0 {
            for i in 0..cost {
                let member = format!("{now_millis}-{i}");
                pipe.zadd(key, member, now_millis).ignore();
            }
        }
        pipe.zrembyscore(key, 0, window_start).ignore();
        pipe.zcard(key);
        pipe.expire(key, window.as_secs().max(1) as i64).ignore();

        let (count,): (i64,) = pipe.query_async(&mut conn).await.context("ledger spend failed")?;
        Ok(count)
    }
}

/// In-memory stand-in for `RateLimitLedger`, for tests and single-process
/// deployments with no Redis configured.
#[derive(Default)]
pub struct InMemoryRateLimitLedger {
    spends: Mutex<HashMap<String, Vec<i64>>>,
}

impl InMemoryRateLimitLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitLedger for InMemoryRateLimitLedger {
    async fn spend(&self, key: &str, cost: i64, window: Duration) -> Result<i64> {
        let now_millis = Utc::now().timestamp_millis();
        let window_start = now_millis - window.as_millis() as i64;

        let mut spends = self.spends.lock().await;
        let entry = spends.entry(key.to_string()).or_default();
        entry.retain(|ts| *ts > window_start);
        for _ in 0..cost.max(0) {
            entry.push(now_millis);
        }
        Ok(entry.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spends_accumulate_within_the_window() {
        let ledger = InMemoryRateLimitLedger::new();
        let window = Duration::from_secs(60);
        assert_eq!(ledger.spend("k", 2, window).await.unwrap(), 2);
        assert_eq!(ledger.spend("k", 3, window).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn old_spends_fall_out_of_the_window() {
        let ledger = InMemoryRateLimitLedger::new();
        ledger.spend("k", 1, Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let count = ledger.spend("k", 0, Duration::from_millis(10)).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn reconcile_appends_phantom_spend_when_server_reports_less_remaining() {
        let ledger = InMemoryRateLimitLedger::new();
        let window = Duration::from_secs(60);
        ledger.spend("k", 5, window).await.unwrap(); // ledger thinks 5 spent, 95 remaining of 100
        ledger.reconcile("k", window, 100, 50).await.unwrap(); // server says only 50 remaining
        let count = ledger.spend("k", 0, window).await.unwrap();
        assert_eq!(count, 50); // 100 - 50
    }

    #[tokio::test]
    async fn reconcile_is_a_no_op_when_server_agrees_or_is_more_generous() {
        let ledger = InMemoryRateLimitLedger::new();
        let window = Duration::from_secs(60);
        ledger.spend("k", 5, window).await.unwrap();
        ledger.reconcile("k", window, 100, 95).await.unwrap();
        let count = ledger.spend("k", 0, window).await.unwrap();
        assert_eq!(count, 5);
    }
}
