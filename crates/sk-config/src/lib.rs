//! Environment-variable configuration for every service binary.
//!
//! Each service has its own `*Config::from_env()` constructor that parses and
//! validates its own variables, failing fast at startup rather than letting a
//! malformed value propagate into the run. Secrets are resolved by variable
//! name only and redacted from `Debug` output — see [`secrets`].

pub mod secrets;

use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Loads `.env.local` for developer convenience if present; silent if
/// absent. Never call this in production images — real deployments set the
/// environment directly.
pub fn bootstrap_dotenv() {
    let _ = dotenvy::from_filename(".env.local");
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// A required env var, parsed via `FromStr`.
pub fn required<T: FromStr>(name: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let raw = env_var(name).with_context(|| format!("missing required env var {name}"))?;
    raw.parse::<T>()
        .map_err(|e| anyhow::anyhow!("env var {name} has an invalid value: {e}"))
}

/// An optional env var with a default, parsed via `FromStr`.
pub fn optional_or<T: FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env_var(name) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("env var {name} has an invalid value: {e}")),
    }
}

/// An optional env var with no default.
pub fn optional_string(name: &str) -> Option<String> {
    env_var(name)
}

fn bounded<T: PartialOrd + std::fmt::Display>(name: &str, value: T, min: T, max: T) -> Result<T> {
    if value < min || value > max {
        bail!("env var {name} must be between {min} and {max}");
    }
    Ok(value)
}

/// Ingestion service (C4) configuration.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub database_url: String,
    pub redis_cache_url: Option<String>,
    pub poll_interval: Duration,
    pub source_url: String,
    pub queue_id: Option<String>,
    pub user_agent: String,
    pub port: u16,
}

impl IngestConfig {
    pub fn from_env() -> Result<Self> {
        let poll_interval_ms: u64 = optional_or("POLL_INTERVAL_MS", 5000)?;
        bounded("POLL_INTERVAL_MS", poll_interval_ms, 500, u64::MAX)?;
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            redis_cache_url: optional_string("REDIS_CACHE_URL"),
            poll_interval: Duration::from_millis(poll_interval_ms),
            source_url: required("SOURCE_URL")?,
            queue_id: optional_string("QUEUE_ID"),
            user_agent: optional_or("USER_AGENT", "skirmish-ingest/0.1".to_string())?,
            port: optional_or("PORT", 8081)?,
        })
    }
}

/// External identity API client (C3) configuration.
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub cache_ttl: Duration,
    pub redis_cache_url: Option<String>,
}

impl ApiClientConfig {
    pub fn from_env() -> Result<Self> {
        let timeout_ms: u64 = optional_or("TIMEOUT_MS", 10_000)?;
        bounded("TIMEOUT_MS", timeout_ms, 100, 120_000)?;
        let cache_ttl_seconds: u64 = optional_or("CACHE_TTL_SECONDS", 3600)?;
        bounded("CACHE_TTL_SECONDS", cache_ttl_seconds, 1, 86_400)?;
        Ok(Self {
            base_url: required("BASE_URL")?,
            timeout: Duration::from_millis(timeout_ms),
            cache_ttl: Duration::from_secs(cache_ttl_seconds),
            redis_cache_url: optional_string("REDIS_CACHE_URL"),
        })
    }
}

/// Clustering engine (C6) configuration.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub database_url: String,
    pub redis_cache_url: Option<String>,
    pub window_minutes: i64,
    pub gap_max_minutes: i64,
    pub min_kills: u32,
    pub processing_delay_minutes: i64,
    pub batch_size: u32,
    pub interval: Duration,
    pub port: u16,
}

impl ClusterConfig {
    pub fn from_env() -> Result<Self> {
        let batch_size: u32 = optional_or("BATCH_SIZE", 500)?;
        bounded("BATCH_SIZE", batch_size, 1, 2000)?;
        let interval_ms: u64 = optional_or("INTERVAL_MS", 30_000)?;
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            redis_cache_url: optional_string("REDIS_CACHE_URL"),
            window_minutes: optional_or("WINDOW_MINUTES", 30)?,
            gap_max_minutes: optional_or("GAP_MAX_MINUTES", 15)?,
            min_kills: optional_or("MIN_KILLS", 2)?,
            processing_delay_minutes: optional_or("PROCESSING_DELAY_MINUTES", 30)?,
            batch_size,
            interval: Duration::from_millis(interval_ms),
            port: optional_or("PORT", 8083)?,
        })
    }
}

/// Enrichment worker (C5) configuration.
#[derive(Debug, Clone)]
pub struct EnrichConfig {
    pub database_url: String,
    pub redis_cache_url: Option<String>,
    pub batch_size: u32,
    pub interval: Duration,
    pub concurrency: u32,
    pub auth_tokens_env_var: String,
    pub port: u16,
}

impl EnrichConfig {
    pub fn from_env() -> Result<Self> {
        let batch_size: u32 = optional_or("BATCH_SIZE", 200)?;
        bounded("BATCH_SIZE", batch_size, 1, 2000)?;
        let interval_ms: u64 = optional_or("INTERVAL_MS", 2_000)?;
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            redis_cache_url: optional_string("REDIS_CACHE_URL"),
            batch_size,
            interval: Duration::from_millis(interval_ms),
            concurrency: optional_or("ENRICH_CONCURRENCY", 8)?,
            auth_tokens_env_var: optional_or(
                "AUTH_TOKENS_ENV_VAR",
                "IDENTITY_API_TOKENS".to_string(),
            )?,
            port: optional_or("PORT", 8082)?,
        })
    }
}

/// Query/API service (C7) configuration.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub database_url: String,
    pub redis_cache_url: Option<String>,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

impl QueryConfig {
    pub fn from_env() -> Result<Self> {
        let origins = optional_string("CORS_ALLOWED_ORIGINS").unwrap_or_default();
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            redis_cache_url: optional_string("REDIS_CACHE_URL"),
            port: optional_or("PORT", 8080)?,
            cors_allowed_origins: origins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn ingest_config_rejects_sub_minimum_poll_interval() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("DATABASE_URL", "postgres://localhost/test");
        std::env::set_var("SOURCE_URL", "https://example.invalid/feed");
        std::env::set_var("POLL_INTERVAL_MS", "100");
        let result = IngestConfig::from_env();
        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("SOURCE_URL");
        std::env::remove_var("POLL_INTERVAL_MS");
        assert!(result.is_err());
    }

    #[test]
    fn cluster_config_applies_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("DATABASE_URL", "postgres://localhost/test");
        let cfg = ClusterConfig::from_env().unwrap();
        std::env::remove_var("DATABASE_URL");
        assert_eq!(cfg.min_kills, 2);
        assert_eq!(cfg.batch_size, 500);
    }
}
