//! The Postgres-backed event store and battle ledger.

pub mod battles;
pub mod enrichment;
pub mod ids;
pub mod killmail_enrichment;
pub mod killmails;
pub mod names;
pub mod ruleset;
pub mod ship_history;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub const ENV_DB_URL: &str = "DATABASE_URL";

/// Test-only gate: integration tests that need a real database read this
/// var directly rather than `ENV_DB_URL`, so `cargo test` stays green in
/// environments with no database configured at all.
pub const ENV_TEST_DB_URL: &str = "SKIRMISH_DATABASE_URL";

pub async fn connect(database_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")
}

/// Connect using `SKIRMISH_DATABASE_URL` and ensure migrations are applied.
/// Used by integration tests; panics are appropriate here since a missing
/// test database means the test harness itself is misconfigured, not that
/// the system under test failed.
pub async fn testkit_db_pool() -> Result<PgPool> {
    let url = std::env::var(ENV_TEST_DB_URL)
        .with_context(|| format!("missing env var {ENV_TEST_DB_URL}"))?;
    let pool = connect(&url).await?;
    migrate(&pool).await?;
    Ok(pool)
}

/// Trivial connectivity probe, backing every service's `/healthz`.
pub async fn ping(pool: &PgPool) -> Result<()> {
    sqlx::query("select 1")
        .execute(pool)
        .await
        .context("healthz probe failed")?;
    Ok(())
}
