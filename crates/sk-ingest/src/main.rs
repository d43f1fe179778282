//! sk-ingestd entry point: runs the C4 ingestion loop and a `/healthz`
//! endpoint side by side, both stopping cleanly on shutdown signal.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use sk_cache::Bus;
use sk_config::IngestConfig;
use sk_ingest::{ingest, IngestDeps};
use sk_ruleset::{PgRulesetSource, RulesetCache, DEFAULT_TTL};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Clone)]
struct HealthState {
    pool: sqlx::PgPool,
}

async fn healthz(State(state): State<HealthState>) -> StatusCode {
    match sk_db::ping(&state.pool).await {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sk_config::bootstrap_dotenv();
    init_tracing();

    let cfg = IngestConfig::from_env().context("loading ingest config")?;

    let pool = sk_db::connect(&cfg.database_url).await?;
    sk_db::migrate(&pool).await?;

    let http = reqwest::Client::builder()
        .user_agent(cfg.user_agent.clone())
        .timeout(Duration::from_secs(30))
        .build()
        .context("building upstream http client")?;

    let bus = Bus::new_local();
    if let Some(redis_url) = &cfg.redis_cache_url {
        bus.spawn_redis_bridge(redis_url.clone());
    }

    let ruleset_source = Arc::new(PgRulesetSource::new(pool.clone()));
    let ruleset_cache = Arc::new(RulesetCache::new(
        ruleset_source,
        DEFAULT_TTL,
        bus.clone(),
        cfg.redis_cache_url.clone(),
    ));

    let deps = IngestDeps {
        http,
        pool: pool.clone(),
        ruleset_cache,
        bus,
        redis_url: cfg.redis_cache_url.clone(),
        source_url: cfg.source_url.clone(),
        queue_id: cfg.queue_id.clone(),
    };

    let cancel = CancellationToken::new();
    let loop_handle = tokio::spawn(ingest::run_loop(deps, cfg.poll_interval, cancel.clone()));

    let app = Router::new()
        .route("/healthz", get(healthz))
        .with_state(HealthState { pool });

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    info!("sk-ingestd listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await
        .context("healthz server crashed")?;

    cancel.cancel();
    loop_handle.await.context("ingestion loop task panicked")?;
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let _ = tokio::signal::ctrl_c().await;
    cancel.cancel();
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
