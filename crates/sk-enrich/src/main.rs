//! sk-enrichd entry point: runs the C5 enrichment loop and a `/healthz`
//! endpoint side by side, both stopping cleanly on shutdown signal.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use sk_apiclient::{HttpIdentityClient, TokenProvider, TokenRotation};
use sk_cache::{Cache, FakeCache, InMemoryRateLimitLedger, L1L2Cache, RateLimitLedger, RedisCache, RedisRateLimitLedger};
use sk_config::{ApiClientConfig, EnrichConfig};
use sk_enrich::worker::{self, EnrichDeps};
use sk_enrich::EnvTokenSource;
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

    let cfg = EnrichConfig::from_env().context("loading enrichment config")?;
    let api_cfg = ApiClientConfig::from_env().context("loading identity api client config")?;

    let pool = sk_db::connect(&cfg.database_url).await?;
    sk_db::migrate(&pool).await?;

    let l2: Arc<dyn Cache> = match &cfg.redis_cache_url {
        Some(url) => Arc::new(RedisCache::connect(url).await.context("connecting identity cache")?),
        None => Arc::new(FakeCache::new()),
    };
    let cache = L1L2Cache::new(l2, Duration::from_secs(60));

    let ledger: Arc<dyn RateLimitLedger> = match &cfg.redis_cache_url {
        Some(url) => Arc::new(
            RedisRateLimitLedger::connect(url)
                .await
                .context("connecting rate limit ledger")?,
        ),
        None => Arc::new(InMemoryRateLimitLedger::new()),
    };

    let tokens: Arc<dyn TokenProvider> = Arc::new(TokenRotation::new(EnvTokenSource::new(
        cfg.auth_tokens_env_var.clone(),
    )));

    let resolver = Arc::new(HttpIdentityClient::new(
        api_cfg.base_url.clone(),
        api_cfg.timeout,
        cache,
        ledger,
        Some(tokens),
    )?);

    let deps = EnrichDeps {
        pool: pool.clone(),
        resolver,
    };

    let cancel = CancellationToken::new();
    let loop_handle = tokio::spawn(worker::run_loop(
        deps,
        cfg.batch_size,
        cfg.concurrency as usize,
        cfg.interval,
        cancel.clone(),
    ));

    let app = Router::new()
        .route("/healthz", get(healthz))
        .with_state(HealthState { pool });

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    info!("sk-enrichd listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await
        .context("healthz server crashed")?;

    cancel.cancel();
    loop_handle.await.context("enrichment loop task panicked")?;
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
