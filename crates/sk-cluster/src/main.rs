//! sk-clusterd entry point: runs the C6 clustering loop and a `/healthz`
//! endpoint side by side, both stopping cleanly on shutdown signal.

use std::net::SocketAddr;

use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use sk_cluster::{engine, ClusterDeps, ClusterParams};
use sk_config::ClusterConfig;
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

    let cfg = ClusterConfig::from_env().context("loading cluster config")?;

    let pool = sk_db::connect(&cfg.database_url).await?;
    sk_db::migrate(&pool).await?;

    let deps = ClusterDeps {
        pool: pool.clone(),
        params: ClusterParams {
            window_minutes: cfg.window_minutes,
            gap_max_minutes: cfg.gap_max_minutes,
            min_kills: cfg.min_kills,
        },
        processing_delay_minutes: cfg.processing_delay_minutes,
        batch_size: cfg.batch_size as i64,
    };

    let cancel = CancellationToken::new();
    let loop_handle = tokio::spawn(engine::run_loop(deps, cfg.interval, cancel.clone()));

    let app = Router::new()
        .route("/healthz", get(healthz))
        .with_state(HealthState { pool });

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    info!("sk-clusterd listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await
        .context("healthz server crashed")?;

    cancel.cancel();
    loop_handle.await.context("clustering loop task panicked")?;
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
