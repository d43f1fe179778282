//! sk-apid entry point: the query surface's HTTP server (C7).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use sk_apiclient::{HttpIdentityClient, IdentityResolver};
use sk_cache::{Bus, Cache, FakeCache, InMemoryRateLimitLedger, L1L2Cache, RateLimitLedger, RedisCache, RedisRateLimitLedger};
use sk_config::secrets::AuthCollaboratorSecrets;
use sk_config::{ApiClientConfig, QueryConfig};
use sk_query::state::AppState;
use sk_ruleset::{PgRulesetSource, RulesetCache, RulesetSource, DEFAULT_TTL};
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sk_config::bootstrap_dotenv();
    init_tracing();

    let cfg = QueryConfig::from_env().context("loading query config")?;
    let api_cfg = ApiClientConfig::from_env().context("loading identity api client config")?;

    let pool = sk_db::connect(&cfg.database_url).await?;
    sk_db::migrate(&pool).await?;

    let bus = Bus::new_local();
    if let Some(url) = &cfg.redis_cache_url {
        bus.spawn_redis_bridge(url.clone());
    }

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

    let resolver: Arc<dyn IdentityResolver> = Arc::new(HttpIdentityClient::new(
        api_cfg.base_url.clone(),
        api_cfg.timeout,
        cache,
        ledger,
        None,
    )?);

    let ruleset_source: Arc<dyn RulesetSource> = Arc::new(PgRulesetSource::new(pool.clone()));
    let ruleset_cache = Arc::new(RulesetCache::new(
        ruleset_source,
        DEFAULT_TTL,
        bus.clone(),
        cfg.redis_cache_url.clone(),
    ));

    let auth_collaborator = load_auth_collaborator_secrets()?;

    let state = Arc::new(AppState {
        pool: pool.clone(),
        bus,
        ruleset_cache,
        resolver,
        cors_allowed_origins: cfg.cors_allowed_origins.clone(),
        auth_collaborator,
    });

    let app = sk_query::build_router(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer(&cfg.cors_allowed_origins));

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    info!("sk-apid listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("query server crashed")?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Resolve the authorization collaborator's secrets if it's deployed
/// alongside this service, signalled by `AUTH_CLIENT_ID` being set. Absent
/// entirely, that collaborator isn't in play here and `put_ruleset`'s bearer
/// check is the only gate. Present but incomplete is a misconfiguration and
/// fails startup rather than running half-wired.
fn load_auth_collaborator_secrets() -> anyhow::Result<Option<Arc<AuthCollaboratorSecrets>>> {
    if std::env::var("AUTH_CLIENT_ID").ok().filter(|v| !v.is_empty()).is_none() {
        info!("AUTH_CLIENT_ID unset; running with no authorization collaborator configured");
        return Ok(None);
    }
    let secrets = AuthCollaboratorSecrets::from_env().context("loading auth collaborator secrets")?;
    info!(callback_url = %secrets.callback_url, "authorization collaborator secrets resolved");
    Ok(Some(Arc::new(secrets)))
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// Fails closed: an empty `CORS_ALLOWED_ORIGINS` allows no cross-origin
/// requests at all rather than falling back to a permissive wildcard.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::PUT])
        .allow_headers(tower_http::cors::Any)
}
