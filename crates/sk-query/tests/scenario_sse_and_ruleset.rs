//! In-process scenario tests for the sk-apid HTTP surface.
//!
//! Each test drives `routes::build_router` via `tower::ServiceExt::oneshot`
//! against a real Postgres database — no TCP socket, no running binary.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use sk_apiclient::FakeIdentityResolver;
use sk_cache::Bus;
use sk_query::state::AppState;
use sk_ruleset::{PgRulesetSource, RulesetCache, RulesetSource, DEFAULT_TTL};
use sk_schemas::Ruleset;
use tower::ServiceExt;

async fn make_state(pool: sqlx::PgPool, bus: Bus) -> Arc<AppState> {
    let source: Arc<dyn RulesetSource> = Arc::new(PgRulesetSource::new(pool.clone()));
    let ruleset_cache = Arc::new(RulesetCache::new(source, DEFAULT_TTL, bus.clone(), None));
    Arc::new(AppState {
        pool,
        bus,
        ruleset_cache,
        resolver: Arc::new(FakeIdentityResolver::new()),
        cors_allowed_origins: vec!["https://allowed.example".to_string()],
        auth_collaborator: None,
    })
}

async fn call(
    router: axum::Router,
    req: Request<axum::body::Body>,
) -> (StatusCode, axum::http::HeaderMap, bytes::Bytes) {
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = resp.into_body().collect().await.expect("body collect failed").to_bytes();
    (status, headers, body)
}

// ---------------------------------------------------------------------------
// Scenario: SSE snapshot-only connection returns one event and closes.
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sse_once_returns_a_single_snapshot_event_with_cors_headers() -> anyhow::Result<()> {
    let Ok(pool) = sk_db::testkit_db_pool().await else {
        eprintln!("SKIP: {} not set", sk_db::ENV_TEST_DB_URL);
        return Ok(());
    };

    let state = make_state(pool, Bus::new_local()).await;
    let router = sk_query::build_router(state);

    let req = Request::builder()
        .method("GET")
        .uri("/killmails/stream?once=true&limit=1")
        .header("origin", "https://allowed.example")
        .body(axum::body::Body::empty())
        .unwrap();

    let (status, headers, body) = call(router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers.get("content-type").map(|v| v.to_str().unwrap()),
        Some("text/event-stream")
    );
    assert_eq!(headers.get("cache-control").map(|v| v.to_str().unwrap()), Some("no-cache"));
    assert_eq!(
        headers.get("access-control-allow-origin").map(|v| v.to_str().unwrap()),
        Some("https://allowed.example")
    );
    assert_eq!(
        headers.get("access-control-allow-credentials").map(|v| v.to_str().unwrap()),
        Some("true")
    );

    let text = String::from_utf8(body.to_vec())?;
    assert!(text.contains("event: snapshot"), "body was: {text}");
    // A snapshot-only connection must not keep the body open waiting on a tail.
    assert_eq!(text.matches("event: ").count(), 1);

    Ok(())
}

#[tokio::test]
async fn sse_rejects_unlisted_origins_from_cors_headers() -> anyhow::Result<()> {
    let Ok(pool) = sk_db::testkit_db_pool().await else {
        eprintln!("SKIP: {} not set", sk_db::ENV_TEST_DB_URL);
        return Ok(());
    };

    let state = make_state(pool, Bus::new_local()).await;
    let router = sk_query::build_router(state);

    let req = Request::builder()
        .method("GET")
        .uri("/killmails/stream?once=true&limit=1")
        .header("origin", "https://not-allowed.example")
        .body(axum::body::Body::empty())
        .unwrap();

    let (status, headers, _body) = call(router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.get("access-control-allow-origin").is_none());

    Ok(())
}

// ---------------------------------------------------------------------------
// Scenario: a ruleset write on one replica is visible to another replica's
// read without waiting for the TTL, via the shared invalidation bus.
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ruleset_write_on_one_replica_is_visible_on_another_without_ttl_delay() -> anyhow::Result<()> {
    let Ok(pool) = sk_db::testkit_db_pool().await else {
        eprintln!("SKIP: {} not set", sk_db::ENV_TEST_DB_URL);
        return Ok(());
    };

    let bus = Bus::new_local();
    let writer = make_state(pool.clone(), bus.clone()).await;
    let reader = make_state(pool, bus).await;

    let writer_router = sk_query::build_router(Arc::clone(&writer));
    let reader_router = sk_query::build_router(Arc::clone(&reader));

    // Prime the reader's cache with whatever is currently active so the TTL
    // window is in effect before the write lands.
    let warm = Request::builder()
        .method("GET")
        .uri("/ruleset")
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, _, _) = call(reader_router.clone(), warm).await;
    assert_eq!(status, StatusCode::OK);

    let mut updated = Ruleset::permissive_default("scenario-writer");
    updated.min_pilots = 7;
    let body = serde_json::to_vec(&updated)?;

    let put_req = Request::builder()
        .method("PUT")
        .uri("/ruleset")
        .header("authorization", "Bearer test-token")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body))
        .unwrap();
    let (status, _, _) = call(writer_router, put_req).await;
    assert_eq!(status, StatusCode::OK);

    // Give the bus's broadcast a moment to fan out to the reader's subscription.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let get_req = Request::builder()
        .method("GET")
        .uri("/ruleset")
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, _, body) = call(reader_router, get_req).await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_slice(&body)?;
    assert_eq!(json["min_pilots"], 7);
    assert_eq!(json["updated_by"], "scenario-writer");

    Ok(())
}

#[tokio::test]
async fn ruleset_write_without_authorization_header_is_rejected() -> anyhow::Result<()> {
    let Ok(pool) = sk_db::testkit_db_pool().await else {
        eprintln!("SKIP: {} not set", sk_db::ENV_TEST_DB_URL);
        return Ok(());
    };

    let state = make_state(pool, Bus::new_local()).await;
    let router = sk_query::build_router(state);

    let body = serde_json::to_vec(&Ruleset::permissive_default("no-auth"))?;
    let req = Request::builder()
        .method("PUT")
        .uri("/ruleset")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body))
        .unwrap();

    let (status, _, _) = call(router, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}
