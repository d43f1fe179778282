//! Axum router and all HTTP handlers for sk-apid (C7).
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! CORS/tracing middleware afterward.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, put};
use axum::Router;
use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use sk_cache::BusEvent;
use sk_schemas::{classify_system, DomainId, Ruleset, SecurityType};
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::api_types::{BattleDetailResponse, BattleListResponse, KillmailListResponse, RulesetResponse};
use crate::error::AppError;
use crate::hydrate::{hydrate_battle, hydrate_battles, hydrate_killmails};
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/battles", get(list_battles))
        .route("/battles/stats", get(battle_stats))
        .route("/battles/:id", get(get_battle))
        .route("/killmails", get(list_killmails))
        .route("/killmails/stream", get(stream_killmails))
        .route("/ruleset", get(get_ruleset).put(put_ruleset))
        .route("/dashboard", get(dashboard))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /healthz
// ---------------------------------------------------------------------------

async fn healthz(State(state): State<Arc<AppState>>) -> StatusCode {
    match sk_db::ping(&state.pool).await {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

// ---------------------------------------------------------------------------
// Shared filter parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct BattleParams {
    security_type: Option<String>,
    alliance_id: Option<DomainId>,
    corp_id: Option<DomainId>,
    character_id: Option<DomainId>,
    system_id: Option<DomainId>,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    cursor: Option<String>,
    page_size: Option<i64>,
}

fn parse_security_type(raw: &Option<String>) -> Result<Option<SecurityType>, AppError> {
    raw.as_deref()
        .map(|s| SecurityType::parse(s).map_err(|e| AppError::BadRequest(e.to_string())))
        .transpose()
}

impl BattleParams {
    fn into_filter(&self) -> Result<sk_db::battles::BattleFilter, AppError> {
        Ok(sk_db::battles::BattleFilter {
            security_type: parse_security_type(&self.security_type)?,
            alliance_id: self.alliance_id,
            corp_id: self.corp_id,
            character_id: self.character_id,
            system_id: self.system_id,
            since: self.since,
            until: self.until,
        })
    }

    fn cursor(&self) -> Result<Option<sk_db::battles::BattleCursor>, AppError> {
        self.cursor
            .as_deref()
            .map(|c| sk_db::battles::BattleCursor::decode(c).map_err(|e| AppError::BadRequest(e.to_string())))
            .transpose()
    }

    fn page_size(&self) -> i64 {
        self.page_size.unwrap_or(50).clamp(1, 200)
    }
}

// ---------------------------------------------------------------------------
// GET /battles
// ---------------------------------------------------------------------------

async fn list_battles(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BattleParams>,
) -> Result<Json<BattleListResponse>, AppError> {
    let filter = params.into_filter()?;
    let cursor = params.cursor()?;
    let page_size = params.page_size();

    let battles = sk_db::battles::list_recent(&state.pool, &filter, cursor, page_size).await?;
    let names = hydrate_battles(state.resolver.as_ref(), &battles).await;
    let next_cursor = battles.last().map(|b| {
        sk_db::battles::BattleCursor {
            started_at: b.started_at,
            battle_id: b.battle_id,
        }
        .encode()
    });

    Ok(Json(BattleListResponse {
        battles,
        names,
        next_cursor,
    }))
}

// ---------------------------------------------------------------------------
// GET /battles/stats
// ---------------------------------------------------------------------------

async fn battle_stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BattleParams>,
) -> Result<Json<sk_db::battles::BattleStats>, AppError> {
    let filter = params.into_filter()?;
    let stats = sk_db::battles::aggregate_stats(&state.pool, &filter).await?;
    Ok(Json(stats))
}

// ---------------------------------------------------------------------------
// GET /battles/:id
// ---------------------------------------------------------------------------

async fn get_battle(
    State(state): State<Arc<AppState>>,
    Path(battle_id): Path<Uuid>,
) -> Result<Json<BattleDetailResponse>, AppError> {
    let battle = sk_db::battles::fetch_by_id(&state.pool, battle_id)
        .await?
        .ok_or(AppError::NotFound)?;
    let participants = sk_db::battles::fetch_participants(&state.pool, battle_id).await?;
    let killmails = sk_db::killmails::by_battle(&state.pool, battle_id).await?;
    let killmail_ids: Vec<_> = killmails.iter().map(|k| k.killmail_id).collect();
    let enrichment = sk_db::killmail_enrichment::fetch_many(&state.pool, &killmail_ids).await?;
    let names = hydrate_battle(state.resolver.as_ref(), &battle, &participants).await;

    Ok(Json(BattleDetailResponse {
        battle,
        participants,
        killmails,
        enrichment,
        names,
    }))
}

// ---------------------------------------------------------------------------
// GET /killmails
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct KillmailParams {
    system_id: Option<DomainId>,
    alliance_id: Option<DomainId>,
    corp_id: Option<DomainId>,
    character_id: Option<DomainId>,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    cursor: Option<String>,
    page_size: Option<i64>,
}

impl KillmailParams {
    fn into_filter(&self) -> sk_db::killmails::KillmailFilter {
        sk_db::killmails::KillmailFilter {
            system_id: self.system_id,
            alliance_id: self.alliance_id,
            corp_id: self.corp_id,
            character_id: self.character_id,
            since: self.since,
            until: self.until,
        }
    }

    fn cursor(&self) -> Result<Option<sk_db::killmails::Cursor>, AppError> {
        self.cursor
            .as_deref()
            .map(|c| sk_db::killmails::Cursor::decode(c).map_err(|e| AppError::BadRequest(e.to_string())))
            .transpose()
    }

    fn page_size(&self) -> i64 {
        self.page_size.unwrap_or(50).clamp(1, 200)
    }
}

async fn list_killmails(
    State(state): State<Arc<AppState>>,
    Query(params): Query<KillmailParams>,
) -> Result<Json<KillmailListResponse>, AppError> {
    let filter = params.into_filter();
    let cursor = params.cursor()?;
    let page_size = params.page_size();

    let killmails = sk_db::killmails::list_recent(&state.pool, &filter, cursor, page_size).await?;
    let names = hydrate_killmails(state.resolver.as_ref(), &killmails).await;
    let next_cursor = killmails.last().map(|e| {
        sk_db::killmails::Cursor {
            occurred_at: e.occurred_at,
            killmail_id: e.killmail_id,
        }
        .encode()
    });

    Ok(Json(KillmailListResponse {
        killmails,
        names,
        next_cursor,
    }))
}

// ---------------------------------------------------------------------------
// GET /killmails/stream  (SSE)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct StreamParams {
    #[serde(default)]
    once: bool,
    limit: Option<i64>,
    #[serde(rename = "spaceType")]
    space_type: Option<String>,
}

fn matches_space_type(system_id: DomainId, filter: Option<SecurityType>) -> bool {
    match filter {
        Some(wanted) => classify_system(system_id) == wanted,
        None => true,
    }
}

async fn stream_killmails(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StreamParams>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let space_type = parse_security_type(&params.space_type)?;
    let limit = params.limit.unwrap_or(20).clamp(1, 500);

    let recent = sk_db::killmails::list_recent(&state.pool, &Default::default(), None, limit * 4).await?;
    let snapshot: Vec<_> = recent
        .into_iter()
        .filter(|e| matches_space_type(e.system_id, space_type))
        .take(limit as usize)
        .collect();

    let mut response_headers = HeaderMap::new();
    response_headers.insert("cache-control", HeaderValue::from_static("no-cache"));
    response_headers.insert("connection", HeaderValue::from_static("keep-alive"));
    response_headers.insert("vary", HeaderValue::from_static("origin"));
    if let Some(origin) = allowed_origin(&state, &headers) {
        response_headers.insert("access-control-allow-origin", origin);
        response_headers.insert(
            "access-control-allow-credentials",
            HeaderValue::from_static("true"),
        );
    }

    let snapshot_event = Event::default()
        .event("snapshot")
        .data(serde_json::to_string(&snapshot).map_err(|e| AppError::Internal(e.into()))?);

    if params.once {
        let body = futures_util::stream::once(async move { Ok::<_, Infallible>(snapshot_event) });
        return Ok((response_headers, Sse::new(body).keep_alive(KeepAlive::new())).into_response());
    }

    let rx = state.bus.subscribe();
    let deltas = broadcast_to_sse(rx, space_type);
    let events = futures_util::stream::once(async move { Ok::<_, Infallible>(snapshot_event) }).chain(deltas);

    Ok((response_headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response())
}

fn allowed_origin(state: &AppState, headers: &HeaderMap) -> Option<HeaderValue> {
    let origin = headers.get("origin")?.to_str().ok()?;
    if state.cors_allowed_origins.iter().any(|o| o == origin) {
        HeaderValue::from_str(origin).ok()
    } else {
        None
    }
}

fn broadcast_to_sse(
    rx: tokio::sync::broadcast::Receiver<BusEvent>,
    space_type: Option<SecurityType>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(move |msg| async move {
        match msg {
            Ok(BusEvent::KillmailAdmitted(event)) if matches_space_type(event.system_id, space_type) => {
                let data = serde_json::to_string(&event).ok()?;
                Some(Ok(Event::default().event("killmail").data(data)))
            }
            Ok(_) => None,
            Err(_) => None,
        }
    })
}

// ---------------------------------------------------------------------------
// GET/PUT /ruleset
// ---------------------------------------------------------------------------

async fn get_ruleset(State(state): State<Arc<AppState>>) -> Result<Json<RulesetResponse>, AppError> {
    let ruleset = state.ruleset_cache.get().await?;
    Ok(Json(RulesetResponse { ruleset }))
}

/// Ruleset mutation is gated by the authorization collaborator, which is out
/// of scope here; this enforces only its contract — a caller must present
/// some bearer credential — not real OAuth.
async fn put_ruleset(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(ruleset): Json<Ruleset>,
) -> Result<Json<RulesetResponse>, AppError> {
    let has_auth = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| !v.trim().is_empty());
    if !has_auth {
        return Err(AppError::Unauthorized);
    }

    ruleset
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let saved = state.ruleset_cache.update(&ruleset).await?;
    Ok(Json(RulesetResponse { ruleset: saved }))
}

// ---------------------------------------------------------------------------
// GET /dashboard
// ---------------------------------------------------------------------------

async fn dashboard(
    State(state): State<Arc<AppState>>,
) -> Result<Json<sk_db::battles::DashboardSummary>, AppError> {
    let summary = sk_db::battles::dashboard_summary(&state.pool).await?;
    Ok(Json(summary))
}
