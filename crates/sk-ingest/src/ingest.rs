//! The C4 pull/filter/persist/enqueue loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use sk_cache::{Bus, BusEvent};
use sk_ruleset::RulesetCache;
use sk_schemas::{EnrichmentCategory, KillmailEvent};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::filter::{self, AdmissionVerdict};
use crate::parse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored,
    Duplicate,
    Filtered,
    Empty,
}

pub struct IngestDeps {
    pub http: reqwest::Client,
    pub pool: sqlx::PgPool,
    pub ruleset_cache: Arc<RulesetCache>,
    pub bus: Bus,
    pub redis_url: Option<String>,
    pub source_url: String,
    pub queue_id: Option<String>,
}

fn reference_to_event(reference: sk_schemas::KillmailReference) -> KillmailEvent {
    let now = Utc::now();
    KillmailEvent {
        killmail_id: reference.killmail_id,
        system_id: reference.system_id,
        occurred_at: reference.occurred_at,
        victim_alliance_id: reference.victim_alliance_id,
        victim_corp_id: reference.victim_corp_id,
        victim_character_id: reference.victim_character_id,
        victim_ship_type_id: reference.victim_ship_type_id,
        attacker_alliance_ids: reference.attacker_alliance_ids,
        attacker_corp_ids: reference.attacker_corp_ids,
        attacker_character_ids: reference.attacker_character_ids,
        attacker_ship_types: reference.attacker_ship_types,
        isk_value: reference.isk_value,
        source_url: reference.source_url,
        fetched_at: now,
        processed_at: None,
        battle_id: None,
    }
}

/// Enqueue every distinct entity referenced by the event for identity
/// enrichment. Best-effort: a failure here is logged, never rolled back
/// against the already-committed event.
async fn enqueue_enrichment(pool: &sqlx::PgPool, event: &KillmailEvent) {
    let mut targets = Vec::new();
    if let Some(id) = event.victim_alliance_id {
        targets.push((id, EnrichmentCategory::Alliance));
    }
    if let Some(id) = event.victim_corp_id {
        targets.push((id, EnrichmentCategory::Corporation));
    }
    if let Some(id) = event.victim_character_id {
        targets.push((id, EnrichmentCategory::Character));
    }
    targets.extend(event.attacker_alliance_ids.iter().map(|&id| (id, EnrichmentCategory::Alliance)));
    targets.extend(event.attacker_corp_ids.iter().map(|&id| (id, EnrichmentCategory::Corporation)));
    targets.extend(event.attacker_character_ids.iter().map(|&id| (id, EnrichmentCategory::Character)));

    for (id, category) in &targets {
        if let Err(err) = sk_db::enrichment::enqueue(pool, *id, *category).await {
            warn!(entity_id = id.get(), error = %err, "failed to enqueue enrichment, continuing");
        }
    }

    if let Err(err) = sk_db::killmail_enrichment::enqueue_pending(pool, event.killmail_id).await {
        warn!(killmail_id = event.killmail_id.get(), error = %err, "failed to create killmail enrichment row");
        return;
    }
    if let Err(err) = sk_db::killmail_enrichment::link_entities(pool, event.killmail_id, &targets).await {
        warn!(killmail_id = event.killmail_id.get(), error = %err, "failed to link killmail entities");
        return;
    }
    if let Err(err) = sk_db::killmail_enrichment::try_complete(pool, event.killmail_id).await {
        warn!(killmail_id = event.killmail_id.get(), error = %err, "failed to reconcile killmail enrichment status");
    }
}

/// One pull → filter → persist → enqueue cycle.
pub async fn run_iteration(deps: &IngestDeps) -> Result<IngestOutcome> {
    let mut request = deps.http.get(&deps.source_url);
    if let Some(queue_id) = &deps.queue_id {
        request = request.query(&[("queue_id", queue_id)]);
    }
    let response = request.send().await.context("upstream poll failed")?;
    let body = response.bytes().await.context("reading upstream body failed")?;

    let reference = match parse::parse_response(&body) {
        Ok(Some(reference)) => reference,
        Ok(None) => return Ok(IngestOutcome::Empty),
        Err(err) => {
            warn!(error = %err, "dropping malformed upstream payload");
            return Ok(IngestOutcome::Filtered);
        }
    };

    let ruleset = deps.ruleset_cache.get().await.context("ruleset load failed")?;
    if filter::evaluate(&reference, &ruleset) == AdmissionVerdict::Drop {
        return Ok(IngestOutcome::Filtered);
    }

    let event = reference_to_event(reference);
    let stored = sk_db::killmails::insert(&deps.pool, &event)
        .await
        .context("killmail insert failed")?;

    if !stored {
        return Ok(IngestOutcome::Duplicate);
    }

    enqueue_enrichment(&deps.pool, &event).await;

    if let Err(err) = deps
        .bus
        .publish(deps.redis_url.as_deref(), BusEvent::KillmailAdmitted(Box::new(event)))
        .await
    {
        warn!(error = %err, "failed to publish killmail-admitted event");
    }

    Ok(IngestOutcome::Stored)
}

/// Drives `run_iteration` on a fixed cadence until `cancel` fires. Finishes
/// the in-flight iteration before exiting.
pub async fn run_loop(deps: IngestDeps, poll_interval: Duration, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("ingestion loop shutting down");
                return;
            }
            outcome = run_iteration(&deps) => {
                match outcome {
                    Ok(outcome) => info!(?outcome, "ingestion tick"),
                    Err(err) => warn!(error = %err, "ingestion tick failed"),
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
}
