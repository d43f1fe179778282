//! Claims a batch of due enrichment rows, resolves them concurrently
//! against the identity client, and writes results (or backs off on
//! failure) back to the queue.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures_util::future::join_all;
use sk_apiclient::IdentityResolver;
use sk_schemas::{EnrichmentQueueEntry, NameRecord};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::mapping::resource_class;

pub struct EnrichDeps {
    pub pool: sqlx::PgPool,
    pub resolver: Arc<dyn IdentityResolver>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BatchOutcome {
    pub claimed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

async fn resolve_one(deps: &EnrichDeps, record: &EnrichmentQueueEntry) -> bool {
    let class = resource_class(record.category);
    let result = deps.resolver.resolve(class, record.entity_id).await;
    match result {
        Ok(Some(identity)) => {
            let name = NameRecord {
                entity_id: record.entity_id,
                category: record.category,
                name: identity.name,
                ticker: identity.ticker,
                resolved_at: chrono::Utc::now(),
            };
            if let Err(err) = sk_db::names::upsert(&deps.pool, &name).await {
                warn!(entity_id = record.entity_id.get(), error = %err, "failed to store resolved name");
                return false;
            }
            if let Err(err) =
                sk_db::enrichment::mark_succeeded(&deps.pool, record.entity_id, record.category)
                    .await
            {
                warn!(entity_id = record.entity_id.get(), error = %err, "failed to mark enrichment succeeded");
                return false;
            }
            true
        }
        Ok(None) => {
            debug!(entity_id = record.entity_id.get(), "identity API has no record for this id");
            if let Err(err) = sk_db::enrichment::mark_failed(
                &deps.pool,
                record.entity_id,
                record.category,
                record.attempt_count + 1,
                "identity API returned no record",
            )
            .await
            {
                warn!(entity_id = record.entity_id.get(), error = %err, "failed to mark enrichment failed");
            }
            false
        }
        Err(err) => {
            warn!(entity_id = record.entity_id.get(), error = %err, "identity API lookup failed");
            if let Err(db_err) = sk_db::enrichment::mark_failed(
                &deps.pool,
                record.entity_id,
                record.category,
                record.attempt_count + 1,
                &err.to_string(),
            )
            .await
            {
                warn!(entity_id = record.entity_id.get(), error = %db_err, "failed to mark enrichment failed");
            }
            false
        }
    }
}

/// Claim up to `batch_size` due rows and resolve each, `concurrency` at a
/// time. Every row is resolved independently: one failure never blocks or
/// rolls back another.
pub async fn run_iteration(deps: &EnrichDeps, batch_size: u32, concurrency: usize) -> Result<BatchOutcome> {
    let claimed = sk_db::enrichment::claim_due_batch(&deps.pool, batch_size as i64).await?;
    let total = claimed.len();
    if total == 0 {
        return Ok(BatchOutcome::default());
    }

    let mut succeeded = 0usize;
    for chunk in claimed.chunks(concurrency.max(1)) {
        let results = join_all(chunk.iter().map(|record| resolve_one(deps, record))).await;
        succeeded += results.into_iter().filter(|ok| *ok).count();
    }

    reconcile_killmails(deps, &claimed).await;

    Ok(BatchOutcome {
        claimed: total,
        succeeded,
        failed: total - succeeded,
    })
}

/// After a batch of entity-level resolutions, recheck every killmail that
/// references any touched entity: it may now have every entity resolved
/// (or have just hit a permanently-failed one).
async fn reconcile_killmails(deps: &EnrichDeps, claimed: &[EnrichmentQueueEntry]) {
    let mut killmail_ids = std::collections::BTreeSet::new();
    for entry in claimed {
        match sk_db::killmail_enrichment::killmails_awaiting(&deps.pool, entry.entity_id, entry.category).await {
            Ok(ids) => killmail_ids.extend(ids),
            Err(err) => warn!(
                entity_id = entry.entity_id.get(),
                error = %err,
                "failed to look up killmails awaiting enrichment"
            ),
        }
    }

    for killmail_id in killmail_ids {
        if let Err(err) = sk_db::killmail_enrichment::try_complete(&deps.pool, killmail_id).await {
            warn!(
                killmail_id = killmail_id.get(),
                error = %err,
                "failed to reconcile killmail enrichment status"
            );
        }
    }
}

/// Drives `run_iteration` on a fixed cadence until `cancel` fires. Finishes
/// the in-flight batch before exiting.
pub async fn run_loop(
    deps: EnrichDeps,
    batch_size: u32,
    concurrency: usize,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("enrichment loop shutting down");
                return;
            }
            outcome = run_iteration(&deps, batch_size, concurrency) => {
                match outcome {
                    Ok(outcome) if outcome.claimed > 0 => info!(?outcome, "enrichment tick"),
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, "enrichment tick failed"),
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
