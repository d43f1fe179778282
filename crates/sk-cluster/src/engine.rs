//! Wires the pure clustering walk to storage: claim a batch, cluster it,
//! persist battles/participants/ship-history, mark events processed — all
//! within one transaction per tick, so a mid-way failure leaves every event
//! in the batch unprocessed and eligible for retry.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::group::{cluster_batch, ClusterParams};
use crate::materialize::materialize;

pub struct ClusterDeps {
    pub pool: sqlx::PgPool,
    pub params: ClusterParams,
    pub processing_delay_minutes: i64,
    pub batch_size: i64,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TickOutcome {
    pub claimed: usize,
    pub battles_created: usize,
    pub events_dropped: usize,
}

/// One claim → cluster → persist → mark-processed cycle.
pub async fn run_tick(deps: &ClusterDeps) -> Result<TickOutcome> {
    let cutoff = Utc::now() - chrono::Duration::minutes(deps.processing_delay_minutes);

    let mut tx = deps.pool.begin().await.context("begin clustering tick")?;

    let events = sk_db::killmails::claim_unprocessed_batch(&mut tx, cutoff, deps.batch_size)
        .await
        .context("claim unprocessed batch")?;

    let claimed = events.len();
    if claimed == 0 {
        tx.commit().await.context("commit empty clustering tick")?;
        return Ok(TickOutcome::default());
    }

    let clusters = cluster_batch(events, &deps.params);

    let mut outcome = TickOutcome {
        claimed,
        ..TickOutcome::default()
    };

    for cluster in clusters {
        let killmail_ids: Vec<_> = cluster.events.iter().map(|e| e.killmail_id).collect();

        if !cluster.meets_min_kills(&deps.params) {
            outcome.events_dropped += cluster.events.len();
            // no battle_id: these events simply fall below the threshold.
            mark_processed_without_battle(&mut tx, &killmail_ids).await?;
            continue;
        }

        let battle_id = Uuid::new_v4();
        let materialized = materialize(&cluster, battle_id);

        sk_db::battles::create_with_participants(
            &mut tx,
            &materialized.battle,
            &materialized.participants,
            &materialized.killmails,
        )
        .await
        .context("persist battle")?;

        for record in &materialized.ship_history {
            sk_db::ship_history::insert(&mut tx, record)
                .await
                .context("persist pilot ship history")?;
        }

        sk_db::killmails::mark_processed(&mut tx, &killmail_ids, battle_id)
            .await
            .context("mark cluster processed")?;

        outcome.battles_created += 1;
    }

    tx.commit().await.context("commit clustering tick")?;
    Ok(outcome)
}

/// `mark_processed` requires a battle id; sub-threshold clusters use a
/// dedicated null-battle update instead so the column stays nullable only
/// for this one reason.
async fn mark_processed_without_battle(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    killmail_ids: &[sk_schemas::DomainId],
) -> Result<()> {
    sk_db::killmails::mark_processed_unclustered(tx, killmail_ids)
        .await
        .context("mark unclustered events processed")
}

/// Drives `run_tick` on a fixed cadence until `cancel` fires. Finishes the
/// in-flight tick before exiting.
pub async fn run_loop(deps: ClusterDeps, interval: Duration, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("clustering loop shutting down");
                return;
            }
            outcome = run_tick(&deps) => {
                match outcome {
                    Ok(outcome) => info!(?outcome, "clustering tick"),
                    Err(err) => warn!(error = %err, "clustering tick failed"),
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
