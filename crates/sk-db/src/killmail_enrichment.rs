//! Per-killmail enrichment status (C5's outward contract, joined by C7).
//!
//! Distinct from `enrichment_queue`: that table dedupes work per entity
//! across every killmail that references it, while this one tracks whether
//! a single killmail's entities have all been resolved.

use anyhow::{Context, Result};
use sk_schemas::{DomainId, EnrichmentCategory, EnrichmentRecord, EnrichmentStatus, NameRecord};
use sqlx::Row;

use crate::enrichment::{category_parse, category_str, status_parse};
use crate::ids::{domain_id_from_db, domain_id_to_db};

fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<EnrichmentRecord> {
    let payload: Option<serde_json::Value> = row.try_get("payload")?;
    let payload = payload
        .map(serde_json::from_value)
        .transpose()
        .context("stored enrichment payload failed to parse")?;

    Ok(EnrichmentRecord {
        killmail_id: domain_id_from_db(row.try_get("killmail_id")?),
        status: status_parse(row.try_get("status")?)?,
        payload,
        last_error: row.try_get("last_error")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Create the killmail's enrichment row if one doesn't already exist.
/// Idempotent: a second call for the same killmail is a no-op.
pub async fn enqueue_pending(pool: &sqlx::PgPool, killmail_id: DomainId) -> Result<()> {
    sqlx::query(
        r#"
        insert into killmail_enrichment (killmail_id)
        values ($1)
        on conflict (killmail_id) do nothing
        "#,
    )
    .bind(domain_id_to_db(killmail_id)?)
    .execute(pool)
    .await
    .context("enqueue_pending killmail enrichment failed")?;
    Ok(())
}

/// Record which entities a killmail references, so a worker that resolves
/// one of them can find every killmail that might now be complete.
pub async fn link_entities(
    pool: &sqlx::PgPool,
    killmail_id: DomainId,
    targets: &[(DomainId, EnrichmentCategory)],
) -> Result<()> {
    for (entity_id, category) in targets {
        sqlx::query(
            r#"
            insert into killmail_entities (killmail_id, entity_id, category)
            values ($1, $2, $3)
            on conflict (killmail_id, entity_id, category) do nothing
            "#,
        )
        .bind(domain_id_to_db(killmail_id)?)
        .bind(domain_id_to_db(*entity_id)?)
        .bind(category_str(*category))
        .execute(pool)
        .await
        .context("link_entities failed")?;
    }
    Ok(())
}

/// Every killmail still waiting on `entity_id`'s resolution — candidates to
/// recheck once that entity's queue row changes state.
pub async fn killmails_awaiting(
    pool: &sqlx::PgPool,
    entity_id: DomainId,
    category: EnrichmentCategory,
) -> Result<Vec<DomainId>> {
    let rows = sqlx::query(
        r#"
        select ke.killmail_id
        from killmail_entities ke
        join killmail_enrichment ke2 on ke2.killmail_id = ke.killmail_id
        where ke.entity_id = $1 and ke.category = $2
          and ke2.status in ('pending', 'processing')
        "#,
    )
    .bind(domain_id_to_db(entity_id)?)
    .bind(category_str(category))
    .fetch_all(pool)
    .await
    .context("killmails_awaiting failed")?;

    rows.iter()
        .map(|row| row.try_get::<i64, _>("killmail_id").map(domain_id_from_db))
        .collect::<std::result::Result<_, _>>()
        .context("killmails_awaiting row decode failed")
}

/// The entities one killmail references.
async fn linked_entities(
    pool: &sqlx::PgPool,
    killmail_id: DomainId,
) -> Result<Vec<(DomainId, EnrichmentCategory)>> {
    let rows = sqlx::query("select entity_id, category from killmail_entities where killmail_id = $1")
        .bind(domain_id_to_db(killmail_id)?)
        .fetch_all(pool)
        .await
        .context("linked_entities failed")?;

    rows.iter()
        .map(|row| {
            let entity_id = domain_id_from_db(row.try_get("entity_id")?);
            let category = category_parse(row.try_get("category")?)?;
            Ok((entity_id, category))
        })
        .collect()
}

async fn mark_processing(pool: &sqlx::PgPool, killmail_id: DomainId) -> Result<()> {
    sqlx::query(
        r#"
        update killmail_enrichment
        set status = 'processing', updated_at = now()
        where killmail_id = $1 and status = 'pending'
        "#,
    )
    .bind(domain_id_to_db(killmail_id)?)
    .execute(pool)
    .await
    .context("mark_processing killmail enrichment failed")?;
    Ok(())
}

async fn mark_succeeded(pool: &sqlx::PgPool, killmail_id: DomainId, payload: &[NameRecord]) -> Result<()> {
    let payload = serde_json::to_value(payload).context("serializing enrichment payload failed")?;
    sqlx::query(
        r#"
        update killmail_enrichment
        set status = 'succeeded', payload = $2, last_error = null, updated_at = now()
        where killmail_id = $1
        "#,
    )
    .bind(domain_id_to_db(killmail_id)?)
    .bind(payload)
    .execute(pool)
    .await
    .context("mark_succeeded killmail enrichment failed")?;
    Ok(())
}

async fn mark_failed(pool: &sqlx::PgPool, killmail_id: DomainId, error: &str) -> Result<()> {
    sqlx::query(
        r#"
        update killmail_enrichment
        set status = 'failed', last_error = $2, updated_at = now()
        where killmail_id = $1
        "#,
    )
    .bind(domain_id_to_db(killmail_id)?)
    .bind(error)
    .execute(pool)
    .await
    .context("mark_failed killmail enrichment failed")?;
    Ok(())
}

/// Recheck whether a killmail's enrichment can now be resolved: succeeded
/// once every referenced entity has a stored name, failed once any of them
/// has permanently given up, otherwise left `processing`.
pub async fn try_complete(pool: &sqlx::PgPool, killmail_id: DomainId) -> Result<()> {
    let targets = linked_entities(pool, killmail_id).await?;
    if targets.is_empty() {
        return mark_succeeded(pool, killmail_id, &[]).await;
    }

    let mut by_category: std::collections::HashMap<EnrichmentCategory, Vec<DomainId>> = std::collections::HashMap::new();
    for (entity_id, category) in &targets {
        by_category.entry(*category).or_default().push(*entity_id);
    }

    let mut resolved: std::collections::HashMap<(DomainId, EnrichmentCategory), NameRecord> =
        std::collections::HashMap::new();
    for (category, ids) in &by_category {
        for name in crate::names::fetch_many(pool, *category, ids).await? {
            resolved.insert((name.entity_id, *category), name);
        }
    }

    if targets.len() == resolved.len() {
        let payload: Vec<NameRecord> = targets
            .iter()
            .filter_map(|key| resolved.get(key).cloned())
            .collect();
        return mark_succeeded(pool, killmail_id, &payload).await;
    }

    for (entity_id, category) in &targets {
        if resolved.contains_key(&(*entity_id, *category)) {
            continue;
        }
        if let Some(entry) = crate::enrichment::fetch_entry(pool, *entity_id, *category).await? {
            if matches!(entry.status, EnrichmentStatus::Failed) && entry.attempt_count >= sk_schemas::MAX_ENTITY_ATTEMPTS {
                let error = entry
                    .last_error
                    .unwrap_or_else(|| "entity resolution exhausted retries".to_string());
                return mark_failed(pool, killmail_id, &error).await;
            }
        }
    }

    mark_processing(pool, killmail_id).await
}

pub async fn fetch(pool: &sqlx::PgPool, killmail_id: DomainId) -> Result<Option<EnrichmentRecord>> {
    let row = sqlx::query("select * from killmail_enrichment where killmail_id = $1")
        .bind(domain_id_to_db(killmail_id)?)
        .fetch_optional(pool)
        .await
        .context("fetch killmail enrichment failed")?;

    row.as_ref().map(row_to_record).transpose()
}

/// Batch lookup for a battle's killmails, used by the detail endpoint.
pub async fn fetch_many(pool: &sqlx::PgPool, killmail_ids: &[DomainId]) -> Result<Vec<EnrichmentRecord>> {
    if killmail_ids.is_empty() {
        return Ok(Vec::new());
    }
    let ids = crate::ids::domain_ids_to_db(killmail_ids.iter().copied())?;
    let rows = sqlx::query("select * from killmail_enrichment where killmail_id = any($1)")
        .bind(ids)
        .fetch_all(pool)
        .await
        .context("fetch_many killmail enrichment failed")?;

    rows.iter().map(row_to_record).collect()
}
