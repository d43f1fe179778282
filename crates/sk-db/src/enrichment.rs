//! The identity enrichment queue (C5 storage side).

use anyhow::{Context, Result};
use chrono::Utc;
use sk_schemas::{EnrichmentCategory, EnrichmentQueueEntry, EnrichmentStatus};
use sqlx::Row;

use crate::ids::{domain_id_from_db, domain_id_to_db};

pub(crate) fn category_str(c: EnrichmentCategory) -> &'static str {
    match c {
        EnrichmentCategory::Character => "character",
        EnrichmentCategory::Corporation => "corporation",
        EnrichmentCategory::Alliance => "alliance",
    }
}

pub(crate) fn category_parse(s: &str) -> Result<EnrichmentCategory> {
    match s {
        "character" => Ok(EnrichmentCategory::Character),
        "corporation" => Ok(EnrichmentCategory::Corporation),
        "alliance" => Ok(EnrichmentCategory::Alliance),
        other => anyhow::bail!("unknown enrichment category '{other}'"),
    }
}

pub(crate) fn status_str(s: EnrichmentStatus) -> &'static str {
    match s {
        EnrichmentStatus::Pending => "pending",
        EnrichmentStatus::Processing => "processing",
        EnrichmentStatus::Succeeded => "succeeded",
        EnrichmentStatus::Failed => "failed",
    }
}

pub(crate) fn status_parse(s: &str) -> Result<EnrichmentStatus> {
    match s {
        "pending" => Ok(EnrichmentStatus::Pending),
        "processing" => Ok(EnrichmentStatus::Processing),
        "succeeded" => Ok(EnrichmentStatus::Succeeded),
        "failed" => Ok(EnrichmentStatus::Failed),
        other => anyhow::bail!("unknown enrichment status '{other}'"),
    }
}

fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<EnrichmentQueueEntry> {
    Ok(EnrichmentQueueEntry {
        entity_id: domain_id_from_db(row.try_get("entity_id")?),
        category: category_parse(row.try_get("category")?)?,
        status: status_parse(row.try_get("status")?)?,
        attempt_count: row.try_get::<i32, _>("attempt_count")? as u32,
        last_error: row.try_get("last_error")?,
        next_attempt_at: row.try_get("next_attempt_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Enqueue an entity for enrichment if it isn't already tracked. Idempotent:
/// a second call for the same `(entity_id, category)` is a no-op.
pub async fn enqueue(
    pool: &sqlx::PgPool,
    entity_id: sk_schemas::DomainId,
    category: EnrichmentCategory,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into enrichment_queue (entity_id, category)
        values ($1, $2)
        on conflict (entity_id, category) do nothing
        "#,
    )
    .bind(domain_id_to_db(entity_id)?)
    .bind(category_str(category))
    .execute(pool)
    .await
    .context("enqueue enrichment failed")?;
    Ok(())
}

/// Atomically claim up to `limit` due rows (pending, or failed past their
/// backoff) for exclusive processing by this worker. `FOR UPDATE SKIP
/// LOCKED` lets multiple enrichment workers run concurrently without
/// double-claiming.
pub async fn claim_due_batch(
    pool: &sqlx::PgPool,
    limit: i64,
) -> Result<Vec<EnrichmentQueueEntry>> {
    let rows = sqlx::query(
        r#"
        with claimed as (
            select entity_id, category
            from enrichment_queue
            where status in ('pending', 'failed')
              and next_attempt_at <= now()
            order by next_attempt_at asc
            limit $1
            for update skip locked
        )
        update enrichment_queue q
        set status = 'processing', updated_at = now()
        from claimed
        where q.entity_id = claimed.entity_id and q.category = claimed.category
        returning q.*
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("claim_due_batch failed")?;

    rows.iter().map(row_to_record).collect()
}

/// Mark a claimed row succeeded; the caller is responsible for having
/// already written the resolved name.
pub async fn mark_succeeded(
    pool: &sqlx::PgPool,
    entity_id: sk_schemas::DomainId,
    category: EnrichmentCategory,
) -> Result<()> {
    sqlx::query(
        r#"
        update enrichment_queue
        set status = 'succeeded', last_error = null, updated_at = now()
        where entity_id = $1 and category = $2
        "#,
    )
    .bind(domain_id_to_db(entity_id)?)
    .bind(category_str(category))
    .execute(pool)
    .await
    .context("mark_succeeded failed")?;
    Ok(())
}

/// Fetch a single entity's queue row, used when reconciling whether a
/// killmail referencing it can be marked complete.
pub async fn fetch_entry(
    pool: &sqlx::PgPool,
    entity_id: sk_schemas::DomainId,
    category: EnrichmentCategory,
) -> Result<Option<EnrichmentQueueEntry>> {
    let row = sqlx::query("select * from enrichment_queue where entity_id = $1 and category = $2")
        .bind(domain_id_to_db(entity_id)?)
        .bind(category_str(category))
        .fetch_optional(pool)
        .await
        .context("fetch_entry failed")?;

    row.as_ref().map(row_to_record).transpose()
}

/// Mark a claimed row failed, bumping `attempt_count` and scheduling the
/// next retry per `EnrichmentQueueEntry::backoff_delay`.
pub async fn mark_failed(
    pool: &sqlx::PgPool,
    entity_id: sk_schemas::DomainId,
    category: EnrichmentCategory,
    attempt_count: u32,
    error: &str,
) -> Result<()> {
    let next_attempt_at = Utc::now() + EnrichmentQueueEntry::backoff_delay(attempt_count);
    sqlx::query(
        r#"
        update enrichment_queue
        set status = 'failed',
            attempt_count = $3,
            last_error = $4,
            next_attempt_at = $5,
            updated_at = now()
        where entity_id = $1 and category = $2
        "#,
    )
    .bind(domain_id_to_db(entity_id)?)
    .bind(category_str(category))
    .bind(attempt_count as i32)
    .bind(error)
    .bind(next_attempt_at)
    .execute(pool)
    .await
    .context("mark_failed failed")?;
    Ok(())
}
