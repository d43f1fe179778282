//! Resolved identity names (C8 storage side).

use anyhow::{Context, Result};
use sk_schemas::{EnrichmentCategory, NameRecord};
use sqlx::Row;

use crate::enrichment::{category_parse, category_str};
use crate::ids::{domain_id_from_db, domain_id_to_db, domain_ids_to_db};

fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<NameRecord> {
    Ok(NameRecord {
        entity_id: domain_id_from_db(row.try_get("entity_id")?),
        category: category_parse(row.try_get("category")?)?,
        name: row.try_get("name")?,
        ticker: row.try_get("ticker")?,
        resolved_at: row.try_get("resolved_at")?,
    })
}

pub async fn upsert(pool: &sqlx::PgPool, record: &NameRecord) -> Result<()> {
    sqlx::query(
        r#"
        insert into resolved_names (entity_id, category, name, ticker, resolved_at)
        values ($1, $2, $3, $4, $5)
        on conflict (entity_id, category) do update set
            name = excluded.name,
            ticker = excluded.ticker,
            resolved_at = excluded.resolved_at
        "#,
    )
    .bind(domain_id_to_db(record.entity_id)?)
    .bind(category_str(record.category))
    .bind(&record.name)
    .bind(&record.ticker)
    .bind(record.resolved_at)
    .execute(pool)
    .await
    .context("upsert resolved name failed")?;
    Ok(())
}

/// Batch-fetch resolved names, returning only the ones already known. The
/// caller enqueues enrichment for whatever ids are missing from the result.
pub async fn fetch_many(
    pool: &sqlx::PgPool,
    category: EnrichmentCategory,
    entity_ids: &[sk_schemas::DomainId],
) -> Result<Vec<NameRecord>> {
    if entity_ids.is_empty() {
        return Ok(Vec::new());
    }
    let ids = domain_ids_to_db(entity_ids.iter().copied())?;
    let rows = sqlx::query(
        r#"
        select * from resolved_names
        where category = $1 and entity_id = any($2)
        "#,
    )
    .bind(category_str(category))
    .bind(ids)
    .fetch_all(pool)
    .await
    .context("fetch_many resolved names failed")?;

    rows.iter().map(row_to_record).collect()
}
