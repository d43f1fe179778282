//! The single active admission ruleset (C2 storage side).

use anyhow::{Context, Result};
use sk_schemas::{Ruleset, SecurityType, RULESET_SINGLETON_ID};
use sqlx::{PgPool, Row};

use crate::ids::{domain_ids_from_db, domain_ids_to_db};

fn row_to_ruleset(row: &sqlx::postgres::PgRow) -> Result<Ruleset> {
    let security_strs: Vec<String> = row.try_get("tracked_security_types")?;
    let tracked_security_types = security_strs
        .iter()
        .map(|s| SecurityType::parse(s))
        .collect::<Result<_, _>>()
        .context("stored security type failed to parse")?;

    Ok(Ruleset {
        min_pilots: row.try_get::<i16, _>("min_pilots")? as u16,
        tracked_alliance_ids: domain_ids_from_db(row.try_get("tracked_alliance_ids")?)
            .into_iter()
            .collect(),
        tracked_corp_ids: domain_ids_from_db(row.try_get("tracked_corp_ids")?)
            .into_iter()
            .collect(),
        tracked_system_ids: domain_ids_from_db(row.try_get("tracked_system_ids")?)
            .into_iter()
            .collect(),
        tracked_security_types,
        ignore_unlisted: row.try_get("ignore_unlisted")?,
        updated_by: row.try_get("updated_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Fetch the active ruleset, if one has ever been written.
pub async fn fetch(pool: &PgPool) -> Result<Option<Ruleset>> {
    let row = sqlx::query("select * from rulesets where id = $1")
        .bind(RULESET_SINGLETON_ID)
        .fetch_optional(pool)
        .await
        .context("fetch ruleset failed")?;

    row.as_ref().map(row_to_ruleset).transpose()
}

/// Upsert the active ruleset. `updated_at` is always stamped `now()`
/// server-side so clock skew between query API replicas never matters.
pub async fn upsert(pool: &PgPool, ruleset: &Ruleset) -> Result<Ruleset> {
    ruleset
        .validate()
        .map_err(|e| anyhow::anyhow!("ruleset rejected: {e}"))?;

    let security_strs: Vec<String> = ruleset
        .tracked_security_types
        .iter()
        .map(|s| s.as_str().to_string())
        .collect();

    let row = sqlx::query(
        r#"
        insert into rulesets (
            id, min_pilots, tracked_alliance_ids, tracked_corp_ids,
            tracked_system_ids, tracked_security_types, ignore_unlisted, updated_by
        ) values ($1, $2, $3, $4, $5, $6, $7, $8)
        on conflict (id) do update set
            min_pilots = excluded.min_pilots,
            tracked_alliance_ids = excluded.tracked_alliance_ids,
            tracked_corp_ids = excluded.tracked_corp_ids,
            tracked_system_ids = excluded.tracked_system_ids,
            tracked_security_types = excluded.tracked_security_types,
            ignore_unlisted = excluded.ignore_unlisted,
            updated_by = excluded.updated_by,
            updated_at = now()
        returning *
        "#,
    )
    .bind(RULESET_SINGLETON_ID)
    .bind(ruleset.min_pilots as i16)
    .bind(domain_ids_to_db(ruleset.tracked_alliance_ids.iter().copied())?)
    .bind(domain_ids_to_db(ruleset.tracked_corp_ids.iter().copied())?)
    .bind(domain_ids_to_db(ruleset.tracked_system_ids.iter().copied())?)
    .bind(security_strs)
    .bind(ruleset.ignore_unlisted)
    .bind(&ruleset.updated_by)
    .fetch_one(pool)
    .await
    .context("upsert ruleset failed")?;

    row_to_ruleset(&row)
}
