//! Pilot ship history, derived incidentally from admitted killmails.

use anyhow::{Context, Result};
use sk_schemas::PilotShipHistory;
use sqlx::Row;

use crate::ids::{
    domain_id_from_db, domain_id_to_db, isk_from_db, isk_to_db, opt_domain_id_to_db,
};

fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<PilotShipHistory> {
    Ok(PilotShipHistory {
        character_id: domain_id_from_db(row.try_get("character_id")?),
        killmail_id: domain_id_from_db(row.try_get("killmail_id")?),
        ship_type_id: domain_id_from_db(row.try_get("ship_type_id")?),
        system_id: domain_id_from_db(row.try_get("system_id")?),
        corp_id: row.try_get::<Option<i64>, _>("corp_id")?.map(domain_id_from_db),
        alliance_id: row
            .try_get::<Option<i64>, _>("alliance_id")?
            .map(domain_id_from_db),
        ship_value: isk_from_db(row.try_get("ship_value")?),
        killmail_value: isk_from_db(row.try_get("killmail_value")?),
        occurred_at: row.try_get("occurred_at")?,
        is_loss: row.try_get("is_loss")?,
    })
}

/// Insert one row within the clustering tick's transaction, so a mid-tick
/// failure rolls it back along with the battle and participant rows.
pub async fn insert(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    record: &PilotShipHistory,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into pilot_ship_history
            (character_id, killmail_id, ship_type_id, system_id, corp_id, alliance_id,
             ship_value, killmail_value, occurred_at, is_loss)
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        on conflict (character_id, killmail_id) do nothing
        "#,
    )
    .bind(domain_id_to_db(record.character_id)?)
    .bind(domain_id_to_db(record.killmail_id)?)
    .bind(domain_id_to_db(record.ship_type_id)?)
    .bind(domain_id_to_db(record.system_id)?)
    .bind(opt_domain_id_to_db(record.corp_id)?)
    .bind(opt_domain_id_to_db(record.alliance_id)?)
    .bind(isk_to_db(record.ship_value)?)
    .bind(isk_to_db(record.killmail_value)?)
    .bind(record.occurred_at)
    .bind(record.is_loss)
    .execute(&mut **tx)
    .await
    .context("insert pilot ship history failed")?;
    Ok(())
}

/// Most recent hulls flown by a character, newest first.
pub async fn recent_for_character(
    pool: &sqlx::PgPool,
    character_id: sk_schemas::DomainId,
    limit: i64,
) -> Result<Vec<PilotShipHistory>> {
    let rows = sqlx::query(
        r#"
        select * from pilot_ship_history
        where character_id = $1
        order by occurred_at desc
        limit $2
        "#,
    )
    .bind(domain_id_to_db(character_id)?)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("recent_for_character failed")?;

    rows.iter().map(row_to_record).collect()
}
