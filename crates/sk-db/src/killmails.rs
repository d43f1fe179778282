//! The killmail event store (C1).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sk_schemas::KillmailEvent;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::ids::{
    domain_id_from_db, domain_id_to_db, domain_ids_from_db, domain_ids_to_db, opt_domain_id_to_db,
    opt_isk_from_db, opt_isk_to_db,
};

/// Insert an admitted killmail. Returns `false` without error if the
/// `killmail_id` already exists — duplicate admission is an expected
/// outcome, never an error (spec's "duplicate" error kind).
pub async fn insert(pool: &PgPool, event: &KillmailEvent) -> Result<bool> {
    let attacker_ship_types =
        serde_json::to_value(&event.attacker_ship_types).context("encode attacker_ship_types")?;
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        insert into killmails (
            killmail_id, system_id, occurred_at,
            victim_alliance_id, victim_corp_id, victim_character_id, victim_ship_type_id,
            attacker_alliance_ids, attacker_corp_ids, attacker_character_ids, attacker_ship_types,
            isk_value, source_url, fetched_at
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        on conflict (killmail_id) do nothing
        returning killmail_id
        "#,
    )
    .bind(domain_id_to_db(event.killmail_id)?)
    .bind(domain_id_to_db(event.system_id)?)
    .bind(event.occurred_at)
    .bind(opt_domain_id_to_db(event.victim_alliance_id)?)
    .bind(opt_domain_id_to_db(event.victim_corp_id)?)
    .bind(opt_domain_id_to_db(event.victim_character_id)?)
    .bind(opt_domain_id_to_db(event.victim_ship_type_id)?)
    .bind(domain_ids_to_db(event.attacker_alliance_ids.iter().copied())?)
    .bind(domain_ids_to_db(event.attacker_corp_ids.iter().copied())?)
    .bind(domain_ids_to_db(
        event.attacker_character_ids.iter().copied(),
    )?)
    .bind(attacker_ship_types)
    .bind(opt_isk_to_db(event.isk_value)?)
    .bind(&event.source_url)
    .bind(event.fetched_at)
    .fetch_optional(pool)
    .await
    .context("insert killmail failed")?;

    Ok(row.is_some())
}

fn row_to_event(row: &sqlx::postgres::PgRow) -> Result<KillmailEvent> {
    Ok(KillmailEvent {
        killmail_id: domain_id_from_db(row.try_get("killmail_id")?),
        system_id: domain_id_from_db(row.try_get("system_id")?),
        occurred_at: row.try_get("occurred_at")?,
        victim_alliance_id: row
            .try_get::<Option<i64>, _>("victim_alliance_id")?
            .map(domain_id_from_db),
        victim_corp_id: row
            .try_get::<Option<i64>, _>("victim_corp_id")?
            .map(domain_id_from_db),
        victim_character_id: row
            .try_get::<Option<i64>, _>("victim_character_id")?
            .map(domain_id_from_db),
        victim_ship_type_id: row
            .try_get::<Option<i64>, _>("victim_ship_type_id")?
            .map(domain_id_from_db),
        attacker_alliance_ids: domain_ids_from_db(row.try_get("attacker_alliance_ids")?)
            .into_iter()
            .collect(),
        attacker_corp_ids: domain_ids_from_db(row.try_get("attacker_corp_ids")?)
            .into_iter()
            .collect(),
        attacker_character_ids: domain_ids_from_db(row.try_get("attacker_character_ids")?)
            .into_iter()
            .collect(),
        attacker_ship_types: serde_json::from_value(row.try_get("attacker_ship_types")?)
            .context("decode attacker_ship_types")?,
        isk_value: opt_isk_from_db(row.try_get("isk_value")?),
        source_url: row.try_get("source_url")?,
        fetched_at: row.try_get("fetched_at")?,
        processed_at: row.try_get("processed_at")?,
        battle_id: row.try_get("battle_id")?,
    })
}

/// Claim up to `limit` unprocessed killmails for the clustering engine,
/// ordered by `occurred_at`, excluding rows newer than `cutoff` so an
/// in-flight window has a chance to accumulate further kills first (the
/// processing-delay invariant). `FOR UPDATE SKIP LOCKED` lets multiple
/// clustering replicas run without claiming the same rows twice.
pub async fn claim_unprocessed_batch(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    cutoff: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<KillmailEvent>> {
    let rows = sqlx::query(
        r#"
        select *
        from killmails
        where processed_at is null
          and occurred_at <= $1
        order by occurred_at asc, killmail_id asc
        limit $2
        for update skip locked
        "#,
    )
    .bind(cutoff)
    .bind(limit)
    .fetch_all(&mut **tx)
    .await
    .context("claim_unprocessed_batch failed")?;

    rows.iter().map(row_to_event).collect()
}

/// Mark a set of killmails processed, assigning them to a battle. Call
/// within the same transaction as the battle upsert so a mid-way failure
/// rolls both back together.
pub async fn mark_processed(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    killmail_ids: &[sk_schemas::DomainId],
    battle_id: Uuid,
) -> Result<()> {
    let ids = domain_ids_to_db(killmail_ids.iter().copied())?;
    sqlx::query(
        r#"
        update killmails
        set processed_at = now(), battle_id = $2
        where killmail_id = any($1)
        "#,
    )
    .bind(ids)
    .bind(battle_id)
    .execute(&mut **tx)
    .await
    .context("mark_processed failed")?;
    Ok(())
}

/// Mark a set of killmails processed with no battle assigned — the cluster
/// they fell into didn't meet `min_kills`.
pub async fn mark_processed_unclustered(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    killmail_ids: &[sk_schemas::DomainId],
) -> Result<()> {
    let ids = domain_ids_to_db(killmail_ids.iter().copied())?;
    sqlx::query(
        r#"
        update killmails
        set processed_at = now(), battle_id = null
        where killmail_id = any($1)
        "#,
    )
    .bind(ids)
    .execute(&mut **tx)
    .await
    .context("mark_processed_unclustered failed")?;
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct KillmailFilter {
    pub system_id: Option<sk_schemas::DomainId>,
    pub alliance_id: Option<sk_schemas::DomainId>,
    pub corp_id: Option<sk_schemas::DomainId>,
    pub character_id: Option<sk_schemas::DomainId>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// Opaque pagination cursor: `(occurred_at, killmail_id)` of the last row
/// returned, encoded so callers never need to know its internal shape.
#[derive(Debug, Clone, Copy)]
pub struct Cursor {
    pub occurred_at: DateTime<Utc>,
    pub killmail_id: sk_schemas::DomainId,
}

impl Cursor {
    pub fn encode(&self) -> String {
        format!("{}_{}", self.occurred_at.timestamp_micros(), self.killmail_id.get())
    }

    pub fn decode(s: &str) -> Result<Self> {
        let (ts, id) = s
            .split_once('_')
            .context("malformed cursor: missing separator")?;
        let micros: i64 = ts.parse().context("malformed cursor: bad timestamp")?;
        let killmail_id: u64 = id.parse().context("malformed cursor: bad killmail id")?;
        let occurred_at = DateTime::from_timestamp_micros(micros)
            .context("malformed cursor: timestamp out of range")?;
        Ok(Self {
            occurred_at,
            killmail_id: sk_schemas::DomainId(killmail_id),
        })
    }
}

/// Recent, tracked-only killmails, most recent first, cursor-paginated.
pub async fn list_recent(
    pool: &PgPool,
    filter: &KillmailFilter,
    cursor: Option<Cursor>,
    page_size: i64,
) -> Result<Vec<KillmailEvent>> {
    let mut query = sqlx::QueryBuilder::new(
        "select * from killmails where 1 = 1",
    );

    if let Some(system_id) = filter.system_id {
        query.push(" and system_id = ").push_bind(domain_id_to_db(system_id)?);
    }
    if let Some(alliance_id) = filter.alliance_id {
        query
            .push(" and (victim_alliance_id = ")
            .push_bind(domain_id_to_db(alliance_id)?)
            .push(" or ")
            .push_bind(domain_id_to_db(alliance_id)?)
            .push(" = any(attacker_alliance_ids))");
    }
    if let Some(corp_id) = filter.corp_id {
        query
            .push(" and (victim_corp_id = ")
            .push_bind(domain_id_to_db(corp_id)?)
            .push(" or ")
            .push_bind(domain_id_to_db(corp_id)?)
            .push(" = any(attacker_corp_ids))");
    }
    if let Some(character_id) = filter.character_id {
        query
            .push(" and (victim_character_id = ")
            .push_bind(domain_id_to_db(character_id)?)
            .push(" or ")
            .push_bind(domain_id_to_db(character_id)?)
            .push(" = any(attacker_character_ids))");
    }
    if let Some(since) = filter.since {
        query.push(" and occurred_at >= ").push_bind(since);
    }
    if let Some(until) = filter.until {
        query.push(" and occurred_at <= ").push_bind(until);
    }
    if let Some(cursor) = cursor {
        query
            .push(" and (occurred_at, killmail_id) < (")
            .push_bind(cursor.occurred_at)
            .push(", ")
            .push_bind(domain_id_to_db(cursor.killmail_id)?)
            .push(")");
    }

    query.push(" order by occurred_at desc, killmail_id desc limit ");
    query.push_bind(page_size);

    let rows = query
        .build()
        .fetch_all(pool)
        .await
        .context("list_recent failed")?;

    rows.iter().map(row_to_event).collect()
}

/// Single killmail lookup, used when reconciling enrichment status.
pub async fn fetch_by_id(
    pool: &PgPool,
    killmail_id: sk_schemas::DomainId,
) -> Result<Option<KillmailEvent>> {
    let row = sqlx::query("select * from killmails where killmail_id = $1")
        .bind(domain_id_to_db(killmail_id)?)
        .fetch_optional(pool)
        .await
        .context("fetch_by_id failed")?;

    row.as_ref().map(row_to_event).transpose()
}

/// All killmails assigned to one battle, oldest first.
pub async fn by_battle(pool: &PgPool, battle_id: Uuid) -> Result<Vec<KillmailEvent>> {
    let rows = sqlx::query(
        r#"
        select * from killmails
        where battle_id = $1
        order by occurred_at asc, killmail_id asc
        "#,
    )
    .bind(battle_id)
    .fetch_all(pool)
    .await
    .context("by_battle failed")?;

    rows.iter().map(row_to_event).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_round_trips() {
        let c = Cursor {
            occurred_at: Utc::now(),
            killmail_id: sk_schemas::DomainId(12345),
        };
        let encoded = c.encode();
        let decoded = Cursor::decode(&encoded).unwrap();
        assert_eq!(decoded.killmail_id, c.killmail_id);
        assert_eq!(
            decoded.occurred_at.timestamp_micros(),
            c.occurred_at.timestamp_micros()
        );
    }

    #[test]
    fn cursor_rejects_malformed_input() {
        assert!(Cursor::decode("not-a-cursor").is_err());
    }
}
