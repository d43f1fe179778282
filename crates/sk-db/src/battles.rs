//! Battle clusters and their participant rows (C6 storage side, C7 read
//! side).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sk_schemas::{Battle, BattleKillmail, BattleParticipant, DomainId, SecurityType};
use sqlx::Row;
use uuid::Uuid;

use crate::ids::{
    domain_id_from_db, domain_id_to_db, domain_ids_from_db, domain_ids_to_db, isk_from_db, isk_to_db,
    opt_domain_id_to_db, opt_isk_from_db, opt_isk_to_db,
};

fn row_to_battle(row: &sqlx::postgres::PgRow) -> Result<Battle> {
    Ok(Battle {
        battle_id: row.try_get("battle_id")?,
        primary_system_id: domain_id_from_db(row.try_get("primary_system_id")?),
        security_type: SecurityType::parse(row.try_get("security_type")?)
            .map_err(|e| anyhow::anyhow!(e))?,
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
        killmail_count: row.try_get::<i32, _>("killmail_count")? as u32,
        total_isk_destroyed: isk_from_db(row.try_get("total_isk_destroyed")?),
        participant_count: row.try_get::<i32, _>("participant_count")? as u32,
        related_url: row.try_get("related_url")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Create a new battle row and its participant/killmail edge rows, and
/// assign the given killmails to it, all within one transaction. A mid-way
/// failure rolls back completely so the clustering tick can retry the same
/// killmails.
pub async fn create_with_participants(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    battle: &Battle,
    participants: &[BattleParticipant],
    killmails: &[BattleKillmail],
) -> Result<()> {
    sqlx::query(
        r#"
        insert into battles (
            battle_id, primary_system_id, security_type, started_at, ended_at,
            killmail_count, total_isk_destroyed, participant_count, related_url
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(battle.battle_id)
    .bind(domain_id_to_db(battle.primary_system_id)?)
    .bind(battle.security_type.as_str())
    .bind(battle.started_at)
    .bind(battle.ended_at)
    .bind(battle.killmail_count as i32)
    .bind(isk_to_db(battle.total_isk_destroyed)?)
    .bind(battle.participant_count as i32)
    .bind(&battle.related_url)
    .execute(&mut **tx)
    .await
    .context("insert battle failed")?;

    insert_participants(tx, participants).await?;
    insert_battle_killmails(tx, killmails).await
}

async fn insert_battle_killmails(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    killmails: &[BattleKillmail],
) -> Result<()> {
    for k in killmails {
        sqlx::query(
            r#"
            insert into battle_killmails
                (battle_id, killmail_id, victim_alliance_id, attacker_alliance_ids, isk_value, side_id)
            values ($1, $2, $3, $4, $5, $6)
            on conflict (battle_id, killmail_id) do nothing
            "#,
        )
        .bind(k.battle_id)
        .bind(domain_id_to_db(k.killmail_id)?)
        .bind(opt_domain_id_to_db(k.victim_alliance_id)?)
        .bind(domain_ids_to_db(k.attacker_alliance_ids.iter().copied())?)
        .bind(opt_isk_to_db(k.isk_value)?)
        .bind(opt_domain_id_to_db(k.side_id)?)
        .execute(&mut **tx)
        .await
        .context("insert battle killmail failed")?;
    }

    Ok(())
}

fn row_to_battle_killmail(row: &sqlx::postgres::PgRow) -> Result<BattleKillmail> {
    Ok(BattleKillmail {
        battle_id: row.try_get("battle_id")?,
        killmail_id: domain_id_from_db(row.try_get("killmail_id")?),
        victim_alliance_id: row
            .try_get::<Option<i64>, _>("victim_alliance_id")?
            .map(domain_id_from_db),
        attacker_alliance_ids: domain_ids_from_db(row.try_get("attacker_alliance_ids")?)
            .into_iter()
            .collect(),
        isk_value: opt_isk_from_db(row.try_get("isk_value")?),
        side_id: row.try_get::<Option<i64>, _>("side_id")?.map(domain_id_from_db),
    })
}

/// All killmail edge rows for one battle.
pub async fn fetch_battle_killmails(pool: &sqlx::PgPool, battle_id: Uuid) -> Result<Vec<BattleKillmail>> {
    let rows = sqlx::query("select * from battle_killmails where battle_id = $1")
        .bind(battle_id)
        .fetch_all(pool)
        .await
        .context("fetch_battle_killmails failed")?;

    rows.iter().map(row_to_battle_killmail).collect()
}

async fn insert_participants(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    participants: &[BattleParticipant],
) -> Result<()> {
    for p in participants {
        sqlx::query(
            r#"
            insert into battle_participants
                (battle_id, character_id, ship_type_id, corp_id, alliance_id, is_victim, side_id)
            values ($1, $2, $3, $4, $5, $6, $7)
            on conflict (battle_id, character_id, ship_type_id) do nothing
            "#,
        )
        .bind(p.battle_id)
        .bind(domain_id_to_db(p.character_id)?)
        .bind(domain_id_to_db(p.ship_type_id)?)
        .bind(opt_domain_id_to_db(p.corp_id)?)
        .bind(opt_domain_id_to_db(p.alliance_id)?)
        .bind(p.is_victim)
        .bind(opt_domain_id_to_db(p.side_id)?)
        .execute(&mut **tx)
        .await
        .context("insert battle participant failed")?;
    }

    Ok(())
}

fn row_to_participant(row: &sqlx::postgres::PgRow) -> Result<BattleParticipant> {
    Ok(BattleParticipant {
        battle_id: row.try_get("battle_id")?,
        character_id: domain_id_from_db(row.try_get("character_id")?),
        ship_type_id: domain_id_from_db(row.try_get("ship_type_id")?),
        corp_id: row.try_get::<Option<i64>, _>("corp_id")?.map(domain_id_from_db),
        alliance_id: row
            .try_get::<Option<i64>, _>("alliance_id")?
            .map(domain_id_from_db),
        is_victim: row.try_get("is_victim")?,
        side_id: row.try_get::<Option<i64>, _>("side_id")?.map(domain_id_from_db),
    })
}

/// All participant rows for one battle.
pub async fn fetch_participants(
    pool: &sqlx::PgPool,
    battle_id: Uuid,
) -> Result<Vec<BattleParticipant>> {
    let rows = sqlx::query("select * from battle_participants where battle_id = $1")
        .bind(battle_id)
        .fetch_all(pool)
        .await
        .context("fetch_participants failed")?;

    rows.iter().map(row_to_participant).collect()
}

#[derive(Debug, Clone, Default)]
pub struct BattleFilter {
    pub security_type: Option<SecurityType>,
    pub alliance_id: Option<DomainId>,
    pub corp_id: Option<DomainId>,
    pub character_id: Option<DomainId>,
    pub system_id: Option<DomainId>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// Opaque pagination cursor over `(started_at, battle_id)`.
#[derive(Debug, Clone, Copy)]
pub struct BattleCursor {
    pub started_at: DateTime<Utc>,
    pub battle_id: Uuid,
}

impl BattleCursor {
    pub fn encode(&self) -> String {
        format!("{}_{}", self.started_at.timestamp_micros(), self.battle_id)
    }

    pub fn decode(s: &str) -> Result<Self> {
        let (ts, id) = s
            .split_once('_')
            .context("malformed cursor: missing separator")?;
        let micros: i64 = ts.parse().context("malformed cursor: bad timestamp")?;
        let started_at = DateTime::from_timestamp_micros(micros)
            .context("malformed cursor: timestamp out of range")?;
        let battle_id = Uuid::parse_str(id).context("malformed cursor: bad battle id")?;
        Ok(Self { started_at, battle_id })
    }
}

fn push_participant_filters(query: &mut sqlx::QueryBuilder<'_, sqlx::Postgres>, filter: &BattleFilter) -> Result<()> {
    if filter.alliance_id.is_some() || filter.corp_id.is_some() || filter.character_id.is_some() {
        query.push(
            " and exists (select 1 from battle_participants bp where bp.battle_id = battles.battle_id",
        );
        if let Some(alliance_id) = filter.alliance_id {
            query.push(" and bp.alliance_id = ").push_bind(domain_id_to_db(alliance_id)?);
        }
        if let Some(corp_id) = filter.corp_id {
            query.push(" and bp.corp_id = ").push_bind(domain_id_to_db(corp_id)?);
        }
        if let Some(character_id) = filter.character_id {
            query
                .push(" and bp.character_id = ")
                .push_bind(domain_id_to_db(character_id)?);
        }
        query.push(")");
    }
    Ok(())
}

/// Battles matching `filter`, most recent first, cursor-paginated.
pub async fn list_recent(
    pool: &sqlx::PgPool,
    filter: &BattleFilter,
    cursor: Option<BattleCursor>,
    page_size: i64,
) -> Result<Vec<Battle>> {
    let mut query = sqlx::QueryBuilder::new("select * from battles where 1 = 1");

    if let Some(security_type) = filter.security_type {
        query.push(" and security_type = ").push_bind(security_type.as_str());
    }
    if let Some(system_id) = filter.system_id {
        query.push(" and primary_system_id = ").push_bind(domain_id_to_db(system_id)?);
    }
    if let Some(since) = filter.since {
        query.push(" and started_at >= ").push_bind(since);
    }
    if let Some(until) = filter.until {
        query.push(" and started_at <= ").push_bind(until);
    }
    push_participant_filters(&mut query, filter)?;
    if let Some(cursor) = cursor {
        query
            .push(" and (started_at, battle_id) < (")
            .push_bind(cursor.started_at)
            .push(", ")
            .push_bind(cursor.battle_id)
            .push(")");
    }

    query.push(" order by started_at desc, battle_id desc limit ");
    query.push_bind(page_size);

    let rows = query.build().fetch_all(pool).await.context("list_recent battles failed")?;
    rows.iter().map(row_to_battle).collect()
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct BattleStats {
    pub battle_count: i64,
    pub total_kills: i64,
    pub total_isk_destroyed: i64,
}

/// Aggregate stats over every battle matching `filter`, ignoring pagination.
pub async fn aggregate_stats(pool: &sqlx::PgPool, filter: &BattleFilter) -> Result<BattleStats> {
    let mut query = sqlx::QueryBuilder::new(
        "select count(*) as battle_count, coalesce(sum(killmail_count), 0) as total_kills, \
         coalesce(sum(total_isk_destroyed), 0) as total_isk_destroyed from battles where 1 = 1",
    );

    if let Some(security_type) = filter.security_type {
        query.push(" and security_type = ").push_bind(security_type.as_str());
    }
    if let Some(system_id) = filter.system_id {
        query.push(" and primary_system_id = ").push_bind(domain_id_to_db(system_id)?);
    }
    if let Some(since) = filter.since {
        query.push(" and started_at >= ").push_bind(since);
    }
    if let Some(until) = filter.until {
        query.push(" and started_at <= ").push_bind(until);
    }
    push_participant_filters(&mut query, filter)?;

    let row = query
        .build()
        .fetch_one(pool)
        .await
        .context("aggregate_stats failed")?;

    Ok(BattleStats {
        battle_count: row.try_get("battle_count")?,
        total_kills: row.try_get::<i64, _>("total_kills")?,
        total_isk_destroyed: row.try_get::<i64, _>("total_isk_destroyed")?,
    })
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct DashboardSummary {
    pub battles_last_24h: i64,
    pub killmails_last_24h: i64,
    pub isk_destroyed_last_24h: i64,
}

/// Rolling 24h summary, refreshed on every request (no separate materialized
/// view — the table is small enough that a direct aggregate is cheap).
pub async fn dashboard_summary(pool: &sqlx::PgPool) -> Result<DashboardSummary> {
    let row = sqlx::query(
        r#"
        select
            count(*) as battles_last_24h,
            coalesce(sum(killmail_count), 0) as killmails_last_24h,
            coalesce(sum(total_isk_destroyed), 0) as isk_destroyed_last_24h
        from battles
        where started_at >= now() - interval '24 hours'
        "#,
    )
    .fetch_one(pool)
    .await
    .context("dashboard_summary failed")?;

    Ok(DashboardSummary {
        battles_last_24h: row.try_get("battles_last_24h")?,
        killmails_last_24h: row.try_get::<i64, _>("killmails_last_24h")?,
        isk_destroyed_last_24h: row.try_get::<i64, _>("isk_destroyed_last_24h")?,
    })
}

pub async fn fetch_by_id(pool: &sqlx::PgPool, battle_id: Uuid) -> Result<Option<Battle>> {
    let row = sqlx::query("select * from battles where battle_id = $1")
        .bind(battle_id)
        .fetch_optional(pool)
        .await
        .context("fetch_by_id battle failed")?;

    row.as_ref().map(row_to_battle).transpose()
}

