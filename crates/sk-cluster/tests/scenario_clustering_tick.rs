use std::collections::BTreeSet;

use chrono::Utc;
use sk_cluster::{engine, ClusterDeps, ClusterParams};
use sk_schemas::{DomainId, Isk, KillmailEvent};

fn sample(killmail_id: u64, system_id: u64, minutes_ago: i64) -> KillmailEvent {
    KillmailEvent {
        killmail_id: DomainId(killmail_id),
        system_id: DomainId(system_id),
        occurred_at: Utc::now() - chrono::Duration::minutes(minutes_ago),
        victim_alliance_id: None,
        victim_corp_id: None,
        victim_character_id: Some(DomainId(1)),
        victim_ship_type_id: Some(DomainId(670)),
        attacker_alliance_ids: BTreeSet::new(),
        attacker_corp_ids: BTreeSet::new(),
        attacker_character_ids: BTreeSet::from([DomainId(2)]),
        attacker_ship_types: Vec::new(),
        isk_value: Some(Isk(500_000)),
        source_url: None,
        fetched_at: Utc::now(),
        processed_at: None,
        battle_id: None,
    }
}

#[tokio::test]
async fn a_qualifying_cluster_becomes_a_battle_and_events_are_marked_processed() -> anyhow::Result<()> {
    let Ok(pool) = sk_db::testkit_db_pool().await else {
        eprintln!("SKIP: {} not set", sk_db::ENV_TEST_DB_URL);
        return Ok(());
    };

    let system = 930_000_001u64;
    // Old enough to clear the processing-delay gate, close enough to cluster.
    for (id, minutes_ago) in [(1u64, 40i64), (2u64, 38i64)] {
        let event = sample(900_300_000 + id, system, minutes_ago);
        sk_db::killmails::insert(&pool, &event).await?;
    }

    let deps = ClusterDeps {
        pool: pool.clone(),
        params: ClusterParams {
            window_minutes: 30,
            gap_max_minutes: 15,
            min_kills: 2,
        },
        processing_delay_minutes: 30,
        batch_size: 500,
    };

    let outcome = engine::run_tick(&deps).await?;
    assert!(outcome.claimed >= 2);
    assert_eq!(outcome.battles_created, 1);

    let filter = sk_db::killmails::KillmailFilter {
        system_id: Some(DomainId(system)),
        ..Default::default()
    };
    let stored = sk_db::killmails::list_recent(&pool, &filter, None, 10).await?;
    assert!(stored.iter().all(|e| e.processed_at.is_some() && e.battle_id.is_some()));

    Ok(())
}

#[tokio::test]
async fn a_lone_event_below_min_kills_is_processed_with_no_battle() -> anyhow::Result<()> {
    let Ok(pool) = sk_db::testkit_db_pool().await else {
        eprintln!("SKIP: {} not set", sk_db::ENV_TEST_DB_URL);
        return Ok(());
    };

    let system = 930_000_002u64;
    let event = sample(900_300_100, system, 40);
    sk_db::killmails::insert(&pool, &event).await?;

    let deps = ClusterDeps {
        pool: pool.clone(),
        params: ClusterParams {
            window_minutes: 30,
            gap_max_minutes: 15,
            min_kills: 2,
        },
        processing_delay_minutes: 30,
        batch_size: 500,
    };

    let outcome = engine::run_tick(&deps).await?;
    assert!(outcome.events_dropped >= 1);

    let filter = sk_db::killmails::KillmailFilter {
        system_id: Some(DomainId(system)),
        ..Default::default()
    };
    let stored = sk_db::killmails::list_recent(&pool, &filter, None, 10).await?;
    assert!(stored.iter().all(|e| e.processed_at.is_some() && e.battle_id.is_none()));

    Ok(())
}
