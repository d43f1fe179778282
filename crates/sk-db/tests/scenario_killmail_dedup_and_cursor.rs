use chrono::Utc;
use sk_db::killmails::{self, Cursor, KillmailFilter};
use sk_schemas::{DomainId, KillmailEvent};
use std::collections::BTreeSet;

fn sample(killmail_id: u64, system_id: u64) -> KillmailEvent {
    KillmailEvent {
        killmail_id: DomainId(killmail_id),
        system_id: DomainId(system_id),
        occurred_at: Utc::now(),
        victim_alliance_id: None,
        victim_corp_id: None,
        victim_character_id: Some(DomainId(1)),
        victim_ship_type_id: Some(DomainId(670)),
        attacker_alliance_ids: BTreeSet::new(),
        attacker_corp_ids: BTreeSet::new(),
        attacker_character_ids: BTreeSet::from([DomainId(2), DomainId(3)]),
        attacker_ship_types: Vec::new(),
        isk_value: Some(sk_schemas::Isk(1_000_000)),
        source_url: None,
        fetched_at: Utc::now(),
        processed_at: None,
        battle_id: None,
    }
}

#[tokio::test]
async fn duplicate_killmail_id_is_ignored_not_errored() -> anyhow::Result<()> {
    let Ok(pool) = sk_db::testkit_db_pool().await else {
        eprintln!("SKIP: {} not set", sk_db::ENV_TEST_DB_URL);
        return Ok(());
    };

    let event = sample(900_000_001, 30_000_142);
    let first = killmails::insert(&pool, &event).await?;
    assert!(first, "first insert of a new killmail_id should succeed");

    let second = killmails::insert(&pool, &event).await?;
    assert!(!second, "duplicate killmail_id should be a no-op, not an error");

    Ok(())
}

#[tokio::test]
async fn list_recent_filters_by_system_and_paginates_by_cursor() -> anyhow::Result<()> {
    let Ok(pool) = sk_db::testkit_db_pool().await else {
        eprintln!("SKIP: {} not set", sk_db::ENV_TEST_DB_URL);
        return Ok(());
    };

    let system = 30_000_200u64;
    for i in 0..3u64 {
        let mut ev = sample(900_100_000 + i, system);
        ev.occurred_at = Utc::now() - chrono::Duration::seconds((3 - i) as i64);
        killmails::insert(&pool, &ev).await?;
    }

    let filter = KillmailFilter {
        system_id: Some(DomainId(system)),
        ..Default::default()
    };

    let page1 = killmails::list_recent(&pool, &filter, None, 2).await?;
    assert_eq!(page1.len(), 2);

    let cursor = Cursor {
        occurred_at: page1[1].occurred_at,
        killmail_id: page1[1].killmail_id,
    };
    let page2 = killmails::list_recent(&pool, &filter, Some(cursor), 2).await?;
    assert!(page2.len() >= 1);
    assert!(page1.iter().all(|e| !page2.iter().any(|e2| e2.killmail_id == e.killmail_id)));

    Ok(())
}
