use sk_db::ruleset;
use sk_schemas::Ruleset;

#[tokio::test]
async fn ruleset_upsert_then_fetch_round_trips() -> anyhow::Result<()> {
    let Ok(pool) = sk_db::testkit_db_pool().await else {
        eprintln!("SKIP: {} not set", sk_db::ENV_TEST_DB_URL);
        return Ok(());
    };

    let mut rs = Ruleset::permissive_default("scenario-test");
    rs.min_pilots = 5;
    rs.tracked_system_ids.insert(sk_schemas::DomainId(30_000_142));

    let stored = ruleset::upsert(&pool, &rs).await?;
    assert_eq!(stored.min_pilots, 5);
    assert!(stored
        .tracked_system_ids
        .contains(&sk_schemas::DomainId(30_000_142)));

    let fetched = ruleset::fetch(&pool).await?.expect("ruleset should exist");
    assert_eq!(fetched.min_pilots, 5);

    Ok(())
}

#[tokio::test]
async fn invalid_ruleset_is_rejected_before_any_write() -> anyhow::Result<()> {
    let Ok(pool) = sk_db::testkit_db_pool().await else {
        eprintln!("SKIP: {} not set", sk_db::ENV_TEST_DB_URL);
        return Ok(());
    };

    let mut rs = Ruleset::permissive_default("scenario-test");
    rs.min_pilots = 0;

    let result = ruleset::upsert(&pool, &rs).await;
    assert!(result.is_err());
    Ok(())
}
