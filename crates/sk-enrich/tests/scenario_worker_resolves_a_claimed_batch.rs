use std::sync::Arc;

use sk_apiclient::{FakeIdentityResolver, ResolvedIdentity, ResourceClass};
use sk_enrich::worker::{run_iteration, EnrichDeps};
use sk_schemas::{DomainId, EnrichmentCategory};

#[tokio::test]
async fn resolved_entity_is_stored_and_marked_succeeded() -> anyhow::Result<()> {
    let Ok(pool) = sk_db::testkit_db_pool().await else {
        eprintln!("SKIP: {} not set", sk_db::ENV_TEST_DB_URL);
        return Ok(());
    };

    let entity_id = DomainId(950_100_001);
    sk_db::enrichment::enqueue(&pool, entity_id, EnrichmentCategory::Character).await?;

    let resolver = Arc::new(FakeIdentityResolver::new());
    resolver.seed(
        ResourceClass::Character,
        ResolvedIdentity {
            id: entity_id,
            name: "Test Pilot".to_string(),
            ticker: None,
        },
    );

    let deps = EnrichDeps {
        pool: pool.clone(),
        resolver,
    };

    let outcome = run_iteration(&deps, 10, 4).await?;
    assert!(outcome.claimed >= 1);
    assert_eq!(outcome.failed, 0);

    let stored = sk_db::names::fetch_many(&pool, EnrichmentCategory::Character, &[entity_id]).await?;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].name, "Test Pilot");
    Ok(())
}

#[tokio::test]
async fn unresolvable_entity_is_marked_failed_with_backoff() -> anyhow::Result<()> {
    let Ok(pool) = sk_db::testkit_db_pool().await else {
        eprintln!("SKIP: {} not set", sk_db::ENV_TEST_DB_URL);
        return Ok(());
    };

    let entity_id = DomainId(950_100_002);
    sk_db::enrichment::enqueue(&pool, entity_id, EnrichmentCategory::Alliance).await?;

    let resolver = Arc::new(FakeIdentityResolver::new());
    let deps = EnrichDeps {
        pool: pool.clone(),
        resolver,
    };

    let outcome = run_iteration(&deps, 10, 4).await?;
    assert!(outcome.claimed >= 1);
    assert_eq!(outcome.succeeded, 0);

    let immediate_retry = sk_db::enrichment::claim_due_batch(&pool, 10).await?;
    assert!(!immediate_retry.iter().any(|r| r.entity_id == entity_id));
    Ok(())
}
