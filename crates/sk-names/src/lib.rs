//! Name enricher (C8): batch-resolves a mixed list of identifiers
//! (characters, corps, alliances, systems, ship types) against the
//! external-API client, coalescing one upstream batch per category and
//! tolerating partial resolution.

use std::collections::HashMap;

use futures_util::future::join_all;
use sk_apiclient::{IdentityResolver, ResourceClass};
use sk_schemas::DomainId;
use tracing::debug;

/// Every category C7 responses may need to hydrate. Character/Corporation/
/// Alliance also feed the durable enrichment queue (C5); System/ShipType are
/// universe-static reference data resolved on demand only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupCategory {
    Character,
    Corporation,
    Alliance,
    System,
    ShipType,
}

impl LookupCategory {
    fn resource_class(self) -> ResourceClass {
        match self {
            LookupCategory::Character => ResourceClass::Character,
            LookupCategory::Corporation => ResourceClass::Corporation,
            LookupCategory::Alliance => ResourceClass::Alliance,
            LookupCategory::System | LookupCategory::ShipType => ResourceClass::UniverseStatic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ResolvedName {
    pub id: DomainId,
    pub category: &'static str,
    pub name: String,
    pub ticker: Option<String>,
}

fn category_label(category: LookupCategory) -> &'static str {
    match category {
        LookupCategory::Character => "character",
        LookupCategory::Corporation => "corporation",
        LookupCategory::Alliance => "alliance",
        LookupCategory::System => "system",
        LookupCategory::ShipType => "ship_type",
    }
}

/// Resolve every `(id, category)` pair, grouping upstream calls by category.
/// Entries the resolver can't satisfy (network failure, unknown id) are
/// simply absent from the returned map — callers render the raw ID.
pub async fn resolve_batch(
    resolver: &dyn IdentityResolver,
    requests: &[(DomainId, LookupCategory)],
) -> HashMap<DomainId, ResolvedName> {
    let mut by_category: HashMap<LookupCategory, Vec<DomainId>> = HashMap::new();
    for &(id, category) in requests {
        by_category.entry(category).or_default().push(id);
    }

    let mut resolved = HashMap::with_capacity(requests.len());
    for (category, ids) in by_category {
        let class = category.resource_class();
        let futures = ids.iter().map(|&id| resolver.resolve(class, id));
        let results = join_all(futures).await;
        for (id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(Some(identity)) => {
                    resolved.insert(
                        id,
                        ResolvedName {
                            id,
                            category: category_label(category),
                            name: identity.name,
                            ticker: identity.ticker,
                        },
                    );
                }
                Ok(None) => debug!(id = id.get(), "identity unresolved"),
                Err(err) => debug!(id = id.get(), error = %err, "identity resolve failed"),
            }
        }
    }

    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use sk_apiclient::{FakeIdentityResolver, ResolvedIdentity};

    #[tokio::test]
    async fn resolves_known_ids_and_omits_unknown_ones() {
        let resolver = FakeIdentityResolver::new();
        resolver.seed(
            ResourceClass::Character,
            ResolvedIdentity {
                id: DomainId(1),
                name: "Alice".to_string(),
                ticker: None,
            },
        );
        resolver.seed(
            ResourceClass::Alliance,
            ResolvedIdentity {
                id: DomainId(99),
                name: "Goonswarm".to_string(),
                ticker: Some("CONDI".to_string()),
            },
        );

        let requests = vec![
            (DomainId(1), LookupCategory::Character),
            (DomainId(2), LookupCategory::Character),
            (DomainId(99), LookupCategory::Alliance),
        ];
        let resolved = resolve_batch(&resolver, &requests).await;

        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[&DomainId(1)].name, "Alice");
        assert_eq!(resolved[&DomainId(99)].ticker.as_deref(), Some("CONDI"));
        assert!(!resolved.contains_key(&DomainId(2)));
    }

    #[tokio::test]
    async fn empty_request_list_resolves_to_empty_map() {
        let resolver = FakeIdentityResolver::new();
        let resolved = resolve_batch(&resolver, &[]).await;
        assert!(resolved.is_empty());
    }
}
