//! Translation between the storage-side `EnrichmentCategory` and the
//! client-side `ResourceClass` — the two exist because the queue only ever
//! carries character/corp/alliance ids, while the identity client also
//! resolves ship types and systems for `sk-names`.

use sk_apiclient::ResourceClass;
use sk_schemas::EnrichmentCategory;

pub fn resource_class(category: EnrichmentCategory) -> ResourceClass {
    match category {
        EnrichmentCategory::Character => ResourceClass::Character,
        EnrichmentCategory::Corporation => ResourceClass::Corporation,
        EnrichmentCategory::Alliance => ResourceClass::Alliance,
    }
}
