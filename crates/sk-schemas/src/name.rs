//! Resolved identity names (C8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enrichment::EnrichmentCategory;
use crate::ids::DomainId;

/// A resolved name for a character, corporation, or alliance id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameRecord {
    pub entity_id: DomainId,
    pub category: EnrichmentCategory,
    pub name: String,
    /// Corporations and alliances carry a ticker; characters never do.
    pub ticker: Option<String>,
    pub resolved_at: DateTime<Utc>,
}
