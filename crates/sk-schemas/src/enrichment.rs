//! Identity enrichment queue rows (C5), including retry/backoff fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::DomainId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentCategory {
    Character,
    Corporation,
    Alliance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
}

/// Once a per-entity queue row has failed this many times, it is treated as
/// permanently unresolvable rather than retried further, and any killmail
/// referencing it is marked `failed` instead of staying `processing` forever.
pub const MAX_ENTITY_ATTEMPTS: u32 = 8;

/// One entity (character/corp/alliance id) awaiting name/ticker resolution.
///
/// This is C5's internal work queue, deduplicated on `(entity_id,
/// category)` since many killmails share the same corp/alliance — it is not
/// the outward-facing per-killmail record; see [`EnrichmentRecord`] for
/// that.
///
/// State machine: `pending -> processing -> {succeeded, failed}`. A `failed`
/// row with `next_attempt_at` in the past is eligible to be reclaimed back to
/// `pending` by the worker's retry sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentQueueEntry {
    pub entity_id: DomainId,
    pub category: EnrichmentCategory,
    pub status: EnrichmentStatus,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EnrichmentQueueEntry {
    pub fn pending(entity_id: DomainId, category: EnrichmentCategory) -> Self {
        let now = Utc::now();
        Self {
            entity_id,
            category,
            status: EnrichmentStatus::Pending,
            attempt_count: 0,
            last_error: None,
            next_attempt_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// Exponential backoff capped at 1 hour, keyed off `attempt_count`.
    pub fn backoff_delay(attempt_count: u32) -> chrono::Duration {
        let secs = 2u64.saturating_pow(attempt_count.min(12)).saturating_mul(5);
        chrono::Duration::seconds(secs.min(3600) as i64)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, EnrichmentStatus::Pending)
            || (matches!(self.status, EnrichmentStatus::Failed) && self.next_attempt_at <= now)
    }
}

/// One row per killmail, tracking the overall state of resolving every
/// entity the killmail references. This is the outward contract C7 joins
/// against: a killmail is `succeeded` once every distinct entity it names
/// has a resolved name, `failed` if any could not be resolved after
/// exhausting retries, `processing` while any are still outstanding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    pub killmail_id: DomainId,
    pub status: EnrichmentStatus,
    /// Resolved names for every entity this killmail references, present
    /// once `status` is `succeeded`.
    pub payload: Option<Vec<crate::name::NameRecord>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EnrichmentRecord {
    pub fn pending(killmail_id: DomainId) -> Self {
        let now = Utc::now();
        Self {
            killmail_id,
            status: EnrichmentStatus::Pending,
            payload: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(EnrichmentQueueEntry::backoff_delay(0), chrono::Duration::seconds(5));
        assert_eq!(EnrichmentQueueEntry::backoff_delay(1), chrono::Duration::seconds(10));
        assert_eq!(EnrichmentQueueEntry::backoff_delay(20), chrono::Duration::seconds(3600));
    }

    #[test]
    fn pending_record_is_always_due() {
        let rec = EnrichmentQueueEntry::pending(DomainId(1), EnrichmentCategory::Character);
        assert!(rec.is_due(Utc::now()));
    }

    #[test]
    fn failed_record_due_only_after_next_attempt_at() {
        let mut rec = EnrichmentQueueEntry::pending(DomainId(1), EnrichmentCategory::Character);
        rec.status = EnrichmentStatus::Failed;
        rec.next_attempt_at = Utc::now() + chrono::Duration::seconds(60);
        assert!(!rec.is_due(Utc::now()));
        assert!(rec.is_due(Utc::now() + chrono::Duration::seconds(61)));
    }
}
