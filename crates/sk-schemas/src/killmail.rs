//! KillmailEvent — the admitted fact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::ids::{DomainId, Isk};

/// Which hull an attacking character was flying, for pilot ship history.
/// Only attackers the upstream reported a ship type for are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackerShipType {
    pub character_id: DomainId,
    pub ship_type_id: DomainId,
}

/// An admitted killmail, as stored by the event store (C1).
///
/// Invariant: `processed_at.is_none() == battle_id.is_none()`. Once either is
/// set by the clustering engine, both are immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillmailEvent {
    pub killmail_id: DomainId,
    pub system_id: DomainId,
    pub occurred_at: DateTime<Utc>,
    pub victim_alliance_id: Option<DomainId>,
    pub victim_corp_id: Option<DomainId>,
    pub victim_character_id: Option<DomainId>,
    pub victim_ship_type_id: Option<DomainId>,
    pub attacker_alliance_ids: BTreeSet<DomainId>,
    pub attacker_corp_ids: BTreeSet<DomainId>,
    pub attacker_character_ids: BTreeSet<DomainId>,
    pub attacker_ship_types: Vec<AttackerShipType>,
    pub isk_value: Option<Isk>,
    pub source_url: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub battle_id: Option<Uuid>,
}

impl KillmailEvent {
    /// `participant_count`: victim (if present) plus distinct attacker
    /// characters, floored at 1.
    pub fn participant_count(&self) -> u32 {
        let victim = if self.victim_character_id.is_some() {
            1
        } else {
            0
        };
        let count = victim + self.attacker_character_ids.len() as u32;
        count.max(1)
    }
}

/// A loosely-typed reference as parsed from the upstream source payload,
/// before admission filtering. Kept separate from `KillmailEvent` so the raw
/// upstream blob can be preserved for debugging without polluting the
/// storage type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KillmailReference {
    pub killmail_id: DomainId,
    pub system_id: DomainId,
    pub occurred_at: DateTime<Utc>,
    pub victim_alliance_id: Option<DomainId>,
    pub victim_corp_id: Option<DomainId>,
    pub victim_character_id: Option<DomainId>,
    pub victim_ship_type_id: Option<DomainId>,
    pub attacker_alliance_ids: BTreeSet<DomainId>,
    pub attacker_corp_ids: BTreeSet<DomainId>,
    pub attacker_character_ids: BTreeSet<DomainId>,
    pub attacker_ship_types: Vec<AttackerShipType>,
    pub isk_value: Option<Isk>,
    pub source_url: Option<String>,
    /// The raw upstream JSON, preserved verbatim for debugging. Never
    /// re-derived from the typed fields above.
    pub raw: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(victim: bool, attackers: usize) -> KillmailEvent {
        KillmailEvent {
            killmail_id: DomainId(1),
            system_id: DomainId(30000142),
            occurred_at: Utc::now(),
            victim_alliance_id: None,
            victim_corp_id: None,
            victim_character_id: if victim { Some(DomainId(1)) } else { None },
            victim_ship_type_id: None,
            attacker_alliance_ids: BTreeSet::new(),
            attacker_corp_ids: BTreeSet::new(),
            attacker_character_ids: (0..attackers).map(|i| DomainId(i as u64 + 100)).collect(),
            attacker_ship_types: Vec::new(),
            isk_value: None,
            source_url: None,
            fetched_at: Utc::now(),
            processed_at: None,
            battle_id: None,
        }
    }

    #[test]
    fn participant_count_floors_at_one() {
        let ev = sample(false, 0);
        assert_eq!(ev.participant_count(), 1);
    }

    #[test]
    fn participant_count_sums_victim_and_attackers() {
        let ev = sample(true, 3);
        assert_eq!(ev.participant_count(), 4);
    }
}
