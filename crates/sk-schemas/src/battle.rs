//! Battle clusters produced by the clustering engine (C6).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{DomainId, Isk};
use crate::security::SecurityType;

/// A spatio-temporal cluster of killmails.
///
/// `side_id` on `BattleParticipant` is reserved for a future side-assignment
/// algorithm; this implementation always leaves it `None` (no community
/// detection is performed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Battle {
    pub battle_id: Uuid,
    pub primary_system_id: DomainId,
    pub security_type: SecurityType,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub killmail_count: u32,
    pub total_isk_destroyed: Isk,
    pub participant_count: u32,
    /// Deterministic external-site link: system id + the window's truncated
    /// start minute, composed once at battle creation and never recomputed.
    pub related_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `related_url`'s fixed external convention: `{system_id}/{unix_minute}`.
pub fn compose_related_url(system_id: DomainId, started_at: DateTime<Utc>) -> String {
    format!("{}/{}", system_id.get(), started_at.timestamp() / 60)
}

/// Join row: which killmail belongs to which battle, with victim/attacker
/// alliance ids and isk value denormalized from the killmail so battle
/// participant breakdowns don't need a join back to `killmails` for common
/// queries. Unique on `(battle_id, killmail_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleKillmail {
    pub battle_id: Uuid,
    pub killmail_id: DomainId,
    pub victim_alliance_id: Option<DomainId>,
    pub attacker_alliance_ids: BTreeSet<DomainId>,
    pub isk_value: Option<Isk>,
    /// Always `None`. Reserved for a future side-assignment algorithm, same
    /// as `BattleParticipant::side_id`.
    pub side_id: Option<DomainId>,
}

/// A character/hull pairing within a battle: one row per distinct
/// `(character_id, ship_type_id)` the character flew across the battle's
/// killmails. `is_victim` is true only for the row produced from the
/// character's own death, never from an appearance as an attacker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleParticipant {
    pub battle_id: Uuid,
    pub character_id: DomainId,
    pub ship_type_id: DomainId,
    pub corp_id: Option<DomainId>,
    pub alliance_id: Option<DomainId>,
    pub is_victim: bool,
    /// Always `None`. Reserved for a future side-assignment algorithm.
    pub side_id: Option<DomainId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn battle_participant_side_id_defaults_none() {
        let p = BattleParticipant {
            battle_id: Uuid::nil(),
            character_id: DomainId(1),
            ship_type_id: DomainId(600),
            corp_id: None,
            alliance_id: None,
            is_victim: false,
            side_id: None,
        };
        assert!(p.side_id.is_none());
    }

    #[test]
    fn related_url_is_deterministic_for_the_same_window() {
        let started_at = Utc::now();
        let a = compose_related_url(DomainId(30000142), started_at);
        let b = compose_related_url(DomainId(30000142), started_at);
        assert_eq!(a, b);
    }
}
