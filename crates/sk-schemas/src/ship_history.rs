//! Pilot ship history — the ship a character was flying in a given killmail,
//! populated as C6 attaches the killmail to a battle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{DomainId, Isk};

/// One row per distinct `(character_id, killmail_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PilotShipHistory {
    pub character_id: DomainId,
    pub killmail_id: DomainId,
    pub ship_type_id: DomainId,
    pub system_id: DomainId,
    pub corp_id: Option<DomainId>,
    pub alliance_id: Option<DomainId>,
    pub ship_value: Isk,
    pub killmail_value: Isk,
    pub occurred_at: DateTime<Utc>,
    /// True if the character was the victim on this killmail, false if an attacker.
    pub is_loss: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_loss_distinguishes_victim_from_attacker_rows() {
        let victim = PilotShipHistory {
            character_id: DomainId(1),
            killmail_id: DomainId(100),
            ship_type_id: DomainId(670),
            system_id: DomainId(30000142),
            corp_id: None,
            alliance_id: None,
            ship_value: Isk(0),
            killmail_value: Isk(0),
            occurred_at: Utc::now(),
            is_loss: true,
        };
        assert!(victim.is_loss);
    }
}
