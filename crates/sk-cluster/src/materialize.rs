//! Turns a closed, `min_kills`-qualifying cluster into the rows C6 persists:
//! the `Battle` header plus its `BattleParticipant` and `PilotShipHistory`
//! rows. Pure; no I/O.

use sk_schemas::{
    classify_system, compose_related_url, Battle, BattleKillmail, BattleParticipant, DomainId, Isk,
    PilotShipHistory,
};
use uuid::Uuid;

use crate::group::Cluster;

pub struct MaterializedBattle {
    pub battle: Battle,
    pub participants: Vec<BattleParticipant>,
    pub killmails: Vec<BattleKillmail>,
    pub ship_history: Vec<PilotShipHistory>,
}

/// Build a new battle (and its participant/ship-history rows) from a closed
/// cluster. The cluster MUST already satisfy `min_kills` — callers that
/// don't are expected to mark the events processed with no battle instead.
pub fn materialize(cluster: &Cluster, battle_id: Uuid) -> MaterializedBattle {
    let started_at = cluster.started_at();
    let ended_at = cluster.ended_at();
    let security_type = classify_system(cluster.system_id);
    let related_url = compose_related_url(cluster.system_id, started_at);

    let total_isk_destroyed = Isk(cluster
        .events
        .iter()
        .map(|e| e.isk_value.map(Isk::get).unwrap_or(0))
        .sum());

    let mut participants: Vec<BattleParticipant> = Vec::new();
    let mut killmails: Vec<BattleKillmail> = Vec::new();
    let mut ship_history: Vec<PilotShipHistory> = Vec::new();
    let mut seen: std::collections::BTreeSet<(DomainId, DomainId)> = std::collections::BTreeSet::new();

    for event in &cluster.events {
        killmails.push(BattleKillmail {
            battle_id,
            killmail_id: event.killmail_id,
            victim_alliance_id: event.victim_alliance_id,
            attacker_alliance_ids: event.attacker_alliance_ids.clone(),
            isk_value: event.isk_value,
            side_id: None,
        });

        if let (Some(character_id), Some(ship_type_id)) =
            (event.victim_character_id, event.victim_ship_type_id)
        {
            if seen.insert((character_id, ship_type_id)) {
                participants.push(BattleParticipant {
                    battle_id,
                    character_id,
                    ship_type_id,
                    corp_id: event.victim_corp_id,
                    alliance_id: event.victim_alliance_id,
                    is_victim: true,
                    side_id: None,
                });
            }
            ship_history.push(PilotShipHistory {
                character_id,
                killmail_id: event.killmail_id,
                ship_type_id,
                system_id: event.system_id,
                corp_id: event.victim_corp_id,
                alliance_id: event.victim_alliance_id,
                ship_value: Isk(0),
                killmail_value: event.isk_value.unwrap_or(Isk(0)),
                occurred_at: event.occurred_at,
                is_loss: true,
            });
        }

        for attacker in &event.attacker_ship_types {
            if seen.insert((attacker.character_id, attacker.ship_type_id)) {
                participants.push(BattleParticipant {
                    battle_id,
                    character_id: attacker.character_id,
                    ship_type_id: attacker.ship_type_id,
                    corp_id: None,
                    alliance_id: None,
                    is_victim: false,
                    side_id: None,
                });
            }
            ship_history.push(PilotShipHistory {
                character_id: attacker.character_id,
                killmail_id: event.killmail_id,
                ship_type_id: attacker.ship_type_id,
                system_id: event.system_id,
                corp_id: None,
                alliance_id: None,
                ship_value: Isk(0),
                killmail_value: event.isk_value.unwrap_or(Isk(0)),
                occurred_at: event.occurred_at,
                is_loss: false,
            });
        }
    }

    let battle = Battle {
        battle_id,
        primary_system_id: cluster.system_id,
        security_type,
        started_at,
        ended_at,
        killmail_count: cluster.events.len() as u32,
        total_isk_destroyed,
        participant_count: participants.len() as u32,
        related_url,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    };

    MaterializedBattle {
        battle,
        participants,
        killmails,
        ship_history,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use sk_schemas::{AttackerShipType, KillmailEvent};
    use std::collections::BTreeSet;

    fn event(killmail_id: u64, minute: i64) -> KillmailEvent {
        let base = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        KillmailEvent {
            killmail_id: DomainId(killmail_id),
            system_id: DomainId(30000142),
            occurred_at: base + chrono::Duration::minutes(minute),
            victim_alliance_id: None,
            victim_corp_id: Some(DomainId(500)),
            victim_character_id: Some(DomainId(1)),
            victim_ship_type_id: Some(DomainId(670)),
            attacker_alliance_ids: BTreeSet::new(),
            attacker_corp_ids: BTreeSet::new(),
            attacker_character_ids: BTreeSet::from([DomainId(2)]),
            attacker_ship_types: vec![AttackerShipType {
                character_id: DomainId(2),
                ship_type_id: DomainId(587),
            }],
            isk_value: Some(Isk(1_000_000)),
            source_url: None,
            fetched_at: base,
            processed_at: None,
            battle_id: None,
        }
    }

    #[test]
    fn materialize_sums_isk_and_produces_one_participant_row_per_hull() {
        let cluster = Cluster {
            system_id: DomainId(30000142),
            events: vec![event(1, 0), event(2, 5)],
        };
        let battle_id = Uuid::nil();
        let m = materialize(&cluster, battle_id);

        assert_eq!(m.battle.killmail_count, 2);
        assert_eq!(m.battle.total_isk_destroyed, Isk(2_000_000));
        // victim (1,670) and attacker (2,587) each appear once despite two events
        assert_eq!(m.participants.len(), 2);
        assert!(m.participants.iter().any(|p| p.is_victim && p.character_id == DomainId(1)));
        assert!(m.participants.iter().any(|p| !p.is_victim && p.character_id == DomainId(2)));
        // ship history has one row per (character, killmail)
        assert_eq!(m.ship_history.len(), 4);
    }

    #[test]
    fn victim_without_a_reported_ship_type_gets_no_participant_row() {
        let mut ev = event(1, 0);
        ev.victim_ship_type_id = None;
        let cluster = Cluster {
            system_id: DomainId(30000142),
            events: vec![ev],
        };
        let m = materialize(&cluster, Uuid::nil());
        assert!(m.participants.iter().all(|p| !p.is_victim));
    }
}
