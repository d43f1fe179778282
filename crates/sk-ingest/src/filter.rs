//! Admission filter: a pure predicate over a parsed killmail reference and
//! the current ruleset. No I/O; fully unit-testable.

use sk_schemas::{classify_system, KillmailReference, Ruleset};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionVerdict {
    Admit,
    Drop,
}

/// `participant_count`: victim (if present) plus distinct attacker
/// characters, floored at 1.
fn participant_count(reference: &KillmailReference) -> u32 {
    let victim = if reference.victim_character_id.is_some() { 1 } else { 0 };
    (victim + reference.attacker_character_ids.len() as u32).max(1)
}

/// `ignore_unlisted = false` means tracked lists are informational only —
/// every killmail above the pilot-count floor is admitted, subject to the
/// separate security-type gate. `ignore_unlisted = true` strictly requires
/// the killmail to touch a tracked alliance, corporation, or system.
fn passes_tracking(reference: &KillmailReference, ruleset: &Ruleset) -> bool {
    if !ruleset.ignore_unlisted {
        return true;
    }

    let alliance_hit = reference
        .victim_alliance_id
        .is_some_and(|id| ruleset.tracked_alliance_ids.contains(&id))
        || reference
            .attacker_alliance_ids
            .iter()
            .any(|id| ruleset.tracked_alliance_ids.contains(id));

    let corp_hit = reference
        .victim_corp_id
        .is_some_and(|id| ruleset.tracked_corp_ids.contains(&id))
        || reference
            .attacker_corp_ids
            .iter()
            .any(|id| ruleset.tracked_corp_ids.contains(id));

    let system_hit = ruleset.tracked_system_ids.contains(&reference.system_id);

    alliance_hit || corp_hit || system_hit
}

pub fn evaluate(reference: &KillmailReference, ruleset: &Ruleset) -> AdmissionVerdict {
    if participant_count(reference) < ruleset.min_pilots as u32 {
        return AdmissionVerdict::Drop;
    }

    if !passes_tracking(reference, ruleset) {
        return AdmissionVerdict::Drop;
    }

    if !ruleset.tracked_security_types.is_empty() {
        let security = classify_system(reference.system_id);
        if !ruleset.tracked_security_types.contains(&security) {
            return AdmissionVerdict::Drop;
        }
    }

    AdmissionVerdict::Admit
}

#[cfg(test)]
mod tests {
    use super::*;
    use sk_schemas::DomainId;

    fn reference(victim_alliance: Option<u64>, attacker_alliances: &[u64], system: u64) -> KillmailReference {
        KillmailReference {
            killmail_id: DomainId(1),
            system_id: DomainId(system),
            occurred_at: chrono::Utc::now(),
            victim_alliance_id: victim_alliance.map(DomainId),
            victim_corp_id: None,
            victim_character_id: Some(DomainId(1)),
            victim_ship_type_id: None,
            attacker_alliance_ids: attacker_alliances.iter().map(|&a| DomainId(a)).collect(),
            attacker_corp_ids: Default::default(),
            attacker_character_ids: [DomainId(2), DomainId(3)].into_iter().collect(),
            attacker_ship_types: Vec::new(),
            isk_value: None,
            source_url: None,
            raw: serde_json::Value::Null,
        }
    }

    #[test]
    fn below_min_pilots_is_dropped() {
        let reference = reference(None, &[], 30000142);
        let ruleset = Ruleset {
            min_pilots: 10,
            ..Ruleset::permissive_default("test")
        };
        assert_eq!(evaluate(&reference, &ruleset), AdmissionVerdict::Drop);
    }

    #[test]
    fn permissive_ruleset_admits_everything_above_pilot_floor() {
        let reference = reference(Some(42), &[], 30000142);
        let ruleset = Ruleset::permissive_default("test");
        assert_eq!(evaluate(&reference, &ruleset), AdmissionVerdict::Admit);
    }

    #[test]
    fn ignore_unlisted_drops_killmails_outside_tracked_sets() {
        let reference = reference(Some(42), &[], 30000142);
        let mut ruleset = Ruleset::permissive_default("test");
        ruleset.ignore_unlisted = true;
        ruleset.tracked_alliance_ids.insert(DomainId(99001234));
        assert_eq!(evaluate(&reference, &ruleset), AdmissionVerdict::Drop);
    }

    #[test]
    fn ignore_unlisted_admits_killmails_touching_a_tracked_alliance() {
        let reference = reference(Some(99001234), &[], 30000142);
        let mut ruleset = Ruleset::permissive_default("test");
        ruleset.ignore_unlisted = true;
        ruleset.tracked_alliance_ids.insert(DomainId(99001234));
        assert_eq!(evaluate(&reference, &ruleset), AdmissionVerdict::Admit);
    }

    #[test]
    fn security_type_gate_drops_untracked_classification() {
        let reference = reference(Some(42), &[], 31000005); // wormhole
        let mut ruleset = Ruleset::permissive_default("test");
        ruleset.tracked_security_types.insert(sk_schemas::SecurityType::Highsec);
        assert_eq!(evaluate(&reference, &ruleset), AdmissionVerdict::Drop);
    }
}
