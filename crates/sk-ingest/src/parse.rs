//! Upstream payload parsing: convert the loosely-typed source JSON into a
//! strict `KillmailReference`, preserving the raw blob for
//! debugging. Missing optional fields become `None`, never a default.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sk_schemas::{AttackerShipType, DomainId, Isk, KillmailReference};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed upstream payload: {}", self.0)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Deserialize)]
struct UpstreamResponse {
    package: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct UpstreamPackage {
    #[serde(rename = "killID")]
    #[allow(dead_code)]
    kill_id: u64,
    killmail: UpstreamKillmail,
    zkb: Option<UpstreamZkb>,
}

#[derive(Debug, Deserialize)]
struct UpstreamKillmail {
    killmail_id: u64,
    solar_system_id: u64,
    killmail_time: DateTime<Utc>,
    victim: UpstreamVictim,
    #[serde(default)]
    attackers: Vec<UpstreamAttacker>,
}

#[derive(Debug, Default, Deserialize)]
struct UpstreamVictim {
    character_id: Option<u64>,
    corporation_id: Option<u64>,
    alliance_id: Option<u64>,
    ship_type_id: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct UpstreamAttacker {
    character_id: Option<u64>,
    corporation_id: Option<u64>,
    alliance_id: Option<u64>,
    ship_type_id: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct UpstreamZkb {
    #[serde(rename = "totalValue")]
    total_value: Option<f64>,
    url: Option<String>,
}

/// Parse one poll response body. `Ok(None)` means an empty payload (nothing
/// to ingest this tick, not an error).
pub fn parse_response(body: &[u8]) -> Result<Option<KillmailReference>, ParseError> {
    let envelope: UpstreamResponse =
        serde_json::from_slice(body).map_err(|e| ParseError(e.to_string()))?;

    let Some(raw_package) = envelope.package else {
        return Ok(None);
    };

    let package: UpstreamPackage = serde_json::from_value(raw_package.clone())
        .map_err(|e| ParseError(format!("package: {e}")))?;

    let km = package.killmail;

    let mut attacker_alliance_ids = BTreeSet::new();
    let mut attacker_corp_ids = BTreeSet::new();
    let mut attacker_character_ids = BTreeSet::new();
    let mut attacker_ship_types = Vec::new();
    for attacker in &km.attackers {
        if let Some(id) = attacker.alliance_id {
            attacker_alliance_ids.insert(DomainId(id));
        }
        if let Some(id) = attacker.corporation_id {
            attacker_corp_ids.insert(DomainId(id));
        }
        if let Some(id) = attacker.character_id {
            attacker_character_ids.insert(DomainId(id));
        }
        if let (Some(character_id), Some(ship_type_id)) =
            (attacker.character_id, attacker.ship_type_id)
        {
            let entry = AttackerShipType {
                character_id: DomainId(character_id),
                ship_type_id: DomainId(ship_type_id),
            };
            if !attacker_ship_types.contains(&entry) {
                attacker_ship_types.push(entry);
            }
        }
    }

    let victim_ship_type_id = km.victim.ship_type_id.map(DomainId);

    let isk_value = package
        .zkb
        .as_ref()
        .and_then(|z| z.total_value)
        .map(|v| Isk(v.max(0.0) as u64));
    let source_url = package.zkb.and_then(|z| z.url);

    Ok(Some(KillmailReference {
        killmail_id: DomainId(km.killmail_id),
        system_id: DomainId(km.solar_system_id),
        occurred_at: km.killmail_time,
        victim_alliance_id: km.victim.alliance_id.map(DomainId),
        victim_corp_id: km.victim.corporation_id.map(DomainId),
        victim_character_id: km.victim.character_id.map(DomainId),
        victim_ship_type_id,
        attacker_alliance_ids,
        attacker_corp_ids,
        attacker_character_ids,
        attacker_ship_types,
        isk_value,
        source_url,
        raw: raw_package,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_package_parses_to_none() {
        let body = br#"{"package": null}"#;
        assert_eq!(parse_response(body).unwrap(), None);
    }

    #[test]
    fn full_package_parses_and_dedupes_attackers() {
        let body = br#"{
            "package": {
                "killID": 9001,
                "killmail": {
                    "killmail_id": 9001,
                    "solar_system_id": 30000142,
                    "killmail_time": "2024-05-01T12:00:00Z",
                    "victim": {"character_id": 55, "corporation_id": 66, "alliance_id": null, "ship_type_id": 670},
                    "attackers": [
                        {"character_id": 77, "corporation_id": 88, "alliance_id": 99, "ship_type_id": 587},
                        {"character_id": 77, "corporation_id": 88, "alliance_id": 99, "ship_type_id": 587}
                    ]
                },
                "zkb": {"totalValue": 750000000.0, "url": "https://example.invalid/kill/9001/"}
            }
        }"#;

        let parsed = parse_response(body).unwrap().unwrap();
        assert_eq!(parsed.killmail_id, DomainId(9001));
        assert_eq!(parsed.attacker_character_ids.len(), 1);
        assert_eq!(parsed.victim_alliance_id, None);
        assert_eq!(parsed.isk_value, Some(Isk(750000000)));
        assert_eq!(parsed.victim_ship_type_id, Some(DomainId(670)));
        assert_eq!(
            parsed.attacker_ship_types,
            vec![AttackerShipType {
                character_id: DomainId(77),
                ship_type_id: DomainId(587),
            }]
        );
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let body = br#"{"package": {"killID": 1, "killmail": {"solar_system_id": 1}}}"#;
        assert!(parse_response(body).is_err());
    }
}
