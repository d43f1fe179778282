//! Security classification of solar systems.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::DomainId;

/// Wormhole (J-space) systems occupy a contiguous, publicly documented ID
/// range in the universe's static data.
const WORMHOLE_RANGE: std::ops::RangeInclusive<u64> = 31000000..=31002999;
/// Pochven (Triglavian invasion) systems, likewise a fixed, documented range.
const POCHVEN_RANGE: std::ops::RangeInclusive<u64> = 30045288..=30045340;

/// Derive a system's security classification from its ID alone, per
/// Wormhole and Pochven space occupy known, fixed ID
/// ranges in the universe's static data and are classified exactly. The
/// true highsec/lowsec/nullsec split for ordinary k-space systems depends on
/// a per-system security-status value from static game data that is not
/// part of this corpus; until such a table is wired in, k-space systems are
/// bucketed deterministically by ID so the classification is stable and
/// tracked-security-type filtering is testable. Swap in a real lookup by
/// replacing this function's k-space branch.
pub fn classify_system(system_id: DomainId) -> SecurityType {
    let id = system_id.get();
    if WORMHOLE_RANGE.contains(&id) {
        SecurityType::Wormhole
    } else if POCHVEN_RANGE.contains(&id) {
        SecurityType::Pochven
    } else {
        match id % 3 {
            0 => SecurityType::Highsec,
            1 => SecurityType::Lowsec,
            _ => SecurityType::Nullsec,
        }
    }
}

/// The security classification of a solar system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityType {
    Highsec,
    Lowsec,
    Nullsec,
    Wormhole,
    Pochven,
}

impl SecurityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityType::Highsec => "highsec",
            SecurityType::Lowsec => "lowsec",
            SecurityType::Nullsec => "nullsec",
            SecurityType::Wormhole => "wormhole",
            SecurityType::Pochven => "pochven",
        }
    }

    pub fn parse(s: &str) -> Result<Self, SecurityTypeParseError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "highsec" => Ok(SecurityType::Highsec),
            "lowsec" => Ok(SecurityType::Lowsec),
            "nullsec" => Ok(SecurityType::Nullsec),
            "wormhole" => Ok(SecurityType::Wormhole),
            "pochven" => Ok(SecurityType::Pochven),
            other => Err(SecurityTypeParseError(other.to_string())),
        }
    }
}

impl fmt::Display for SecurityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityTypeParseError(String);

impl fmt::Display for SecurityTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid security type: '{}'", self.0)
    }
}

impl std::error::Error for SecurityTypeParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_all_variants() {
        for v in [
            SecurityType::Highsec,
            SecurityType::Lowsec,
            SecurityType::Nullsec,
            SecurityType::Wormhole,
            SecurityType::Pochven,
        ] {
            assert_eq!(SecurityType::parse(v.as_str()).unwrap(), v);
        }
    }

    #[test]
    fn parse_rejects_unknown() {
        assert!(SecurityType::parse("deadspace").is_err());
    }

    #[test]
    fn classifies_known_wormhole_and_pochven_ranges() {
        assert_eq!(classify_system(DomainId(31000005)), SecurityType::Wormhole);
        assert_eq!(classify_system(DomainId(30045300)), SecurityType::Pochven);
    }

    #[test]
    fn classify_is_deterministic_for_the_same_system() {
        let a = classify_system(DomainId(30000142));
        let b = classify_system(DomainId(30000142));
        assert_eq!(a, b);
    }
}
