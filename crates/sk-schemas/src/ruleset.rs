//! Ruleset — the single active admission filter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::ids::DomainId;
use crate::security::SecurityType;

/// The fixed UUID of the single active ruleset row.
pub const RULESET_SINGLETON_ID: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0001);

pub const MAX_TRACKED_ENTITIES: usize = 250;
pub const MAX_TRACKED_SYSTEMS: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ruleset {
    pub min_pilots: u16,
    pub tracked_alliance_ids: BTreeSet<DomainId>,
    pub tracked_corp_ids: BTreeSet<DomainId>,
    pub tracked_system_ids: BTreeSet<DomainId>,
    pub tracked_security_types: BTreeSet<SecurityType>,
    pub ignore_unlisted: bool,
    pub updated_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ruleset {
    /// `min_pilots` must be >= 1; tracked-entity lists <= 250; tracked-system
    /// list <= 1000.
    pub fn validate(&self) -> Result<(), RulesetValidationError> {
        if self.min_pilots < 1 {
            return Err(RulesetValidationError::MinPilotsZero);
        }
        if self.tracked_alliance_ids.len() > MAX_TRACKED_ENTITIES {
            return Err(RulesetValidationError::TooManyEntities {
                field: "tracked_alliance_ids",
                limit: MAX_TRACKED_ENTITIES,
            });
        }
        if self.tracked_corp_ids.len() > MAX_TRACKED_ENTITIES {
            return Err(RulesetValidationError::TooManyEntities {
                field: "tracked_corp_ids",
                limit: MAX_TRACKED_ENTITIES,
            });
        }
        if self.tracked_system_ids.len() > MAX_TRACKED_SYSTEMS {
            return Err(RulesetValidationError::TooManyEntities {
                field: "tracked_system_ids",
                limit: MAX_TRACKED_SYSTEMS,
            });
        }
        Ok(())
    }

    /// An empty ruleset that admits everything with at least one participant.
    /// Used as the boot default before any operator has configured rules.
    pub fn permissive_default(updated_by: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            min_pilots: 1,
            tracked_alliance_ids: BTreeSet::new(),
            tracked_corp_ids: BTreeSet::new(),
            tracked_system_ids: BTreeSet::new(),
            tracked_security_types: BTreeSet::new(),
            ignore_unlisted: false,
            updated_by: updated_by.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RulesetValidationError {
    MinPilotsZero,
    TooManyEntities {
        field: &'static str,
        limit: usize,
    },
}

impl std::fmt::Display for RulesetValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RulesetValidationError::MinPilotsZero => {
                write!(f, "min_pilots must be >= 1")
            }
            RulesetValidationError::TooManyEntities { field, limit } => {
                write!(f, "{field} exceeds the limit of {limit} entries")
            }
        }
    }
}

impl std::error::Error for RulesetValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissive_default_validates() {
        let r = Ruleset::permissive_default("system");
        assert!(r.validate().is_ok());
    }

    #[test]
    fn zero_min_pilots_rejected() {
        let mut r = Ruleset::permissive_default("system");
        r.min_pilots = 0;
        assert_eq!(r.validate().unwrap_err(), RulesetValidationError::MinPilotsZero);
    }

    #[test]
    fn oversized_tracked_list_rejected() {
        let mut r = Ruleset::permissive_default("system");
        r.tracked_system_ids = (0..(MAX_TRACKED_SYSTEMS as u64 + 1)).map(DomainId).collect();
        assert!(matches!(
            r.validate().unwrap_err(),
            RulesetValidationError::TooManyEntities { field: "tracked_system_ids", .. }
        ));
    }
}
