//! Shared domain types for the battle-reconstruction pipeline.
//!
//! Every `sk-*` crate depends on this one for its wire and storage types, so
//! nothing here should depend on `sqlx`, `axum`, or `reqwest` — those belong
//! at the edges, not in the domain model.

pub mod battle;
pub mod enrichment;
pub mod ids;
pub mod killmail;
pub mod name;
pub mod ruleset;
pub mod security;
pub mod ship_history;

pub use battle::{compose_related_url, Battle, BattleKillmail, BattleParticipant};
pub use enrichment::{
    EnrichmentCategory, EnrichmentQueueEntry, EnrichmentRecord, EnrichmentStatus, MAX_ENTITY_ATTEMPTS,
};
pub use ids::{DomainId, Isk};
pub use killmail::{AttackerShipType, KillmailEvent, KillmailReference};
pub use name::NameRecord;
pub use ruleset::{Ruleset, RulesetValidationError, RULESET_SINGLETON_ID};
pub use security::{classify_system, SecurityType, SecurityTypeParseError};
pub use ship_history::PilotShipHistory;
