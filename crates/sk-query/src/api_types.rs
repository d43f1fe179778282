//! Response envelopes returned by the query surface's HTTP handlers.

use serde::Serialize;
use sk_schemas::{Battle, BattleParticipant, EnrichmentRecord, KillmailEvent, Ruleset};

use crate::hydrate::NameMap;

#[derive(Serialize)]
pub struct BattleListResponse {
    pub battles: Vec<Battle>,
    pub names: NameMap,
    pub next_cursor: Option<String>,
}

#[derive(Serialize)]
pub struct BattleDetailResponse {
    pub battle: Battle,
    pub participants: Vec<BattleParticipant>,
    pub killmails: Vec<KillmailEvent>,
    /// Enrichment status per killmail, keyed by killmail id, for every
    /// killmail in this battle that has started enrichment.
    pub enrichment: Vec<EnrichmentRecord>,
    pub names: NameMap,
}

#[derive(Serialize)]
pub struct KillmailListResponse {
    pub killmails: Vec<KillmailEvent>,
    pub names: NameMap,
    pub next_cursor: Option<String>,
}

#[derive(Serialize)]
pub struct RulesetResponse {
    #[serde(flatten)]
    pub ruleset: Ruleset,
}
