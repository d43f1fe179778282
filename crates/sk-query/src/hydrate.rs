//! Response hydration (C8 glue): collects every identifier a response is
//! about to render and resolves them all in one coalesced pass rather than
//! once per field.

use std::collections::HashMap;

use sk_apiclient::IdentityResolver;
use sk_names::{resolve_batch, LookupCategory, ResolvedName};
use sk_schemas::{Battle, BattleParticipant, DomainId, KillmailEvent};

pub type NameMap = HashMap<String, ResolvedName>;

async fn resolve(
    resolver: &dyn IdentityResolver,
    requests: Vec<(DomainId, LookupCategory)>,
) -> NameMap {
    resolve_batch(resolver, &requests)
        .await
        .into_iter()
        .map(|(id, name)| (id.to_string(), name))
        .collect()
}

fn push_killmail_requests(event: &KillmailEvent, out: &mut Vec<(DomainId, LookupCategory)>) {
    out.push((event.system_id, LookupCategory::System));
    if let Some(id) = event.victim_character_id {
        out.push((id, LookupCategory::Character));
    }
    if let Some(id) = event.victim_corp_id {
        out.push((id, LookupCategory::Corporation));
    }
    if let Some(id) = event.victim_alliance_id {
        out.push((id, LookupCategory::Alliance));
    }
    if let Some(id) = event.victim_ship_type_id {
        out.push((id, LookupCategory::ShipType));
    }
    for id in &event.attacker_character_ids {
        out.push((*id, LookupCategory::Character));
    }
    for id in &event.attacker_corp_ids {
        out.push((*id, LookupCategory::Corporation));
    }
    for id in &event.attacker_alliance_ids {
        out.push((*id, LookupCategory::Alliance));
    }
    for ast in &event.attacker_ship_types {
        out.push((ast.character_id, LookupCategory::Character));
        out.push((ast.ship_type_id, LookupCategory::ShipType));
    }
}

pub async fn hydrate_killmails(resolver: &dyn IdentityResolver, events: &[KillmailEvent]) -> NameMap {
    let mut requests = Vec::new();
    for event in events {
        push_killmail_requests(event, &mut requests);
    }
    resolve(resolver, requests).await
}

fn push_participant_requests(participant: &BattleParticipant, out: &mut Vec<(DomainId, LookupCategory)>) {
    out.push((participant.character_id, LookupCategory::Character));
    out.push((participant.ship_type_id, LookupCategory::ShipType));
    if let Some(id) = participant.corp_id {
        out.push((id, LookupCategory::Corporation));
    }
    if let Some(id) = participant.alliance_id {
        out.push((id, LookupCategory::Alliance));
    }
}

pub async fn hydrate_battle(
    resolver: &dyn IdentityResolver,
    battle: &Battle,
    participants: &[BattleParticipant],
) -> NameMap {
    let mut requests = vec![(battle.primary_system_id, LookupCategory::System)];
    for p in participants {
        push_participant_requests(p, &mut requests);
    }
    resolve(resolver, requests).await
}

pub async fn hydrate_battles(resolver: &dyn IdentityResolver, battles: &[Battle]) -> NameMap {
    let requests = battles
        .iter()
        .map(|b| (b.primary_system_id, LookupCategory::System))
        .collect();
    resolve(resolver, requests).await
}
