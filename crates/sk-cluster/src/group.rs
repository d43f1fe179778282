//! The pure clustering walk: no I/O, fully unit-testable.

use chrono::{DateTime, Utc};
use sk_schemas::KillmailEvent;

/// Clustering thresholds, expressed as minutes to mirror the configuration
/// surface directly.
#[derive(Debug, Clone, Copy)]
pub struct ClusterParams {
    pub window_minutes: i64,
    pub gap_max_minutes: i64,
    pub min_kills: u32,
}

/// A contiguous run of events in the same system that belong together.
/// `events` is always ordered by `occurred_at` ascending.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub system_id: sk_schemas::DomainId,
    pub events: Vec<KillmailEvent>,
}

impl Cluster {
    pub fn started_at(&self) -> DateTime<Utc> {
        self.events.first().expect("cluster is never empty").occurred_at
    }

    pub fn ended_at(&self) -> DateTime<Utc> {
        self.events.last().expect("cluster is never empty").occurred_at
    }

    pub fn meets_min_kills(&self, params: &ClusterParams) -> bool {
        self.events.len() as u32 >= params.min_kills
    }
}

/// Group a time-ordered batch by `system_id`, then walk each group opening a
/// new cluster whenever the gap from the previous event exceeds
/// `gap_max_minutes` or the span from the cluster's first event exceeds
/// `window_minutes`. `events` MUST already be sorted by
/// `(occurred_at, killmail_id)` ascending within each system — the caller's
/// DB query provides this ordering.
pub fn cluster_batch(events: Vec<KillmailEvent>, params: &ClusterParams) -> Vec<Cluster> {
    let mut by_system: std::collections::BTreeMap<sk_schemas::DomainId, Vec<KillmailEvent>> =
        std::collections::BTreeMap::new();
    for event in events {
        by_system.entry(event.system_id).or_default().push(event);
    }

    let mut clusters = Vec::new();
    for (system_id, group) in by_system {
        clusters.extend(walk_system(system_id, group, params));
    }
    clusters
}

fn walk_system(
    system_id: sk_schemas::DomainId,
    events: Vec<KillmailEvent>,
    params: &ClusterParams,
) -> Vec<Cluster> {
    let gap_max = chrono::Duration::minutes(params.gap_max_minutes);
    let window = chrono::Duration::minutes(params.window_minutes);

    let mut clusters = Vec::new();
    let mut current: Vec<KillmailEvent> = Vec::new();

    for event in events {
        let should_close = match current.last() {
            None => false,
            Some(last) => {
                let gap = event.occurred_at - last.occurred_at;
                let span = event.occurred_at - current[0].occurred_at;
                gap > gap_max || span > window
            }
        };

        if should_close {
            clusters.push(Cluster {
                system_id,
                events: std::mem::take(&mut current),
            });
        }

        current.push(event);
    }

    if !current.is_empty() {
        clusters.push(Cluster { system_id, events: current });
    }

    clusters
}

#[cfg(test)]
mod tests {
    use super::*;
    use sk_schemas::DomainId;
    use std::collections::BTreeSet;

    fn event_at(id: u64, system: u64, minute: i64) -> KillmailEvent {
        let base = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        KillmailEvent {
            killmail_id: DomainId(id),
            system_id: DomainId(system),
            occurred_at: base + chrono::Duration::minutes(minute),
            victim_alliance_id: None,
            victim_corp_id: None,
            victim_character_id: Some(DomainId(1)),
            victim_ship_type_id: None,
            attacker_alliance_ids: BTreeSet::new(),
            attacker_corp_ids: BTreeSet::new(),
            attacker_character_ids: BTreeSet::from([DomainId(2)]),
            attacker_ship_types: Vec::new(),
            isk_value: None,
            source_url: None,
            fetched_at: base,
            processed_at: None,
            battle_id: None,
        }
    }

    #[test]
    fn gap_exceeding_threshold_splits_the_cluster() {
        let params = ClusterParams {
            window_minutes: 30,
            gap_max_minutes: 15,
            min_kills: 2,
        };
        let events = vec![
            event_at(1, 30000142, 0),
            event_at(2, 30000142, 5),
            event_at(3, 30000142, 25),
        ];

        let clusters = cluster_batch(events, &params);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].events.len(), 2);
        assert_eq!(clusters[1].events.len(), 1);
        assert!(clusters[0].meets_min_kills(&params));
        assert!(!clusters[1].meets_min_kills(&params));
    }

    #[test]
    fn window_exceeding_threshold_splits_even_with_small_gaps() {
        let params = ClusterParams {
            window_minutes: 10,
            gap_max_minutes: 15,
            min_kills: 2,
        };
        let events = vec![
            event_at(1, 30000142, 0),
            event_at(2, 30000142, 8),
            event_at(3, 30000142, 16),
        ];

        let clusters = cluster_batch(events, &params);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].events.len(), 2);
        assert_eq!(clusters[1].events.len(), 1);
    }

    #[test]
    fn distinct_systems_never_share_a_cluster() {
        let params = ClusterParams {
            window_minutes: 30,
            gap_max_minutes: 15,
            min_kills: 1,
        };
        let events = vec![event_at(1, 30000142, 0), event_at(2, 30000144, 1)];
        let clusters = cluster_batch(events, &params);
        assert_eq!(clusters.len(), 2);
    }
}
