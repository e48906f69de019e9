//! Candidate selection and ordering.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use super::{CandidateOrigin, CooldownKey, SearchCandidate};
use crate::arr::{ArrKind, SearchTarget};
use crate::catalog::MissingItem;
use crate::config::EntrySearchConfig;
use crate::requests::RequestedMedia;

/// Episodes are searched once they aired at least this long ago.
const EPISODE_AIR_GRACE_HOURS: i64 = 2;

/// Whether an item is worth searching at all.
fn wanted(
    item: &MissingItem,
    kind: ArrKind,
    config: &EntrySearchConfig,
    queued: &HashSet<i64>,
    now: DateTime<Utc>,
) -> bool {
    if !item.monitored || !item.parent_monitored {
        return false;
    }
    let needs_file = !item.has_file
        || config.do_upgrade_search
        || (config.quality_unmet_search && !item.quality_cutoff_met);
    if !needs_file {
        return false;
    }
    if !config.also_search_specials && item.is_special() {
        return false;
    }
    if queued.contains(&item.id) {
        return false;
    }

    let released_before = match kind {
        ArrKind::Sonarr => now - Duration::hours(EPISODE_AIR_GRACE_HOURS),
        ArrKind::Radarr => now,
    };
    item.release_date.is_some_and(|date| date <= released_before)
}

/// Ordered sweep candidates from a full catalog read.
///
/// `queued` holds item ids already in the back-end download queue.
pub fn select_candidates(
    items: &[MissingItem],
    kind: ArrKind,
    config: &EntrySearchConfig,
    queued: &HashSet<i64>,
    now: DateTime<Utc>,
) -> Vec<SearchCandidate> {
    let mut selected: Vec<&MissingItem> = items
        .iter()
        .filter(|item| wanted(item, kind, config, queued, now))
        .collect();

    if config.search_by_year {
        // Stable, so equal dates keep catalog order.
        selected.sort_by_key(|item| item.release_date);
        if config.search_in_reverse {
            selected.reverse();
        }
    }

    let series = kind.has_parents();
    if series && config.prioritize_todays_releases {
        let today = now.date_naive();
        let (fresh, rest): (Vec<&MissingItem>, Vec<&MissingItem>) = selected
            .into_iter()
            .partition(|item| item.release_date.is_some_and(|d| d.date_naive() == today));
        selected = fresh.into_iter().chain(rest).collect();
    }

    if series && config.search_by_series {
        let mut seen = HashSet::new();
        return selected
            .into_iter()
            .filter(|item| seen.insert(item.parent_id))
            .map(|item| SearchCandidate {
                key: CooldownKey::Parent(item.parent_id),
                target: SearchTarget::Parent(item.parent_id),
                label: item.parent_title.clone(),
                release_date: item.release_date,
                origin: CandidateOrigin::Sweep,
            })
            .collect();
    }

    selected
        .into_iter()
        .map(|item| SearchCandidate {
            key: CooldownKey::Item(item.id),
            target: SearchTarget::Items(vec![item.id]),
            label: item.label(),
            release_date: item.release_date,
            origin: CandidateOrigin::Sweep,
        })
        .collect()
}

fn matches_request(item: &MissingItem, kind: ArrKind, request: &RequestedMedia) -> bool {
    let ids = &item.external_ids;
    let imdb = ids.imdb.is_some() && ids.imdb == request.imdb_id;
    match kind {
        ArrKind::Sonarr => (ids.tvdb.is_some() && ids.tvdb == request.tvdb_id) || imdb,
        ArrKind::Radarr => (ids.tmdb.is_some() && ids.tmdb == request.tmdb_id) || imdb,
    }
}

/// Candidates for requested media, ordered like a sweep.
pub fn request_candidates(
    items: &[MissingItem],
    requested: &[RequestedMedia],
    kind: ArrKind,
    config: &EntrySearchConfig,
    queued: &HashSet<i64>,
    now: DateTime<Utc>,
) -> Vec<SearchCandidate> {
    if requested.is_empty() {
        return Vec::new();
    }
    let matched: Vec<MissingItem> = items
        .iter()
        .filter(|item| requested.iter().any(|r| matches_request(item, kind, r)))
        .cloned()
        .collect();

    select_candidates(&matched, kind, config, queued, now)
        .into_iter()
        .map(|mut candidate| {
            candidate.origin = CandidateOrigin::Request;
            candidate
        })
        .collect()
}
