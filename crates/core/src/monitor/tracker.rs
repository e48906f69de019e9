//! Tracker policy resolution and tracker maintenance.

use reqwest::Url;

use super::TransferRecord;
use crate::config::{TorrentPolicy, TrackerPolicy};

/// Instance defaults with the best matching tracker policy merged over them.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectivePolicy {
    /// Seconds; <= 0 disables the ETA ceiling.
    pub maximum_eta: i64,
    /// Bytes/second; negative leaves the client value alone.
    pub download_rate_limit: i64,
    pub upload_rate_limit: i64,
    /// Negative = unbounded.
    pub max_upload_ratio: f64,
    /// Seconds; negative = unbounded.
    pub max_seeding_time: i64,
    pub remove_tracker_with_message: Vec<String>,
    /// Name (or host) of the tracker policy that was applied.
    pub matched_tracker: Option<String>,
}

impl EffectivePolicy {
    pub fn defaults(policy: &TorrentPolicy) -> Self {
        Self {
            maximum_eta: policy.maximum_eta,
            download_rate_limit: policy.seeding.download_rate_limit_per_torrent,
            upload_rate_limit: policy.seeding.upload_rate_limit_per_torrent,
            max_upload_ratio: policy.seeding.max_upload_ratio,
            max_seeding_time: policy.seeding.max_seeding_time,
            remove_tracker_with_message: policy.seeding.remove_tracker_with_message.clone(),
            matched_tracker: None,
        }
    }

    /// Merge the highest-priority tracker policy matching any of `hosts`.
    pub fn resolve(policy: &TorrentPolicy, hosts: &[String]) -> Self {
        let mut effective = Self::defaults(policy);
        let best = policy
            .trackers
            .iter()
            .filter(|t| hosts.iter().any(|h| host_matches(h, &t.uri)))
            .max_by_key(|t| t.priority);

        if let Some(tracker) = best {
            effective.merge(tracker);
        }
        effective
    }

    fn merge(&mut self, tracker: &TrackerPolicy) {
        if let Some(eta) = tracker.maximum_eta {
            self.maximum_eta = eta;
        }
        if let Some(limit) = tracker.download_rate_limit {
            self.download_rate_limit = limit;
        }
        if let Some(limit) = tracker.upload_rate_limit {
            self.upload_rate_limit = limit;
        }
        if let Some(ratio) = tracker.max_upload_ratio {
            self.max_upload_ratio = ratio;
        }
        if let Some(seconds) = tracker.max_seeding_time {
            self.max_seeding_time = seconds;
        }
        if let Some(messages) = &tracker.remove_tracker_with_message {
            self.remove_tracker_with_message = messages.clone();
        }
        self.matched_tracker = Some(
            tracker
                .name
                .clone()
                .or_else(|| tracker_host(&tracker.uri))
                .unwrap_or_else(|| tracker.uri.clone()),
        );
    }
}

/// Lowercase host of a tracker URL, or of a bare hostname.
pub fn tracker_host(uri: &str) -> Option<String> {
    let uri = uri.trim();
    if uri.is_empty() {
        return None;
    }
    if uri.contains("://") {
        Url::parse(uri)
            .ok()
            .and_then(|url| url.host_str().map(|h| h.to_ascii_lowercase()))
    } else {
        let host = uri.split(['/', ':']).next().unwrap_or(uri);
        Some(host.to_ascii_lowercase())
    }
}

/// Tracker hosts of a torrent: every announce URL plus the working tracker.
pub fn record_hosts(record: &TransferRecord) -> Vec<String> {
    let mut hosts: Vec<String> = record
        .trackers
        .iter()
        .filter(|t| t.is_announce_url())
        .filter_map(|t| tracker_host(&t.url))
        .collect();
    if let Some(host) = record.info.tracker.as_deref().and_then(tracker_host) {
        hosts.push(host);
    }
    hosts.sort();
    hosts.dedup();
    hosts
}

/// A host matches a policy URI with the same host or a parent domain of it.
fn host_matches(host: &str, policy_uri: &str) -> bool {
    match tracker_host(policy_uri) {
        Some(policy_host) => {
            host == policy_host || host.ends_with(&format!(".{}", policy_host))
        }
        None => false,
    }
}

/// Tracker URLs to strip from a torrent.
///
/// A tracker goes when its latest message contains a dead-tracker message
/// (if `remove_dead_trackers` is on) or when a `remove_if_exists` policy
/// matches its host.
pub fn trackers_to_remove(
    record: &TransferRecord,
    policy: &TorrentPolicy,
    effective: &EffectivePolicy,
) -> Vec<String> {
    let dead_messages: Vec<String> = effective
        .remove_tracker_with_message
        .iter()
        .map(|m| m.to_lowercase())
        .filter(|m| !m.is_empty())
        .collect();

    record
        .trackers
        .iter()
        .filter(|t| t.is_announce_url())
        .filter(|t| {
            let message = t.message.to_lowercase();
            let dead = policy.seeding.remove_dead_trackers
                && !message.is_empty()
                && dead_messages.iter().any(|m| message.contains(m.as_str()));

            let unwanted = tracker_host(&t.url).is_some_and(|host| {
                policy
                    .trackers
                    .iter()
                    .any(|p| p.remove_if_exists && host_matches(&host, &p.uri))
            });

            dead || unwanted
        })
        .map(|t| t.url.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;
    use crate::torrent_client::{TrackerEntry, TrackerStatus};

    fn tracker(url: &str, message: &str) -> TrackerEntry {
        TrackerEntry {
            url: url.to_string(),
            status: TrackerStatus::Working,
            message: message.to_string(),
        }
    }

    fn policy_with_trackers(trackers: Vec<TrackerPolicy>) -> TorrentPolicy {
        TorrentPolicy {
            trackers,
            ..Default::default()
        }
    }

    #[test]
    fn test_tracker_host() {
        assert_eq!(
            tracker_host("udp://Tracker.Example.org:1337/announce").as_deref(),
            Some("tracker.example.org")
        );
        assert_eq!(
            tracker_host("tracker.example.org").as_deref(),
            Some("tracker.example.org")
        );
        assert_eq!(tracker_host("   "), None);
    }

    #[test]
    fn test_highest_priority_match_wins() {
        let policy = policy_with_trackers(vec![
            TrackerPolicy {
                name: Some("low".to_string()),
                uri: "https://a.example.org/announce".to_string(),
                priority: 1,
                maximum_eta: Some(100),
                ..Default::default()
            },
            TrackerPolicy {
                name: Some("high".to_string()),
                uri: "b.example.org".to_string(),
                priority: 5,
                maximum_eta: Some(500),
                max_upload_ratio: Some(3.0),
                ..Default::default()
            },
            TrackerPolicy {
                name: Some("unmatched".to_string()),
                uri: "c.example.org".to_string(),
                priority: 10,
                maximum_eta: Some(900),
                ..Default::default()
            },
        ]);
        let hosts = vec!["a.example.org".to_string(), "b.example.org".to_string()];
        let effective = EffectivePolicy::resolve(&policy, &hosts);

        assert_eq!(effective.maximum_eta, 500);
        assert_eq!(effective.max_upload_ratio, 3.0);
        // Unset overrides keep the instance defaults.
        assert_eq!(effective.max_seeding_time, -1);
        assert_eq!(effective.matched_tracker.as_deref(), Some("high"));
    }

    #[test]
    fn test_no_match_keeps_defaults() {
        let policy = policy_with_trackers(vec![TrackerPolicy {
            uri: "private.example.org".to_string(),
            maximum_eta: Some(1),
            ..Default::default()
        }]);
        let effective = EffectivePolicy::resolve(&policy, &["public.example.net".to_string()]);
        assert_eq!(effective, EffectivePolicy::defaults(&policy));
    }

    #[test]
    fn test_subdomain_matches_policy_host() {
        assert!(host_matches("announce.example.org", "example.org"));
        assert!(!host_matches("badexample.org", "example.org"));
    }

    #[test]
    fn test_dead_trackers_removed_by_message() {
        let mut policy = TorrentPolicy::default();
        policy.seeding.remove_dead_trackers = true;

        let mut record = fixtures::transfer("abc", "tv");
        record.trackers = vec![
            tracker("** [DHT] **", "skipping tracker announce (unreachable)"),
            tracker("udp://dead.example.org:80/announce", "Skipping Tracker Announce (unreachable)"),
            tracker("udp://ok.example.org:80/announce", ""),
        ];
        let effective = EffectivePolicy::resolve(&policy, &record_hosts(&record));
        assert_eq!(
            trackers_to_remove(&record, &policy, &effective),
            vec!["udp://dead.example.org:80/announce".to_string()]
        );

        policy.seeding.remove_dead_trackers = false;
        assert!(trackers_to_remove(&record, &policy, &effective).is_empty());
    }

    #[test]
    fn test_remove_if_exists() {
        let policy = policy_with_trackers(vec![TrackerPolicy {
            uri: "unwanted.example.org".to_string(),
            remove_if_exists: true,
            ..Default::default()
        }]);
        let mut record = fixtures::transfer("abc", "tv");
        record.trackers = vec![
            tracker("https://unwanted.example.org/announce", ""),
            tracker("https://kept.example.org/announce", ""),
        ];
        let effective = EffectivePolicy::defaults(&policy);
        assert_eq!(
            trackers_to_remove(&record, &policy, &effective),
            vec!["https://unwanted.example.org/announce".to_string()]
        );
    }
}
