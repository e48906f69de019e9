//! Test fixtures and helper functions.

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::arr::{ArrKind, ImportMode, QueueEntry};
use crate::catalog::{ExternalIds, MissingItem};
use crate::config::{EntrySearchConfig, InstanceConfig, TorrentPolicy};
use crate::monitor::TransferRecord;
use crate::torrent_client::{TorrentFile, TorrentInfo, TorrentState};

/// Fixed "current time" for deterministic classification tests.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
}

/// An instance with default policy and no call spacing.
pub fn instance(name: &str, kind: ArrKind) -> InstanceConfig {
    InstanceConfig {
        name: name.to_string(),
        kind,
        managed: true,
        uri: "http://localhost:8989".to_string(),
        api_key: "test-key".to_string(),
        category: None,
        re_search: false,
        import_mode: ImportMode::Move,
        refresh_downloads_timer_mins: 0,
        rss_sync_timer_mins: 0,
        api_call_spacing_ms: 0,
        timeout_secs: 5,
        torrent: TorrentPolicy::default(),
        search: EntrySearchConfig::default(),
    }
}

/// A downloading torrent, added two hours ago, with limits matching the
/// default policy.
pub fn torrent(hash: &str, category: &str) -> TorrentInfo {
    let name = format!("Show.S01E01.{}", hash);
    TorrentInfo {
        hash: hash.to_string(),
        content_path: Some(format!("/downloads/{}", name)),
        name,
        state: TorrentState::Downloading,
        progress: 0.5,
        size_bytes: 1024 * 1024 * 1024,
        download_speed: 1024 * 1024,
        upload_speed: 0,
        ratio: 0.0,
        seeding_time_secs: 0,
        eta_secs: None,
        added_at: Some(now() - Duration::hours(2)),
        completed_at: None,
        last_activity_at: Some(now()),
        save_path: Some("/downloads".to_string()),
        category: Some(category.to_string()),
        tracker: None,
        upload_limit: 0,
        download_limit: 0,
        ratio_limit: -1.0,
        seeding_time_limit_mins: -1,
    }
}

/// A torrent snapshot with one accepted video file.
pub fn transfer(hash: &str, category: &str) -> TransferRecord {
    let info = torrent(hash, category);
    let files = vec![file(0, &format!("{}/{}.mkv", info.name, info.name))];
    TransferRecord {
        info,
        files,
        trackers: Vec::new(),
    }
}

/// A fully downloaded, wanted file.
pub fn file(index: usize, name: &str) -> TorrentFile {
    TorrentFile {
        index,
        name: name.to_string(),
        size_bytes: 700 * 1024 * 1024,
        progress: 1.0,
        priority: 1,
    }
}

/// Mark a snapshot as completed at `completed_at` and seeding.
pub fn complete(record: &mut TransferRecord, completed_at: DateTime<Utc>) {
    record.info.progress = 1.0;
    record.info.state = TorrentState::StalledUpload;
    record.info.eta_secs = None;
    record.info.completed_at = Some(completed_at);
    if record.info.content_path.is_none() {
        record.info.content_path = Some(format!("/downloads/{}", record.info.name));
    }
    for file in record.files.iter_mut() {
        file.progress = 1.0;
    }
}

/// A queue record linking `hash` to an episode (or nothing).
pub fn queue_entry(id: i64, hash: &str, episode_id: Option<i64>) -> QueueEntry {
    QueueEntry {
        id,
        download_id: Some(hash.to_string()),
        title: Some(format!("Queued {}", hash)),
        episode_id,
        series_id: episode_id.map(|_| 1),
        movie_id: None,
        tracked_download_state: Some("downloading".to_string()),
    }
}

/// A monitored, missing episode of series `series_id`.
pub fn episode(id: i64, series_id: i64, aired: DateTime<Utc>) -> MissingItem {
    MissingItem {
        id,
        parent_id: series_id,
        title: format!("Episode {}", id),
        parent_title: format!("Series {}", series_id),
        season: Some(1),
        episode: Some(id as i32),
        release_date: Some(aired),
        monitored: true,
        parent_monitored: true,
        has_file: false,
        quality_cutoff_met: false,
        external_ids: ExternalIds::default(),
    }
}

/// A monitored, missing movie.
pub fn movie(id: i64, released: DateTime<Utc>) -> MissingItem {
    MissingItem {
        id,
        parent_id: id,
        title: format!("Movie {}", id),
        parent_title: format!("Movie {}", id),
        season: None,
        episode: None,
        release_date: Some(released),
        monitored: true,
        parent_monitored: true,
        has_file: false,
        quality_cutoff_met: false,
        external_ids: ExternalIds::default(),
    }
}
