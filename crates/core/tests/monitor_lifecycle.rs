//! Transfer monitor integration tests.
//!
//! These drive full monitor cycles against the mock download client and
//! back-end and check which commands reach them.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use arrwarden_core::arr::{ArrKind, QueueEntry, SearchTarget};
use arrwarden_core::config::{InstanceConfig, RemoveTorrentPolicy, Settings};
use arrwarden_core::filter::{FilterEngine, MediaProbe};
use arrwarden_core::governor::Governor;
use arrwarden_core::monitor::{ClassificationDecision, TorrentMonitor};
use arrwarden_core::testing::{fixtures, MockArrClient, MockProbe, MockTorrentClient};

struct Harness {
    client: Arc<MockTorrentClient>,
    arr: Arc<MockArrClient>,
    probe: Arc<MockProbe>,
    monitor: TorrentMonitor,
}

impl Harness {
    fn new(instance: InstanceConfig) -> Self {
        let client = Arc::new(MockTorrentClient::new());
        let arr = Arc::new(MockArrClient::new(instance.kind));
        let probe = Arc::new(MockProbe::new());
        let filter = Arc::new(FilterEngine::new(&instance.torrent).expect("valid filter"));
        let monitor = TorrentMonitor::new(
            &instance,
            &Settings::default(),
            client.clone(),
            arr.clone(),
            filter,
            probe.clone() as Arc<dyn MediaProbe>,
            Arc::new(Governor::new(1, Duration::ZERO)),
        );
        Self {
            client,
            arr,
            probe,
            monitor,
        }
    }
}

fn seconds_ago(secs: i64) -> chrono::DateTime<Utc> {
    Utc::now() - chrono::Duration::seconds(secs)
}

#[tokio::test]
async fn test_failed_category_is_blocklisted_deleted_and_searched_once() {
    let mut instance = fixtures::instance("tv", ArrKind::Sonarr);
    instance.re_search = true;
    let h = Harness::new(instance);

    let mut record = fixtures::transfer("failedhash", "failed");
    record.info.added_at = Some(seconds_ago(600));
    h.client.add_record(record).await;
    h.arr
        .add_queue_entry(fixtures::queue_entry(11, "failedhash", Some(42)))
        .await;

    let summary = h.monitor.run_cycle().await.unwrap();
    assert_eq!(summary.count(ClassificationDecision::BlocklistCandidate), 1);
    assert_eq!(h.arr.blocklisted().await, vec![11]);
    assert_eq!(h.client.removed().await, vec![("failedhash".to_string(), true)]);
    assert_eq!(h.arr.searches().await, vec![SearchTarget::Items(vec![42])]);

    // The torrent and its queue record are gone; nothing repeats.
    let summary = h.monitor.run_cycle().await.unwrap();
    assert_eq!(summary.torrents_seen, 0);
    assert_eq!(h.arr.blocklisted().await.len(), 1);
    assert_eq!(h.client.removed().await.len(), 1);
    assert_eq!(h.arr.searches().await.len(), 1);
}

#[tokio::test]
async fn test_young_torrents_are_never_removed() {
    let mut instance = fixtures::instance("tv", ArrKind::Sonarr);
    instance.re_search = true;
    let h = Harness::new(instance);

    let mut failed = fixtures::transfer("young-failed", "failed");
    failed.info.added_at = Some(seconds_ago(120));
    h.client.add_record(failed).await;
    h.arr
        .add_queue_entry(fixtures::queue_entry(1, "young-failed", Some(1)))
        .await;

    let mut slow = fixtures::transfer("young-slow", "tv");
    slow.info.added_at = Some(seconds_ago(120));
    slow.info.eta_secs = Some(10 * 86_400);
    h.client.add_record(slow).await;

    let mut undated = fixtures::transfer("undated", "tv");
    undated.info.added_at = None;
    undated.info.eta_secs = Some(10 * 86_400);
    h.client.add_record(undated).await;

    let summary = h.monitor.run_cycle().await.unwrap();
    assert_eq!(summary.torrents_seen, 3);
    assert_eq!(summary.count(ClassificationDecision::TooYoungToJudge), 3);
    assert!(h.client.removed().await.is_empty());
    assert!(h.arr.blocklisted().await.is_empty());
    assert!(h.arr.searches().await.is_empty());
}

#[tokio::test]
async fn test_ratio_limit_deletes_without_blocklist() {
    let mut instance = fixtures::instance("tv", ArrKind::Sonarr);
    instance.torrent.seeding.max_upload_ratio = 2.0;
    instance.torrent.seeding.remove_torrent = RemoveTorrentPolicy::Ratio;
    let h = Harness::new(instance);

    let mut record = fixtures::transfer("seeded", "tv");
    record.info.added_at = Some(seconds_ago(3 * 86_400));
    fixtures::complete(&mut record, seconds_ago(2 * 86_400));
    record.info.ratio = 2.5;
    record.info.ratio_limit = 2.0;
    h.client.add_record(record).await;

    let summary = h.monitor.run_cycle().await.unwrap();
    assert_eq!(summary.count(ClassificationDecision::SeedingLimitReached), 1);
    assert_eq!(h.client.removed().await, vec![("seeded".to_string(), true)]);
    assert!(h.arr.blocklisted().await.is_empty());
}

#[tokio::test]
async fn test_missing_probe_accepts_movie_without_probing() {
    let mut instance = fixtures::instance("movies", ArrKind::Radarr);
    instance.torrent.auto_delete = true;
    let h = Harness::new(instance);
    h.probe.set_available(false);

    let mut record = fixtures::transfer("film", "movies");
    record.info.name = "Movie".to_string();
    record.info.content_path = Some("/downloads/Movie".to_string());
    record.info.added_at = Some(seconds_ago(3_600));
    record.files = vec![fixtures::file(0, "Movie/movie.mkv")];
    fixtures::complete(&mut record, seconds_ago(300));
    h.client.add_record(record).await;
    h.arr
        .add_queue_entry(QueueEntry {
            id: 5,
            download_id: Some("film".to_string()),
            title: Some("Movie".to_string()),
            episode_id: None,
            series_id: None,
            movie_id: Some(77),
            tracked_download_state: Some("importPending".to_string()),
        })
        .await;

    let summary = h.monitor.run_cycle().await.unwrap();
    assert_eq!(summary.count(ClassificationDecision::ImportCandidate), 1);
    assert!(h.probe.probed().await.is_empty());
    assert_eq!(h.client.commands_for("film", "set_file_priority").await, 0);

    let scans = h.arr.scans().await;
    assert_eq!(scans.len(), 1);
    assert_eq!(scans[0].path, "/downloads/Movie");
    assert_eq!(scans[0].download_id, "film");
}

#[tokio::test]
async fn test_slow_download_gets_one_removal_pair_per_cycle() {
    let h = Harness::new(fixtures::instance("tv", ArrKind::Sonarr));

    let mut record = fixtures::transfer("slow", "tv");
    record.info.added_at = Some(seconds_ago(7_200));
    record.info.progress = 0.3;
    record.info.eta_secs = Some(200_000);
    h.client.add_record(record).await;
    h.arr
        .add_queue_entry(fixtures::queue_entry(9, "slow", Some(3)))
        .await;

    let summary = h.monitor.run_cycle().await.unwrap();
    assert_eq!(summary.count(ClassificationDecision::BlocklistCandidate), 1);
    assert_eq!(h.arr.blocklisted().await, vec![9]);
    assert_eq!(h.client.commands_for("slow", "remove").await, 1);
    // re_search is off.
    assert!(h.arr.searches().await.is_empty());

    h.monitor.run_cycle().await.unwrap();
    assert_eq!(h.arr.blocklisted().await, vec![9]);
    assert_eq!(h.client.commands_for("slow", "remove").await, 1);
}

#[tokio::test]
async fn test_almost_complete_slow_download_is_kept() {
    let h = Harness::new(fixtures::instance("tv", ArrKind::Sonarr));

    let mut record = fixtures::transfer("nearly", "tv");
    record.info.added_at = Some(seconds_ago(7_200));
    record.info.progress = 0.97;
    record.info.eta_secs = Some(200_000);
    h.client.add_record(record).await;

    let summary = h.monitor.run_cycle().await.unwrap();
    assert_eq!(summary.count(ClassificationDecision::Healthy), 1);
    assert!(h.client.removed().await.is_empty());
}

#[tokio::test]
async fn test_unchanged_snapshot_classifies_identically() {
    let h = Harness::new(fixtures::instance("tv", ArrKind::Sonarr));

    let mut downloading = fixtures::transfer("dl", "tv");
    downloading.info.added_at = Some(seconds_ago(7_200));
    h.client.add_record(downloading).await;

    let mut filtered = fixtures::transfer("mixed", "tv");
    filtered.info.added_at = Some(seconds_ago(7_200));
    filtered.files.push(fixtures::file(1, "Show/sample.exe"));
    h.client.add_record(filtered).await;

    let (records, queue) = h.monitor.snapshot().await.unwrap();
    assert_eq!(records.len(), 2);

    for record in &records {
        let entry = queue.get(&record.info.hash);
        let first = h.monitor.evaluate(record, entry).await;
        let second = h.monitor.evaluate(record, entry).await;
        assert_eq!(first, second);
    }
}
