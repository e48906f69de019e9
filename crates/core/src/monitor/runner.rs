//! Transfer monitor cycle: snapshot, classify, execute.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::classify::{classify, ClassifyContext};
use super::{
    ClassificationDecision, CycleSummary, MonitorAction, MonitorError, TransferRecord, Verdict,
};
use crate::arr::{ArrClient, ArrError, ImportMode, QueueEntry};
use crate::config::{InstanceConfig, Settings, TorrentPolicy};
use crate::filter::{FilterEngine, MediaProbe, ProbeOutcome};
use crate::governor::Governor;
use crate::metrics;
use crate::torrent_client::{TorrentClient, TorrentClientError, TorrentFilters, TorrentInfo};

/// Watches one instance's torrents in the download client.
pub struct TorrentMonitor {
    instance: String,
    category: String,
    settings: Settings,
    policy: TorrentPolicy,
    re_search: bool,
    import_mode: ImportMode,
    client: Arc<dyn TorrentClient>,
    arr: Arc<dyn ArrClient>,
    filter: Arc<FilterEngine>,
    probe: Arc<dyn MediaProbe>,
    governor: Arc<Governor>,
    /// Hashes already handed to the back-end for import.
    imports_sent: Mutex<HashSet<String>>,
}

impl TorrentMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instance: &InstanceConfig,
        settings: &Settings,
        client: Arc<dyn TorrentClient>,
        arr: Arc<dyn ArrClient>,
        filter: Arc<FilterEngine>,
        probe: Arc<dyn MediaProbe>,
        governor: Arc<Governor>,
    ) -> Self {
        Self {
            instance: instance.name.clone(),
            category: instance.category().to_string(),
            settings: settings.clone(),
            policy: instance.torrent.clone(),
            re_search: instance.re_search,
            import_mode: instance.import_mode,
            client,
            arr,
            filter,
            probe,
            governor,
            imports_sent: Mutex::new(HashSet::new()),
        }
    }

    /// Fetch the queue and every torrent this instance is responsible for.
    pub async fn snapshot(
        &self,
    ) -> Result<(Vec<TransferRecord>, HashMap<String, QueueEntry>), MonitorError> {
        let queue: HashMap<String, QueueEntry> = self
            .arr
            .queue()
            .await?
            .into_iter()
            .filter_map(|entry| entry.download_id.clone().map(|id| (id, entry)))
            .collect();

        let mut torrents: Vec<TorrentInfo> = Vec::new();
        let mut seen = HashSet::new();
        for category in [
            self.category.as_str(),
            self.settings.failed_category.as_str(),
            self.settings.recheck_category.as_str(),
        ] {
            let owned_by_category = category == self.category;
            for torrent in self
                .client
                .list_torrents(&TorrentFilters::category(category))
                .await?
            {
                // Shared categories are only handled by the instance that queued the torrent.
                if !owned_by_category && !queue.contains_key(&torrent.hash) {
                    continue;
                }
                if seen.insert(torrent.hash.clone()) {
                    torrents.push(torrent);
                }
            }
        }

        let mut records = Vec::with_capacity(torrents.len());
        for info in torrents {
            let files = match self.client.list_files(&info.hash).await {
                Ok(files) => files,
                Err(TorrentClientError::TorrentNotFound(_)) => continue,
                Err(e) => return Err(e.into()),
            };
            let trackers = if self.policy.needs_trackers() {
                match self.client.list_trackers(&info.hash).await {
                    Ok(trackers) => trackers,
                    Err(TorrentClientError::TorrentNotFound(_)) => continue,
                    Err(e) => return Err(e.into()),
                }
            } else {
                Vec::new()
            };
            records.push(TransferRecord {
                info,
                files,
                trackers,
            });
        }

        Ok((records, queue))
    }

    /// Classify one record, consulting the media probe before an import.
    pub async fn evaluate(
        &self,
        record: &TransferRecord,
        queue: Option<&QueueEntry>,
    ) -> Verdict {
        let ctx = ClassifyContext {
            instance_category: &self.category,
            settings: &self.settings,
            policy: &self.policy,
            filter: &self.filter,
            re_search: self.re_search,
            now: Utc::now(),
        };
        let mut verdict = classify(&ctx, record, queue, &[]);
        if self.import_sent(&record.info.hash) {
            verdict
                .actions
                .retain(|a| !matches!(a, MonitorAction::Import { .. }));
        }

        let wants_import = verdict
            .actions
            .iter()
            .any(|a| matches!(a, MonitorAction::Import { .. }));
        if !wants_import || !self.probe.is_available() {
            return verdict;
        }

        let failures = self.probe_files(record).await;
        if failures.is_empty() {
            verdict
        } else {
            classify(&ctx, record, queue, &failures)
        }
    }

    fn import_sent(&self, hash: &str) -> bool {
        self.imports_sent
            .lock()
            .map(|sent| sent.contains(hash))
            .unwrap_or(false)
    }

    async fn probe_files(&self, record: &TransferRecord) -> Vec<(usize, String)> {
        let Some(save_path) = record.info.save_path.as_deref() else {
            return Vec::new();
        };
        let report = self.filter.evaluate(&record.files);
        let mut failures = Vec::new();

        for decision in report.accepted() {
            let complete = record
                .files
                .iter()
                .any(|f| f.index == decision.index && f.progress >= 1.0);
            if !complete {
                continue;
            }
            let outcome = self.probe.probe(&Path::new(save_path).join(&decision.name)).await;
            metrics::PROBES_TOTAL
                .with_label_values(&[outcome.as_str()])
                .inc();
            if let ProbeOutcome::Invalid(detail) = outcome {
                failures.push((decision.index, detail));
            }
        }
        failures
    }

    /// Run one full monitor cycle.
    pub async fn run_cycle(&self) -> Result<CycleSummary, MonitorError> {
        let (records, queue) = self.snapshot().await?;
        let mut summary = CycleSummary {
            torrents_seen: records.len(),
            ..Default::default()
        };

        for record in &records {
            let hash = record.info.hash.as_str();
            let entry = queue.get(hash);
            let verdict = self.evaluate(record, entry).await;

            self.log_verdict(record, &verdict);
            *summary.decisions.entry(verdict.decision).or_default() += 1;
            metrics::TRANSFER_DECISIONS
                .with_label_values(&[&self.instance, verdict.decision.as_str()])
                .inc();

            for action in &verdict.actions {
                self.governor.pace().await;
                let result = self.execute(record, action).await;
                let label = if result.is_ok() { "ok" } else { "error" };
                metrics::CLIENT_COMMANDS
                    .with_label_values(&[&self.instance, action.as_str(), label])
                    .inc();

                match result {
                    Ok(()) => {
                        summary.actions_ok += 1;
                        if matches!(action, MonitorAction::Import { .. }) {
                            if let Ok(mut sent) = self.imports_sent.lock() {
                                sent.insert(hash.to_string());
                            }
                        }
                    }
                    Err(e) => {
                        summary.actions_failed += 1;
                        warn!(
                            instance = %self.instance,
                            hash = %hash,
                            action = action.as_str(),
                            "Monitor action failed: {}", e
                        );
                    }
                }
            }
        }

        let present: HashSet<&str> = records.iter().map(|r| r.info.hash.as_str()).collect();
        if let Ok(mut sent) = self.imports_sent.lock() {
            sent.retain(|hash| present.contains(hash.as_str()));
        }

        debug!(
            instance = %self.instance,
            torrents = summary.torrents_seen,
            actions_ok = summary.actions_ok,
            actions_failed = summary.actions_failed,
            "Monitor cycle complete"
        );
        Ok(summary)
    }

    async fn execute(
        &self,
        record: &TransferRecord,
        action: &MonitorAction,
    ) -> Result<(), ActionError> {
        let hash = record.info.hash.as_str();
        match action {
            MonitorAction::RemoveTrackers { urls } => {
                self.client.remove_trackers(hash, urls).await?
            }
            MonitorAction::SetDownloadLimit { limit } => {
                self.client.set_download_limit(hash, *limit).await?
            }
            MonitorAction::SetUploadLimit { limit } => {
                self.client.set_upload_limit(hash, *limit).await?
            }
            MonitorAction::SetShareLimits {
                ratio,
                seeding_time_mins,
            } => {
                self.client
                    .set_share_limits(hash, *ratio, *seeding_time_mins)
                    .await?
            }
            MonitorAction::Recheck => self.client.recheck_torrent(hash).await?,
            MonitorAction::Resume => self.client.resume_torrent(hash).await?,
            MonitorAction::SetCategory { category } => {
                self.client.set_category(hash, category).await?
            }
            MonitorAction::SkipFiles { indices } => {
                self.client.set_file_priority(hash, indices, 0).await?
            }
            MonitorAction::RemoveFiles { names } => {
                let Some(save_path) = record.info.save_path.as_deref() else {
                    return Ok(());
                };
                for name in names {
                    match tokio::fs::remove_file(Path::new(save_path).join(name)).await {
                        Ok(()) => {
                            debug!(instance = %self.instance, hash = %hash, file = %name, "Removed rejected file")
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                }
            }
            MonitorAction::Blocklist { queue_id } => {
                self.arr.remove_queue_item(*queue_id, false, true).await?
            }
            MonitorAction::Delete { delete_files } => {
                self.client.remove_torrent(hash, *delete_files).await?
            }
            MonitorAction::Research { target } => {
                let command = self.arr.search(target).await?;
                debug!(instance = %self.instance, hash = %hash, command_id = command.id, "Re-search queued");
            }
            MonitorAction::Import { path } => {
                let command = self
                    .arr
                    .downloaded_scan(path, hash, self.import_mode)
                    .await?;
                debug!(instance = %self.instance, hash = %hash, command_id = command.id, "Import requested");
            }
        }
        Ok(())
    }

    fn log_verdict(&self, record: &TransferRecord, verdict: &Verdict) {
        match verdict.decision {
            ClassificationDecision::Healthy | ClassificationDecision::TooYoungToJudge => debug!(
                instance = %self.instance,
                hash = %record.info.hash,
                name = %record.info.name,
                decision = verdict.decision.as_str(),
                reason = %verdict.reason,
                "Torrent classified"
            ),
            _ => info!(
                instance = %self.instance,
                hash = %record.info.hash,
                name = %record.info.name,
                decision = verdict.decision.as_str(),
                reason = %verdict.reason,
                actions = verdict.actions.len(),
                "Torrent classified"
            ),
        }
    }
}

/// Failure of a single monitor action.
#[derive(Debug, thiserror::Error)]
enum ActionError {
    #[error(transparent)]
    Client(#[from] TorrentClientError),
    #[error(transparent)]
    Arr(#[from] ArrError),
    #[error("file removal failed: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arr::ArrKind;
    use crate::filter::NoProbe;
    use crate::testing::{fixtures, MockArrClient, MockProbe, MockTorrentClient};
    use std::time::Duration;

    struct Harness {
        client: Arc<MockTorrentClient>,
        arr: Arc<MockArrClient>,
        monitor: TorrentMonitor,
    }

    fn harness(instance: InstanceConfig, probe: Arc<dyn MediaProbe>) -> Harness {
        let client = Arc::new(MockTorrentClient::new());
        let arr = Arc::new(MockArrClient::new(instance.kind));
        let filter = Arc::new(FilterEngine::new(&instance.torrent).unwrap());
        let monitor = TorrentMonitor::new(
            &instance,
            &Settings::default(),
            client.clone(),
            arr.clone(),
            filter,
            probe,
            Arc::new(Governor::new(1, Duration::ZERO)),
        );
        Harness {
            client,
            arr,
            monitor,
        }
    }

    #[tokio::test]
    async fn test_foreign_failed_torrents_are_ignored() {
        let h = harness(fixtures::instance("tv", ArrKind::Sonarr), Arc::new(NoProbe));
        let mut info = fixtures::torrent("notours", "failed");
        info.added_at = Some(Utc::now() - chrono::Duration::hours(1));
        h.client.add_torrent(info, vec![]).await;

        let summary = h.monitor.run_cycle().await.unwrap();
        assert_eq!(summary.torrents_seen, 0);
        assert!(h.client.removed().await.is_empty());
    }

    #[tokio::test]
    async fn test_import_is_requested_once() {
        let h = harness(fixtures::instance("tv", ArrKind::Sonarr), Arc::new(NoProbe));
        let mut record = fixtures::transfer("done", "tv");
        record.info.added_at = Some(Utc::now() - chrono::Duration::hours(2));
        fixtures::complete(&mut record, Utc::now() - chrono::Duration::minutes(5));
        h.client.add_record(record).await;
        h.arr.add_queue_entry(fixtures::queue_entry(1, "done", Some(3))).await;

        h.monitor.run_cycle().await.unwrap();
        h.monitor.run_cycle().await.unwrap();
        assert_eq!(h.arr.scans().await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_action_does_not_stop_cycle() {
        let h = harness(fixtures::instance("tv", ArrKind::Sonarr), Arc::new(NoProbe));
        for hash in ["a", "b"] {
            let mut info = fixtures::torrent(hash, "recheck");
            info.added_at = Some(Utc::now());
            h.client.add_torrent(info, vec![]).await;
            h.arr.add_queue_entry(fixtures::queue_entry(1, hash, None)).await;
        }
        h.client
            .set_next_error(TorrentClientError::ApiError("boom".to_string()))
            .await;

        let summary = h.monitor.run_cycle().await.unwrap();
        assert_eq!(summary.count(ClassificationDecision::RecheckRequested), 2);
        assert_eq!(summary.actions_failed, 1);
        assert_eq!(summary.actions_ok, 3);
    }

    #[tokio::test]
    async fn test_probe_rejection_blocks_import() {
        let probe = Arc::new(MockProbe::new());
        probe.set_invalid("Show/Show.S01E01.mkv").await;
        let h = harness(fixtures::instance("tv", ArrKind::Sonarr), probe.clone());

        let mut record = fixtures::transfer("bad", "tv");
        record.info.added_at = Some(Utc::now() - chrono::Duration::hours(2));
        record.files = vec![fixtures::file(0, "Show/Show.S01E01.mkv")];
        fixtures::complete(&mut record, Utc::now() - chrono::Duration::minutes(5));
        h.client.add_record(record).await;
        h.arr.add_queue_entry(fixtures::queue_entry(4, "bad", Some(8))).await;

        let summary = h.monitor.run_cycle().await.unwrap();
        assert_eq!(summary.count(ClassificationDecision::BlocklistCandidate), 1);
        assert!(h.arr.scans().await.is_empty());
        assert_eq!(h.arr.blocklisted().await, vec![4]);
        assert_eq!(probe.probed().await.len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_sidecar_is_skipped_then_imported() {
        let h = harness(fixtures::instance("tv", ArrKind::Sonarr), Arc::new(NoProbe));
        let mut record = fixtures::transfer("scene", "tv");
        record.info.added_at = Some(Utc::now() - chrono::Duration::hours(2));
        record.files = vec![
            fixtures::file(0, "Show/Show.S01E01.mkv"),
            fixtures::file(1, "Show/Show.S01E01.nfo"),
        ];
        fixtures::complete(&mut record, Utc::now() - chrono::Duration::minutes(5));
        h.client.add_record(record).await;
        h.arr.add_queue_entry(fixtures::queue_entry(2, "scene", Some(6))).await;

        let first = h.monitor.run_cycle().await.unwrap();
        assert_eq!(first.count(ClassificationDecision::FilteredOut), 1);
        assert_eq!(h.client.commands_for("scene", "set_file_priority").await, 1);
        assert!(h.arr.scans().await.is_empty());

        let second = h.monitor.run_cycle().await.unwrap();
        assert_eq!(second.count(ClassificationDecision::ImportCandidate), 1);
        h.monitor.run_cycle().await.unwrap();

        assert_eq!(h.arr.scans().await.len(), 1);
        assert!(h.client.removed().await.is_empty());
        assert!(h.arr.blocklisted().await.is_empty());
    }

    #[tokio::test]
    async fn test_auto_delete_removes_rejected_files_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Show")).unwrap();
        std::fs::write(dir.path().join("Show/Show.S01E01.mkv"), b"video").unwrap();
        std::fs::write(dir.path().join("Show/Show.S01E01.nfo"), b"info").unwrap();

        let mut instance = fixtures::instance("tv", ArrKind::Sonarr);
        instance.torrent.auto_delete = true;
        let h = harness(instance, Arc::new(NoProbe));
        let mut record = fixtures::transfer("scene", "tv");
        record.info.added_at = Some(Utc::now() - chrono::Duration::hours(2));
        record.info.save_path = Some(dir.path().to_string_lossy().into_owned());
        record.files = vec![
            fixtures::file(0, "Show/Show.S01E01.mkv"),
            fixtures::file(1, "Show/Show.S01E01.nfo"),
        ];
        fixtures::complete(&mut record, Utc::now() - chrono::Duration::minutes(5));
        h.client.add_record(record).await;

        let summary = h.monitor.run_cycle().await.unwrap();
        assert_eq!(summary.actions_failed, 0);
        assert!(dir.path().join("Show/Show.S01E01.mkv").exists());
        assert!(!dir.path().join("Show/Show.S01E01.nfo").exists());
    }

    #[tokio::test]
    async fn test_sent_import_is_not_probed_again() {
        let probe = Arc::new(MockProbe::new());
        let h = harness(fixtures::instance("tv", ArrKind::Sonarr), probe.clone());

        let mut record = fixtures::transfer("done", "tv");
        record.info.added_at = Some(Utc::now() - chrono::Duration::hours(2));
        fixtures::complete(&mut record, Utc::now() - chrono::Duration::minutes(5));
        h.client.add_record(record).await;
        h.arr.add_queue_entry(fixtures::queue_entry(1, "done", Some(3))).await;

        h.monitor.run_cycle().await.unwrap();
        h.monitor.run_cycle().await.unwrap();
        assert_eq!(h.arr.scans().await.len(), 1);
        assert_eq!(probe.probed().await.len(), 1);
    }
}
