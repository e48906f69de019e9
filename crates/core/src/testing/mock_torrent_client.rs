//! Mock torrent client for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::monitor::TransferRecord;
use crate::torrent_client::{
    TorrentClient, TorrentClientError, TorrentFile, TorrentFilters, TorrentInfo, TorrentState,
    TrackerEntry,
};

/// A recorded mutating call for test assertions.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCommand {
    pub hash: String,
    pub command: &'static str,
}

#[derive(Debug, Clone)]
struct MockTorrent {
    info: TorrentInfo,
    files: Vec<TorrentFile>,
    trackers: Vec<TrackerEntry>,
}

/// Mock implementation of the TorrentClient trait.
///
/// Provides controllable behavior for testing:
/// - Seed torrents with files and trackers
/// - Record every mutating command
/// - Simulate command failures and an unreachable client
///
/// # Example
///
/// ```rust,ignore
/// let client = MockTorrentClient::new();
/// client.add_record(fixtures::transfer("abc", "tv")).await;
///
/// // ... run a monitor cycle ...
///
/// assert_eq!(client.removed().await, vec![("abc".to_string(), true)]);
/// ```
#[derive(Debug)]
pub struct MockTorrentClient {
    torrents: Arc<RwLock<HashMap<String, MockTorrent>>>,
    commands: Arc<RwLock<Vec<RecordedCommand>>>,
    removed: Arc<RwLock<Vec<(String, bool)>>>,
    /// If set, the next mutating command fails with this error.
    next_error: Arc<RwLock<Option<TorrentClientError>>>,
    /// When true, every call fails with `ConnectionFailed`.
    unavailable: Arc<RwLock<bool>>,
}

impl Default for MockTorrentClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTorrentClient {
    /// Create a new mock torrent client.
    pub fn new() -> Self {
        Self {
            torrents: Arc::new(RwLock::new(HashMap::new())),
            commands: Arc::new(RwLock::new(Vec::new())),
            removed: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            unavailable: Arc::new(RwLock::new(false)),
        }
    }

    /// Pre-populate a torrent.
    pub async fn add_torrent(&self, info: TorrentInfo, files: Vec<TorrentFile>) {
        self.torrents.write().await.insert(
            info.hash.clone(),
            MockTorrent {
                info,
                files,
                trackers: Vec::new(),
            },
        );
    }

    /// Pre-populate a torrent from a full snapshot.
    pub async fn add_record(&self, record: TransferRecord) {
        self.torrents.write().await.insert(
            record.info.hash.clone(),
            MockTorrent {
                info: record.info,
                files: record.files,
                trackers: record.trackers,
            },
        );
    }

    /// Replace the info of an existing torrent.
    pub async fn update(&self, hash: &str, apply: impl FnOnce(&mut TorrentInfo)) {
        if let Some(torrent) = self.torrents.write().await.get_mut(hash) {
            apply(&mut torrent.info);
        }
    }

    /// Current info of a torrent.
    pub async fn torrent(&self, hash: &str) -> Option<TorrentInfo> {
        self.torrents.read().await.get(hash).map(|t| t.info.clone())
    }

    /// Check if a torrent exists.
    pub async fn has_torrent(&self, hash: &str) -> bool {
        self.torrents.read().await.contains_key(hash)
    }

    /// Get the number of torrents.
    pub async fn torrent_count(&self) -> usize {
        self.torrents.read().await.len()
    }

    /// All recorded mutating commands, in call order.
    pub async fn commands(&self) -> Vec<RecordedCommand> {
        self.commands.read().await.clone()
    }

    /// Recorded commands of one kind, for one torrent.
    pub async fn commands_for(&self, hash: &str, command: &str) -> usize {
        self.commands
            .read()
            .await
            .iter()
            .filter(|c| c.hash == hash && c.command == command)
            .count()
    }

    /// Removed torrents as `(hash, delete_files)`.
    pub async fn removed(&self) -> Vec<(String, bool)> {
        self.removed.read().await.clone()
    }

    /// Configure the next mutating command to fail with the given error.
    pub async fn set_next_error(&self, error: TorrentClientError) {
        *self.next_error.write().await = Some(error);
    }

    /// Make every call fail as if the client were down.
    pub async fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().await = unavailable;
    }

    async fn check_available(&self) -> Result<(), TorrentClientError> {
        if *self.unavailable.read().await {
            return Err(TorrentClientError::ConnectionFailed(
                "mock client unavailable".to_string(),
            ));
        }
        Ok(())
    }

    /// Record a command and apply it to the torrent.
    async fn command(
        &self,
        hash: &str,
        command: &'static str,
        apply: impl FnOnce(&mut MockTorrent),
    ) -> Result<(), TorrentClientError> {
        self.check_available().await?;
        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }
        self.commands.write().await.push(RecordedCommand {
            hash: hash.to_string(),
            command,
        });

        let mut torrents = self.torrents.write().await;
        match torrents.get_mut(hash) {
            Some(torrent) => {
                apply(torrent);
                Ok(())
            }
            None => Err(TorrentClientError::TorrentNotFound(hash.to_string())),
        }
    }
}

#[async_trait]
impl TorrentClient for MockTorrentClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list_torrents(
        &self,
        filters: &TorrentFilters,
    ) -> Result<Vec<TorrentInfo>, TorrentClientError> {
        self.check_available().await?;

        let torrents = self.torrents.read().await;
        let mut result: Vec<TorrentInfo> = torrents
            .values()
            .filter(|t| match &filters.category {
                Some(category) => t.info.category.as_ref() == Some(category),
                None => true,
            })
            .map(|t| t.info.clone())
            .collect();

        result.sort_by(|a, b| a.hash.cmp(&b.hash));
        Ok(result)
    }

    async fn list_files(&self, hash: &str) -> Result<Vec<TorrentFile>, TorrentClientError> {
        self.check_available().await?;
        self.torrents
            .read()
            .await
            .get(hash)
            .map(|t| t.files.clone())
            .ok_or_else(|| TorrentClientError::TorrentNotFound(hash.to_string()))
    }

    async fn list_trackers(&self, hash: &str) -> Result<Vec<TrackerEntry>, TorrentClientError> {
        self.check_available().await?;
        self.torrents
            .read()
            .await
            .get(hash)
            .map(|t| t.trackers.clone())
            .ok_or_else(|| TorrentClientError::TorrentNotFound(hash.to_string()))
    }

    async fn remove_torrent(
        &self,
        hash: &str,
        delete_files: bool,
    ) -> Result<(), TorrentClientError> {
        self.command(hash, "remove", |_| {}).await?;
        self.torrents.write().await.remove(hash);
        self.removed
            .write()
            .await
            .push((hash.to_string(), delete_files));
        Ok(())
    }

    async fn resume_torrent(&self, hash: &str) -> Result<(), TorrentClientError> {
        self.command(hash, "resume", |t| {
            if t.info.progress < 1.0 {
                t.info.state = TorrentState::Downloading;
            }
        })
        .await
    }

    async fn recheck_torrent(&self, hash: &str) -> Result<(), TorrentClientError> {
        self.command(hash, "recheck", |t| t.info.state = TorrentState::Checking)
            .await
    }

    async fn set_category(&self, hash: &str, category: &str) -> Result<(), TorrentClientError> {
        let category = category.to_string();
        self.command(hash, "set_category", |t| t.info.category = Some(category))
            .await
    }

    async fn remove_trackers(
        &self,
        hash: &str,
        urls: &[String],
    ) -> Result<(), TorrentClientError> {
        self.command(hash, "remove_trackers", |t| {
            t.trackers.retain(|tracker| !urls.contains(&tracker.url))
        })
        .await
    }

    async fn set_file_priority(
        &self,
        hash: &str,
        file_indices: &[usize],
        priority: u8,
    ) -> Result<(), TorrentClientError> {
        self.command(hash, "set_file_priority", |t| {
            for file in t.files.iter_mut() {
                if file_indices.contains(&file.index) {
                    file.priority = priority;
                }
            }
        })
        .await
    }

    async fn set_upload_limit(&self, hash: &str, limit: u64) -> Result<(), TorrentClientError> {
        self.command(hash, "set_upload_limit", |t| t.info.upload_limit = limit)
            .await
    }

    async fn set_download_limit(&self, hash: &str, limit: u64) -> Result<(), TorrentClientError> {
        self.command(hash, "set_download_limit", |t| t.info.download_limit = limit)
            .await
    }

    async fn set_share_limits(
        &self,
        hash: &str,
        ratio: f64,
        seeding_time_mins: i64,
    ) -> Result<(), TorrentClientError> {
        self.command(hash, "set_share_limits", |t| {
            t.info.ratio_limit = ratio;
            t.info.seeding_time_limit_mins = seeding_time_mins;
        })
        .await
    }
}
