//! Types for torrent client operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during torrent client operations.
#[derive(Debug, Error)]
pub enum TorrentClientError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Torrent not found: {0}")]
    TorrentNotFound(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// State of a torrent as reported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorrentState {
    /// Downloading from peers.
    Downloading,
    /// Fetching metadata (magnet without info dict yet).
    FetchingMetadata,
    /// Download started but no data is flowing.
    StalledDownload,
    /// Download is paused or stopped.
    PausedDownload,
    /// Queued for download.
    QueuedDownload,
    /// Seeding to peers.
    Seeding,
    /// Complete, seeding but no peers are connected.
    StalledUpload,
    /// Complete and paused or stopped.
    PausedUpload,
    /// Complete and queued for seeding.
    QueuedUpload,
    /// Checking file integrity.
    Checking,
    /// Moving data to a new location.
    Moving,
    /// Data files are missing on disk.
    MissingFiles,
    /// Error state.
    Error,
    /// Unknown state.
    Unknown,
}

impl TorrentState {
    /// Returns the string representation for logs and API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            TorrentState::Downloading => "downloading",
            TorrentState::FetchingMetadata => "fetching_metadata",
            TorrentState::StalledDownload => "stalled_download",
            TorrentState::PausedDownload => "paused_download",
            TorrentState::QueuedDownload => "queued_download",
            TorrentState::Seeding => "seeding",
            TorrentState::StalledUpload => "stalled_upload",
            TorrentState::PausedUpload => "paused_upload",
            TorrentState::QueuedUpload => "queued_upload",
            TorrentState::Checking => "checking",
            TorrentState::Moving => "moving",
            TorrentState::MissingFiles => "missing_files",
            TorrentState::Error => "error",
            TorrentState::Unknown => "unknown",
        }
    }

    /// The client itself flags the download as making no progress.
    pub fn is_stalled(&self) -> bool {
        matches!(
            self,
            TorrentState::StalledDownload | TorrentState::FetchingMetadata
        )
    }

    /// The download phase is finished (seeding side of the state machine).
    pub fn is_upload_side(&self) -> bool {
        matches!(
            self,
            TorrentState::Seeding
                | TorrentState::StalledUpload
                | TorrentState::PausedUpload
                | TorrentState::QueuedUpload
        )
    }

    /// States where the client is busy and nothing should be judged.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TorrentState::Checking | TorrentState::Moving | TorrentState::QueuedDownload
        )
    }
}

impl std::fmt::Display for TorrentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Information about a torrent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentInfo {
    /// Info hash (lowercase hex).
    pub hash: String,
    /// Torrent name.
    pub name: String,
    /// Current state.
    pub state: TorrentState,
    /// Download progress (0.0 - 1.0).
    pub progress: f64,
    /// Total size in bytes.
    pub size_bytes: u64,
    /// Current download speed in bytes/second.
    pub download_speed: u64,
    /// Current upload speed in bytes/second.
    pub upload_speed: u64,
    /// Ratio (uploaded/downloaded).
    pub ratio: f64,
    /// Time spent seeding in seconds.
    pub seeding_time_secs: u64,
    /// ETA in seconds (None if complete). An infinite ETA is `u64::MAX`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_secs: Option<u64>,
    /// When the torrent was added.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
    /// When the torrent completed downloading.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Last time data was sent or received.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity_at: Option<DateTime<Utc>>,
    /// Save path on disk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_path: Option<String>,
    /// Content root (single file or top-level folder).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_path: Option<String>,
    /// Category/label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Currently working tracker URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracker: Option<String>,
    /// Upload speed limit in bytes/second (0 = unlimited).
    pub upload_limit: u64,
    /// Download speed limit in bytes/second (0 = unlimited).
    pub download_limit: u64,
    /// Per-torrent ratio limit (negative = none or global).
    pub ratio_limit: f64,
    /// Per-torrent seeding time limit in minutes (negative = none or global).
    pub seeding_time_limit_mins: i64,
}

impl TorrentInfo {
    /// Fully downloaded.
    pub fn is_complete(&self) -> bool {
        self.progress >= 1.0
    }
}

/// One file inside a torrent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentFile {
    /// Index used by the client's file priority API.
    pub index: usize,
    /// Path relative to the save path.
    pub name: String,
    pub size_bytes: u64,
    /// Download progress of this file (0.0 - 1.0).
    pub progress: f64,
    /// Download priority (0 = do not download).
    pub priority: u8,
}

impl TorrentFile {
    /// Whether the client is still supposed to download this file.
    pub fn is_wanted(&self) -> bool {
        self.priority > 0
    }
}

/// Announce status of a tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerStatus {
    /// DHT/PeX/LSD pseudo entries, or a disabled tracker.
    Disabled,
    NotContacted,
    Working,
    Updating,
    NotWorking,
}

/// One tracker attached to a torrent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerEntry {
    pub url: String,
    pub status: TrackerStatus,
    /// Latest announce message.
    pub message: String,
}

impl TrackerEntry {
    /// Real trackers have a URL; pseudo entries are `** [DHT] **` and friends.
    pub fn is_announce_url(&self) -> bool {
        self.url.contains("://")
    }
}

/// Filters for listing torrents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TorrentFilters {
    /// Filter by category.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl TorrentFilters {
    /// Filter to a single category.
    pub fn category(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
        }
    }

    /// Check if any filters are set.
    pub fn is_empty(&self) -> bool {
        self.category.is_none()
    }
}

/// Trait for torrent client backends.
#[async_trait]
pub trait TorrentClient: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// List all torrents, optionally filtered.
    async fn list_torrents(
        &self,
        filters: &TorrentFilters,
    ) -> Result<Vec<TorrentInfo>, TorrentClientError>;

    /// List the files of a torrent.
    async fn list_files(&self, hash: &str) -> Result<Vec<TorrentFile>, TorrentClientError>;

    /// List the trackers of a torrent.
    async fn list_trackers(&self, hash: &str) -> Result<Vec<TrackerEntry>, TorrentClientError>;

    /// Remove a torrent.
    /// If `delete_files` is true, also delete downloaded files.
    async fn remove_torrent(
        &self,
        hash: &str,
        delete_files: bool,
    ) -> Result<(), TorrentClientError>;

    /// Resume a paused torrent.
    async fn resume_torrent(&self, hash: &str) -> Result<(), TorrentClientError>;

    /// Recheck/verify torrent files.
    async fn recheck_torrent(&self, hash: &str) -> Result<(), TorrentClientError>;

    /// Move a torrent to another category.
    async fn set_category(&self, hash: &str, category: &str) -> Result<(), TorrentClientError>;

    /// Remove trackers from a torrent.
    async fn remove_trackers(&self, hash: &str, urls: &[String])
        -> Result<(), TorrentClientError>;

    /// Set the download priority of files (0 = do not download).
    async fn set_file_priority(
        &self,
        hash: &str,
        file_indices: &[usize],
        priority: u8,
    ) -> Result<(), TorrentClientError>;

    /// Set upload speed limit for a torrent (bytes/second, 0 = unlimited).
    async fn set_upload_limit(&self, hash: &str, limit: u64) -> Result<(), TorrentClientError>;

    /// Set download speed limit for a torrent (bytes/second, 0 = unlimited).
    async fn set_download_limit(&self, hash: &str, limit: u64) -> Result<(), TorrentClientError>;

    /// Set per-torrent share limits (ratio, seeding minutes; -1 = no limit).
    async fn set_share_limits(
        &self,
        hash: &str,
        ratio: f64,
        seeding_time_mins: i64,
    ) -> Result<(), TorrentClientError>;
}
