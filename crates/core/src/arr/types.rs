//! Types for the media-management back-end API (Sonarr/Radarr v3).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when talking to a back-end.
#[derive(Debug, Error)]
pub enum ArrError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Back-end rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ArrError {
    /// Whether the back-end could not be reached at all.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, ArrError::ConnectionFailed(_) | ArrError::Timeout)
    }
}

/// Kind of back-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrKind {
    Sonarr,
    Radarr,
}

impl ArrKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArrKind::Sonarr => "sonarr",
            ArrKind::Radarr => "radarr",
        }
    }

    /// Command that imports a completed download.
    pub fn downloaded_scan_command(&self) -> &'static str {
        match self {
            ArrKind::Sonarr => "DownloadedEpisodesScan",
            ArrKind::Radarr => "DownloadedMoviesScan",
        }
    }

    /// Whether items are grouped under a parent (series).
    pub fn has_parents(&self) -> bool {
        matches!(self, ArrKind::Sonarr)
    }
}

impl std::fmt::Display for ArrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the back-end imports a completed download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImportMode {
    /// Let the back-end decide (hardlink/copy).
    Auto,
    #[default]
    Move,
    Copy,
}

impl ImportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportMode::Auto => "Auto",
            ImportMode::Move => "Move",
            ImportMode::Copy => "Copy",
        }
    }
}

/// What a search command targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchTarget {
    /// Individual episodes or movies.
    Items(Vec<i64>),
    /// A whole series (Sonarr) or a single movie (Radarr).
    Parent(i64),
}

/// One record of the back-end's download queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Queue record id (used for removal/blacklisting).
    pub id: i64,
    /// Download client id (torrent hash), lowercase.
    pub download_id: Option<String>,
    pub title: Option<String>,
    pub episode_id: Option<i64>,
    pub series_id: Option<i64>,
    pub movie_id: Option<i64>,
    /// e.g. "downloading", "importPending", "importing", "imported", "failedPending".
    pub tracked_download_state: Option<String>,
}

impl QueueEntry {
    /// The back-end still expects to import this download.
    pub fn awaits_import(&self) -> bool {
        match self.tracked_download_state.as_deref() {
            None => true,
            Some(state) => matches!(state, "downloading" | "importPending"),
        }
    }

    /// Items a re-search should cover.
    pub fn research_target(&self) -> Option<SearchTarget> {
        if let Some(episode_id) = self.episode_id {
            Some(SearchTarget::Items(vec![episode_id]))
        } else if let Some(movie_id) = self.movie_id {
            Some(SearchTarget::Items(vec![movie_id]))
        } else {
            self.series_id.map(SearchTarget::Parent)
        }
    }
}

/// Handle of a command accepted by the back-end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandHandle {
    pub id: i64,
    pub name: String,
}

/// Lifecycle of a back-end command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Queued,
    Started,
    Completed,
    Failed,
    Aborted,
    Cancelled,
    Orphaned,
    /// The back-end no longer knows the command.
    Missing,
}

impl CommandStatus {
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "queued" => CommandStatus::Queued,
            "started" => CommandStatus::Started,
            "completed" => CommandStatus::Completed,
            "failed" => CommandStatus::Failed,
            "aborted" => CommandStatus::Aborted,
            "cancelled" => CommandStatus::Cancelled,
            "orphaned" => CommandStatus::Orphaned,
            _ => CommandStatus::Missing,
        }
    }

    /// The command will not make further progress.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CommandStatus::Queued | CommandStatus::Started)
    }
}

/// Subset of `/api/v3/system/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    pub app_name: Option<String>,
    pub version: String,
}

/// Trait for media-management back-ends.
#[async_trait]
pub trait ArrClient: Send + Sync {
    /// Instance name for logging.
    fn name(&self) -> &str;

    fn kind(&self) -> ArrKind;

    /// Liveness/identity check.
    async fn system_status(&self) -> Result<SystemStatus, ArrError>;

    /// Current download queue.
    async fn queue(&self) -> Result<Vec<QueueEntry>, ArrError>;

    /// Remove a queue record, optionally blacklisting the release.
    async fn remove_queue_item(
        &self,
        queue_id: i64,
        remove_from_client: bool,
        blocklist: bool,
    ) -> Result<(), ArrError>;

    /// Ask the back-end to import a completed download.
    async fn downloaded_scan(
        &self,
        path: &str,
        download_id: &str,
        import_mode: ImportMode,
    ) -> Result<CommandHandle, ArrError>;

    /// Trigger an RSS sync.
    async fn rss_sync(&self) -> Result<CommandHandle, ArrError>;

    /// Trigger a refresh of monitored downloads (queue refresh).
    async fn refresh_monitored_downloads(&self) -> Result<CommandHandle, ArrError>;

    /// Search for missing or upgradable items.
    async fn search(&self, target: &SearchTarget) -> Result<CommandHandle, ArrError>;

    /// Status of a previously issued command.
    async fn command_status(&self, command_id: i64) -> Result<CommandStatus, ArrError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(state: Option<&str>) -> QueueEntry {
        QueueEntry {
            id: 1,
            download_id: Some("abc".to_string()),
            title: None,
            episode_id: Some(10),
            series_id: Some(2),
            movie_id: None,
            tracked_download_state: state.map(|s| s.to_string()),
        }
    }

    #[test]
    fn test_awaits_import() {
        assert!(entry(None).awaits_import());
        assert!(entry(Some("importPending")).awaits_import());
        assert!(entry(Some("downloading")).awaits_import());
        assert!(!entry(Some("importing")).awaits_import());
        assert!(!entry(Some("imported")).awaits_import());
    }

    #[test]
    fn test_research_target_prefers_items() {
        assert_eq!(entry(None).research_target(), Some(SearchTarget::Items(vec![10])));

        let mut series_only = entry(None);
        series_only.episode_id = None;
        assert_eq!(series_only.research_target(), Some(SearchTarget::Parent(2)));

        series_only.series_id = None;
        assert_eq!(series_only.research_target(), None);
    }

    #[test]
    fn test_command_status_parse() {
        assert_eq!(CommandStatus::parse("queued"), CommandStatus::Queued);
        assert_eq!(CommandStatus::parse("Completed"), CommandStatus::Completed);
        assert_eq!(CommandStatus::parse("weird"), CommandStatus::Missing);
        assert!(!CommandStatus::Started.is_terminal());
        assert!(CommandStatus::Failed.is_terminal());
        assert!(CommandStatus::Missing.is_terminal());
    }

    #[test]
    fn test_kind_commands() {
        assert_eq!(ArrKind::Sonarr.downloaded_scan_command(), "DownloadedEpisodesScan");
        assert_eq!(ArrKind::Radarr.downloaded_scan_command(), "DownloadedMoviesScan");
        assert!(ArrKind::Sonarr.has_parents());
        assert!(!ArrKind::Radarr.has_parents());
    }

    #[test]
    fn test_import_mode_serde() {
        let mode: ImportMode = serde_json::from_str("\"Copy\"").unwrap();
        assert_eq!(mode, ImportMode::Copy);
        assert_eq!(ImportMode::default(), ImportMode::Move);
    }
}
