//! Types for the transfer monitor.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use crate::arr::{ArrError, SearchTarget};
use crate::torrent_client::{TorrentClientError, TorrentFile, TorrentInfo, TrackerEntry};

/// Errors that abort a monitor cycle.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Download client error: {0}")]
    Client(#[from] TorrentClientError),

    #[error("Back-end error: {0}")]
    Arr(#[from] ArrError),
}

/// Snapshot of one torrent for a single cycle.
#[derive(Debug, Clone, Serialize)]
pub struct TransferRecord {
    pub info: TorrentInfo,
    pub files: Vec<TorrentFile>,
    /// Empty when tracker policy does not need them.
    pub trackers: Vec<TrackerEntry>,
}

/// The monitor's verdict category for one torrent in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationDecision {
    Healthy,
    Stalled,
    FilteredOut,
    ImportCandidate,
    BlocklistCandidate,
    TooYoungToJudge,
    SeedingLimitReached,
    RecheckRequested,
}

impl ClassificationDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationDecision::Healthy => "healthy",
            ClassificationDecision::Stalled => "stalled",
            ClassificationDecision::FilteredOut => "filtered_out",
            ClassificationDecision::ImportCandidate => "import_candidate",
            ClassificationDecision::BlocklistCandidate => "blocklist_candidate",
            ClassificationDecision::TooYoungToJudge => "too_young_to_judge",
            ClassificationDecision::SeedingLimitReached => "seeding_limit_reached",
            ClassificationDecision::RecheckRequested => "recheck_requested",
        }
    }
}

impl std::fmt::Display for ClassificationDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One command the monitor issues for a torrent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MonitorAction {
    RemoveTrackers { urls: Vec<String> },
    SetDownloadLimit { limit: u64 },
    SetUploadLimit { limit: u64 },
    SetShareLimits { ratio: f64, seeding_time_mins: i64 },
    Recheck,
    Resume,
    SetCategory { category: String },
    SkipFiles { indices: Vec<usize> },
    /// Delete rejected files (relative to the save path) from disk.
    RemoveFiles { names: Vec<String> },
    /// Remove the queue record on the back-end and blacklist the release.
    Blocklist { queue_id: i64 },
    Delete { delete_files: bool },
    Research { target: SearchTarget },
    /// Ask the back-end to import the content at `path`.
    Import { path: String },
}

impl MonitorAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorAction::RemoveTrackers { .. } => "remove_trackers",
            MonitorAction::SetDownloadLimit { .. } => "set_download_limit",
            MonitorAction::SetUploadLimit { .. } => "set_upload_limit",
            MonitorAction::SetShareLimits { .. } => "set_share_limits",
            MonitorAction::Recheck => "recheck",
            MonitorAction::Resume => "resume",
            MonitorAction::SetCategory { .. } => "set_category",
            MonitorAction::SkipFiles { .. } => "skip_files",
            MonitorAction::RemoveFiles { .. } => "remove_files",
            MonitorAction::Blocklist { .. } => "blocklist",
            MonitorAction::Delete { .. } => "delete",
            MonitorAction::Research { .. } => "research",
            MonitorAction::Import { .. } => "import",
        }
    }

    /// Deletes data or blacklists a release.
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            MonitorAction::Delete { .. } | MonitorAction::Blocklist { .. }
        )
    }
}

/// Classification result for one torrent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub decision: ClassificationDecision,
    /// Commands in execution order.
    pub actions: Vec<MonitorAction>,
    pub reason: String,
}

impl Verdict {
    pub fn new(decision: ClassificationDecision, reason: impl Into<String>) -> Self {
        Self {
            decision,
            actions: Vec::new(),
            reason: reason.into(),
        }
    }

    pub fn with_actions(mut self, actions: impl IntoIterator<Item = MonitorAction>) -> Self {
        self.actions.extend(actions);
        self
    }

    pub fn has_destructive_action(&self) -> bool {
        self.actions.iter().any(MonitorAction::is_destructive)
    }
}

/// Outcome of one monitor cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleSummary {
    pub torrents_seen: usize,
    pub decisions: BTreeMap<ClassificationDecision, usize>,
    pub actions_ok: usize,
    pub actions_failed: usize,
}

impl CycleSummary {
    pub fn count(&self, decision: ClassificationDecision) -> usize {
        self.decisions.get(&decision).copied().unwrap_or(0)
    }
}
