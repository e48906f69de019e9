//! Types for instance workers and the supervisor.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::arr::{ArrError, ArrKind};
use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::filter::FilterError;
use crate::governor::GovernorStatus;
use crate::monitor::MonitorError;
use crate::requests::RequestError;
use crate::runtime::CycleKind;
use crate::search::{SchedulerStatus, SearchError};
use crate::torrent_client::TorrentClientError;

/// Errors from building or running a worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid filter: {0}")]
    Filter(#[from] FilterError),

    #[error("Download client error: {0}")]
    Client(#[from] TorrentClientError),

    #[error("Back-end error: {0}")]
    Arr(#[from] ArrError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Request feed error: {0}")]
    Request(#[from] RequestError),

    #[error("Monitor cycle failed: {0}")]
    Monitor(#[from] MonitorError),

    #[error("Search sweep failed: {0}")]
    Search(#[from] SearchError),

    #[error("Back-end '{instance}' unreachable at startup: {reason}")]
    Unreachable { instance: String, reason: String },
}

/// Bookkeeping for one cycle kind of one worker.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleStats {
    pub runs: u64,
    pub failures: u64,
    pub last_started: Option<DateTime<Utc>>,
    pub last_finished: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Status of one cycle for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CycleStatus {
    pub cycle: CycleKind,
    pub interval_secs: u64,
    pub running: bool,
    #[serde(flatten)]
    pub stats: CycleStats,
}

/// Status of one instance worker.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub instance: String,
    pub kind: ArrKind,
    pub category: String,
    pub governor: GovernorStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<SchedulerStatus>,
    pub cycles: Vec<CycleStatus>,
}

/// An instance that was configured but not started.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedInstance {
    pub instance: String,
    pub reason: String,
}

/// Process-wide status.
#[derive(Debug, Clone, Serialize)]
pub struct SupervisorStatus {
    pub started_at: DateTime<Utc>,
    pub online: bool,
    pub shutting_down: bool,
    pub workers: Vec<WorkerStatus>,
    pub skipped: Vec<SkippedInstance>,
}
