//! Types for the search scheduler.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::arr::{ArrError, SearchTarget};
use crate::catalog::CatalogError;
use crate::requests::RequestError;

/// Errors that end a sweep early.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Back-end error: {0}")]
    Arr(#[from] ArrError),

    #[error("Request feed error: {0}")]
    Request(#[from] RequestError),
}

/// What a cooldown timestamp is tracked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CooldownKey {
    /// An episode or movie.
    Item(i64),
    /// A whole series, when searching by series.
    Parent(i64),
}

/// Where a candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateOrigin {
    Sweep,
    Request,
}

/// One search to dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchCandidate {
    pub key: CooldownKey,
    pub target: SearchTarget,
    /// Human readable label for logs.
    pub label: String,
    pub release_date: Option<DateTime<Utc>>,
    pub origin: CandidateOrigin,
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepSummary {
    /// Catalog passes (more than one with search-again-on-completion).
    pub passes: usize,
    pub candidates: usize,
    pub dispatched: usize,
    pub cooling_down: usize,
    pub failed: usize,
    /// The sweep stopped early because of shutdown.
    pub interrupted: bool,
}

/// Scheduler state for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub catalog_healthy: bool,
    pub tracked_cooldowns: usize,
    pub pending_requests: usize,
}
