//! Missing-media search sweeps with bounded concurrency.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::cooldown::CooldownTracker;
use super::ordering::{request_candidates, select_candidates};
use super::{SchedulerStatus, SearchCandidate, SearchError, SweepSummary};
use crate::arr::{ArrClient, ArrKind, CommandHandle, CommandStatus};
use crate::catalog::{CatalogError, CatalogReader, MissingItem};
use crate::config::EntrySearchConfig;
use crate::governor::{Governor, SearchPermit};
use crate::metrics;
use crate::requests::RequestService;
use crate::runtime::RuntimeContext;

/// Finds missing media for one instance and dispatches searches.
pub struct SearchScheduler {
    instance: String,
    kind: ArrKind,
    config: EntrySearchConfig,
    arr: Arc<dyn ArrClient>,
    catalog: Arc<dyn CatalogReader>,
    governor: Arc<Governor>,
    cooldowns: Mutex<CooldownTracker>,
    /// Request-feed candidates, served before sweep candidates.
    pending: Mutex<VecDeque<SearchCandidate>>,
    catalog_healthy: AtomicBool,
}

enum Dispatch {
    Sent,
    CoolingDown,
    Failed,
    Shutdown,
}

impl SearchScheduler {
    pub fn new(
        instance: impl Into<String>,
        kind: ArrKind,
        config: EntrySearchConfig,
        arr: Arc<dyn ArrClient>,
        catalog: Arc<dyn CatalogReader>,
        governor: Arc<Governor>,
    ) -> Self {
        let every = Duration::from_secs(config.search_requests_every);
        Self {
            instance: instance.into(),
            kind,
            config,
            arr,
            catalog,
            governor,
            cooldowns: Mutex::new(CooldownTracker::new(every)),
            pending: Mutex::new(VecDeque::new()),
            catalog_healthy: AtomicBool::new(true),
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            catalog_healthy: self.catalog_healthy.load(Ordering::Relaxed),
            tracked_cooldowns: self.cooldowns.lock().map(|c| c.len()).unwrap_or(0),
            pending_requests: self.pending.lock().map(|p| p.len()).unwrap_or(0),
        }
    }

    /// Read the catalog on the blocking pool, logging health transitions once.
    async fn read_catalog(&self) -> Result<Vec<MissingItem>, SearchError> {
        let catalog = self.catalog.clone();
        let result = tokio::task::spawn_blocking(move || catalog.items())
            .await
            .unwrap_or_else(|e| Err(CatalogError::Database(format!("catalog task: {}", e))));

        match result {
            Ok(items) => {
                if !self.catalog_healthy.swap(true, Ordering::Relaxed) {
                    info!(instance = %self.instance, "Catalog readable again, resuming searches");
                }
                Ok(items)
            }
            Err(e) => {
                if self.catalog_healthy.swap(false, Ordering::Relaxed) {
                    warn!(instance = %self.instance, "Catalog unreadable, pausing searches: {}", e);
                }
                Err(e.into())
            }
        }
    }

    /// Item ids already in the back-end download queue.
    async fn queued_items(&self) -> Result<HashSet<i64>, SearchError> {
        self.governor.pace().await;
        let queue = self.arr.queue().await?;
        Ok(queue
            .iter()
            .filter_map(|entry| entry.episode_id.or(entry.movie_id))
            .collect())
    }

    /// Queue request-feed candidates ahead of the sweep. Returns how many were new.
    pub fn queue_requests(&self, candidates: Vec<SearchCandidate>) -> usize {
        let Ok(mut pending) = self.pending.lock() else {
            return 0;
        };
        let mut added = 0;
        for candidate in candidates {
            if pending.iter().all(|p| p.key != candidate.key) {
                pending.push_back(candidate);
                added += 1;
            }
        }
        added
    }

    fn next_request(&self) -> Option<SearchCandidate> {
        self.pending.lock().ok().and_then(|mut p| p.pop_front())
    }

    /// Fetch requested media from `services`, match it against the catalog
    /// and queue the result. Returns the number of newly queued candidates.
    pub async fn refresh_requests(
        &self,
        services: &[Arc<dyn RequestService>],
    ) -> Result<usize, SearchError> {
        let mut requested = Vec::new();
        for service in services {
            match service.requested(self.kind).await {
                Ok(media) => requested.extend(media),
                Err(e) => warn!(
                    instance = %self.instance,
                    service = service.name(),
                    "Request feed failed: {}", e
                ),
            }
        }
        if requested.is_empty() {
            return Ok(0);
        }

        let items = self.read_catalog().await?;
        let queued = self.queued_items().await?;
        let candidates = request_candidates(
            &items,
            &requested,
            self.kind,
            &self.config,
            &queued,
            Utc::now(),
        );
        let added = self.queue_requests(candidates);
        if added > 0 {
            info!(instance = %self.instance, queued = added, "Requested media queued for search");
        }
        Ok(added)
    }

    /// Dispatch queued request candidates without a catalog sweep.
    pub async fn dispatch_requests(&self, ctx: &RuntimeContext) -> SweepSummary {
        let mut summary = SweepSummary::default();
        while let Some(candidate) = self.next_request() {
            summary.candidates += 1;
            if self.record(&mut summary, self.dispatch(ctx, &candidate).await) {
                break;
            }
        }
        summary
    }

    /// Run one sweep: read the catalog, order candidates, dispatch searches.
    ///
    /// Returns once every candidate was handled, or early on shutdown.
    pub async fn run_sweep(&self, ctx: &RuntimeContext) -> Result<SweepSummary, SearchError> {
        let mut summary = SweepSummary::default();
        self.prune_cooldowns();

        loop {
            let items = self.read_catalog().await?;
            let queued = self.queued_items().await?;
            let mut candidates = select_candidates(
                &items,
                self.kind,
                &self.config,
                &queued,
                Utc::now(),
            )
            .into_iter();
            summary.passes += 1;
            let dispatched_before = summary.dispatched;

            loop {
                let Some(candidate) = self.next_request().or_else(|| candidates.next()) else {
                    break;
                };
                summary.candidates += 1;
                if self.record(&mut summary, self.dispatch(ctx, &candidate).await) {
                    return Ok(summary);
                }
            }

            let dispatched_this_pass = summary.dispatched - dispatched_before;
            if !self.config.search_again_on_search_completion || dispatched_this_pass == 0 {
                break;
            }
            debug!(instance = %self.instance, "Sweep exhausted, re-reading catalog");
        }

        debug!(
            instance = %self.instance,
            candidates = summary.candidates,
            dispatched = summary.dispatched,
            cooling_down = summary.cooling_down,
            failed = summary.failed,
            "Search sweep complete"
        );
        Ok(summary)
    }

    /// Tally one dispatch result. Returns true when the sweep must stop.
    fn record(&self, summary: &mut SweepSummary, dispatch: Dispatch) -> bool {
        match dispatch {
            Dispatch::Sent => summary.dispatched += 1,
            Dispatch::CoolingDown => summary.cooling_down += 1,
            Dispatch::Failed => summary.failed += 1,
            Dispatch::Shutdown => {
                summary.interrupted = true;
                return true;
            }
        }
        false
    }

    fn prune_cooldowns(&self) {
        if let Ok(mut cooldowns) = self.cooldowns.lock() {
            cooldowns.prune(Instant::now());
        }
    }

    async fn dispatch(&self, ctx: &RuntimeContext, candidate: &SearchCandidate) -> Dispatch {
        if ctx.is_shutting_down() {
            return Dispatch::Shutdown;
        }
        let ready = self
            .cooldowns
            .lock()
            .map(|c| c.is_ready(candidate.key, Instant::now()))
            .unwrap_or(false);
        if !ready {
            return Dispatch::CoolingDown;
        }

        let permit = tokio::select! {
            permit = self.governor.acquire_search() => permit,
            _ = ctx.shutdown_requested() => None,
        };
        let Some(permit) = permit else {
            return Dispatch::Shutdown;
        };

        // Another dispatcher may have taken the key while we waited for a slot.
        let reservation = self
            .cooldowns
            .lock()
            .ok()
            .and_then(|mut c| c.reserve(candidate.key, Instant::now()));
        let Some(previous) = reservation else {
            return Dispatch::CoolingDown;
        };

        self.governor.pace().await;
        match self.arr.search(&candidate.target).await {
            Ok(handle) => {
                info!(
                    instance = %self.instance,
                    item = %candidate.label,
                    origin = ?candidate.origin,
                    command_id = handle.id,
                    "Search dispatched"
                );
                metrics::SEARCHES_TOTAL
                    .with_label_values(&[&self.instance, "dispatched"])
                    .inc();
                self.track(ctx, handle, permit);
                Dispatch::Sent
            }
            Err(e) => {
                warn!(
                    instance = %self.instance,
                    item = %candidate.label,
                    "Search failed: {}", e
                );
                metrics::SEARCHES_TOTAL
                    .with_label_values(&[&self.instance, "failed"])
                    .inc();
                if let Ok(mut cooldowns) = self.cooldowns.lock() {
                    cooldowns.restore(candidate.key, previous);
                }
                Dispatch::Failed
            }
        }
    }

    /// Hold the budget slot until the command finishes on the back-end.
    fn track(&self, ctx: &RuntimeContext, handle: CommandHandle, permit: SearchPermit) {
        let arr = self.arr.clone();
        let ctx = ctx.clone();
        let instance = self.instance.clone();
        let poll = Duration::from_secs(self.config.command_poll_interval_secs.max(1));
        let timeout = Duration::from_secs(self.config.command_timeout_secs);

        let gauge = metrics::SEARCHES_IN_FLIGHT.with_label_values(&[&instance]);
        gauge.inc();

        tokio::spawn(async move {
            let _permit = permit;
            let deadline = Instant::now() + timeout;

            let status = loop {
                tokio::select! {
                    _ = tokio::time::sleep(poll) => {}
                    _ = ctx.shutdown_requested() => break None,
                }
                if Instant::now() >= deadline {
                    warn!(instance = %instance, command_id = handle.id, "Search command timed out, releasing slot");
                    break None;
                }
                match arr.command_status(handle.id).await {
                    Ok(status) if status.is_terminal() => break Some(status),
                    Ok(_) => {}
                    Err(e) => debug!(instance = %instance, command_id = handle.id, "Command status unavailable: {}", e),
                }
            };

            if let Some(status) = status {
                if status != CommandStatus::Completed {
                    debug!(instance = %instance, command_id = handle.id, status = ?status, "Search command ended");
                }
            }
            gauge.dec();
        });
    }
}
