//! One worker per configured instance, running its recurring cycles.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{CycleStats, CycleStatus, WorkerError, WorkerStatus};
use crate::arr::{ArrClient, ArrHttpClient, ArrKind};
use crate::catalog::{CatalogReader, SqliteCatalogReader};
use crate::config::{validate_instance, InstanceConfig, Settings};
use crate::filter::{FilterEngine, MediaProbe};
use crate::governor::Governor;
use crate::metrics;
use crate::monitor::TorrentMonitor;
use crate::requests::{self, RequestService};
use crate::runtime::{CycleKind, RuntimeContext};
use crate::search::SearchScheduler;
use crate::torrent_client::TorrentClient;

/// External services an instance worker runs against.
pub struct WorkerDeps {
    pub client: Arc<dyn TorrentClient>,
    pub arr: Arc<dyn ArrClient>,
    pub probe: Arc<dyn MediaProbe>,
    /// Required when the instance searches for missing media.
    pub catalog: Option<Arc<dyn CatalogReader>>,
    pub request_services: Vec<Arc<dyn RequestService>>,
}

/// Runs the monitor, timers and search cycles of one instance.
pub struct InstanceWorker {
    name: String,
    kind: ArrKind,
    category: String,
    intervals: Vec<(CycleKind, Duration)>,
    arr: Arc<dyn ArrClient>,
    governor: Arc<Governor>,
    monitor: TorrentMonitor,
    scheduler: Option<SearchScheduler>,
    request_services: Vec<Arc<dyn RequestService>>,
    stats: Mutex<HashMap<CycleKind, CycleStats>>,
}

impl InstanceWorker {
    /// Validate an instance and connect to its back-end.
    ///
    /// Fails when the configuration is invalid or the back-end does not
    /// answer, so the caller can skip this instance.
    pub async fn connect(
        instance: &InstanceConfig,
        settings: &Settings,
        client: Arc<dyn TorrentClient>,
        probe: Arc<dyn MediaProbe>,
    ) -> Result<Self, WorkerError> {
        validate_instance(instance, settings)?;

        let arr = ArrHttpClient::new(
            instance.name.clone(),
            instance.kind,
            &instance.uri,
            instance.api_key.clone(),
            Duration::from_secs(instance.timeout_secs),
        )?;
        let status = arr
            .system_status()
            .await
            .map_err(|e| WorkerError::Unreachable {
                instance: instance.name.clone(),
                reason: e.to_string(),
            })?;
        info!(
            instance = %instance.name,
            kind = %instance.kind,
            version = %status.version,
            "Connected to back-end"
        );

        let catalog = match (&instance.search.database_file, instance.search.search_missing) {
            (Some(path), true) => Some(
                Arc::new(SqliteCatalogReader::new(path, instance.kind)) as Arc<dyn CatalogReader>
            ),
            _ => None,
        };

        let deps = WorkerDeps {
            client,
            arr: Arc::new(arr),
            probe,
            catalog,
            request_services: requests::services_for(instance)?,
        };
        Self::new(instance, settings, deps)
    }

    /// Assemble a worker from already-built services.
    pub fn new(
        instance: &InstanceConfig,
        settings: &Settings,
        deps: WorkerDeps,
    ) -> Result<Self, WorkerError> {
        let filter = Arc::new(FilterEngine::new(&instance.torrent)?);
        let governor = Arc::new(Governor::new(
            instance.search.search_limit.max(1),
            Duration::from_millis(instance.api_call_spacing_ms),
        ));

        let monitor = TorrentMonitor::new(
            instance,
            settings,
            deps.client,
            deps.arr.clone(),
            filter,
            deps.probe,
            governor.clone(),
        );

        let scheduler = match (&deps.catalog, instance.search.search_missing) {
            (Some(catalog), true) => Some(SearchScheduler::new(
                instance.name.clone(),
                instance.kind,
                instance.search.clone(),
                deps.arr.clone(),
                catalog.clone(),
                governor.clone(),
            )),
            _ => None,
        };

        let mut intervals = vec![(
            CycleKind::TransferMonitor,
            Duration::from_secs(settings.loop_sleep_secs.max(1)),
        )];
        if instance.rss_sync_timer_mins > 0 {
            intervals.push((
                CycleKind::RssSync,
                Duration::from_secs(instance.rss_sync_timer_mins * 60),
            ));
        }
        if instance.refresh_downloads_timer_mins > 0 {
            intervals.push((
                CycleKind::QueueRefresh,
                Duration::from_secs(instance.refresh_downloads_timer_mins * 60),
            ));
        }
        if scheduler.is_some() {
            intervals.push((
                CycleKind::SearchSweep,
                Duration::from_secs(instance.search.sweep_interval_secs.max(1)),
            ));
            if !deps.request_services.is_empty() {
                intervals.push((
                    CycleKind::RequestFeed,
                    Duration::from_secs(instance.search.request_sweep_interval_secs.max(1)),
                ));
            }
        }

        Ok(Self {
            name: instance.name.clone(),
            kind: instance.kind,
            category: instance.category().to_string(),
            intervals,
            arr: deps.arr,
            governor,
            monitor,
            scheduler,
            request_services: deps.request_services,
            stats: Mutex::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cycles this worker runs, with their intervals.
    pub fn cycles(&self) -> Vec<CycleKind> {
        self.intervals.iter().map(|(kind, _)| *kind).collect()
    }

    /// Spawn one task per enabled cycle.
    pub fn spawn(self: &Arc<Self>, ctx: &RuntimeContext) -> Vec<JoinHandle<()>> {
        self.intervals
            .iter()
            .map(|(kind, every)| self.spawn_cycle(ctx.clone(), *kind, *every))
            .collect()
    }

    fn spawn_cycle(
        self: &Arc<Self>,
        ctx: RuntimeContext,
        kind: CycleKind,
        every: Duration,
    ) -> JoinHandle<()> {
        let worker = Arc::clone(self);
        tokio::spawn(async move {
            info!(instance = %worker.name, cycle = %kind, every_secs = every.as_secs(), "Cycle started");
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ctx.shutdown_requested() => break,
                    _ = ticker.tick() => {}
                }
                if !ctx.is_online() {
                    debug!(instance = %worker.name, cycle = %kind, "Waiting for connectivity");
                }
                if !ctx.wait_online().await {
                    break;
                }
                let Some(_guard) = ctx.single_flight().try_enter(&worker.name, kind) else {
                    debug!(instance = %worker.name, cycle = %kind, "Previous run still active, skipping tick");
                    continue;
                };
                worker.run_cycle(&ctx, kind).await;
            }
            debug!(instance = %worker.name, cycle = %kind, "Cycle stopped");
        })
    }

    /// Run one cycle now, recording duration, stats and failures.
    pub async fn run_cycle(&self, ctx: &RuntimeContext, kind: CycleKind) -> bool {
        self.update_stats(kind, |stats| stats.last_started = Some(Utc::now()));
        let timer = metrics::CYCLE_DURATION
            .with_label_values(&[&self.name, kind.as_str()])
            .start_timer();

        let result = self.execute(ctx, kind).await;
        timer.observe_duration();

        let ok = result.is_ok();
        if let Err(e) = &result {
            metrics::CYCLE_FAILURES
                .with_label_values(&[&self.name, kind.as_str()])
                .inc();
            warn!(instance = %self.name, cycle = %kind, "Cycle failed: {}", e);
        }
        self.update_stats(kind, |stats| {
            stats.runs += 1;
            stats.last_finished = Some(Utc::now());
            match result {
                Ok(()) => stats.last_error = None,
                Err(e) => {
                    stats.failures += 1;
                    stats.last_error = Some(e.to_string());
                }
            }
        });
        ok
    }

    async fn execute(&self, ctx: &RuntimeContext, kind: CycleKind) -> Result<(), WorkerError> {
        match kind {
            CycleKind::TransferMonitor => {
                let summary = self.monitor.run_cycle().await?;
                debug!(
                    instance = %self.name,
                    torrents = summary.torrents_seen,
                    actions_ok = summary.actions_ok,
                    actions_failed = summary.actions_failed,
                    "Monitor cycle done"
                );
            }
            CycleKind::RssSync => {
                self.governor.pace().await;
                let command = self.arr.rss_sync().await?;
                debug!(instance = %self.name, command_id = command.id, "RSS sync requested");
            }
            CycleKind::QueueRefresh => {
                self.governor.pace().await;
                let command = self.arr.refresh_monitored_downloads().await?;
                debug!(instance = %self.name, command_id = command.id, "Queue refresh requested");
            }
            CycleKind::SearchSweep => {
                if let Some(scheduler) = &self.scheduler {
                    let summary = scheduler.run_sweep(ctx).await?;
                    if summary.dispatched > 0 {
                        info!(
                            instance = %self.name,
                            dispatched = summary.dispatched,
                            cooling_down = summary.cooling_down,
                            failed = summary.failed,
                            "Search sweep done"
                        );
                    }
                }
            }
            CycleKind::RequestFeed => {
                if let Some(scheduler) = &self.scheduler {
                    let queued = scheduler.refresh_requests(&self.request_services).await?;
                    // A running sweep picks the requests up itself.
                    if queued > 0
                        && !ctx
                            .single_flight()
                            .is_running(&self.name, CycleKind::SearchSweep)
                    {
                        scheduler.dispatch_requests(ctx).await;
                    }
                }
            }
        }
        Ok(())
    }

    fn update_stats(&self, kind: CycleKind, apply: impl FnOnce(&mut CycleStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            apply(stats.entry(kind).or_default());
        }
    }

    pub fn status(&self, ctx: &RuntimeContext) -> WorkerStatus {
        let stats = self.stats.lock().map(|s| s.clone()).unwrap_or_default();

        WorkerStatus {
            instance: self.name.clone(),
            kind: self.kind,
            category: self.category.clone(),
            governor: self.governor.status(),
            search: self.scheduler.as_ref().map(SearchScheduler::status),
            cycles: self
                .intervals
                .iter()
                .map(|(kind, every)| CycleStatus {
                    cycle: *kind,
                    interval_secs: every.as_secs(),
                    running: ctx.single_flight().is_running(&self.name, *kind),
                    stats: stats.get(kind).cloned().unwrap_or_default(),
                })
                .collect(),
        }
    }
}
