//! Builds, starts and stops the instance workers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::{InstanceWorker, SkippedInstance, SupervisorStatus, WorkerError};
use crate::config::{validate_config, Config, ConnectivityConfig};
use crate::filter::{FfprobeProbe, MediaProbe, NoProbe};
use crate::runtime::{spawn_connectivity_monitor, RuntimeContext, RuntimeHandle};
use crate::torrent_client::{QBittorrentClient, TorrentClient};

/// Owns every instance worker of one run of the daemon.
pub struct Supervisor {
    runtime: Arc<RuntimeHandle>,
    connectivity: ConnectivityConfig,
    workers: Vec<Arc<InstanceWorker>>,
    skipped: Vec<SkippedInstance>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
    started_at: DateTime<Utc>,
}

impl Supervisor {
    /// Build workers for every managed instance.
    ///
    /// Global configuration errors abort. An instance that fails
    /// validation or whose back-end is unreachable is skipped.
    pub async fn build(config: &Config) -> Result<Self, WorkerError> {
        validate_config(config)?;

        let client: Arc<dyn TorrentClient> =
            Arc::new(QBittorrentClient::new(config.qbittorrent.clone())?);
        let probe: Arc<dyn MediaProbe> = if config.probe.enabled {
            Arc::new(FfprobeProbe::detect(&config.probe).await)
        } else {
            Arc::new(NoProbe)
        };

        let mut workers = Vec::new();
        let mut skipped = Vec::new();
        for instance in config.instances.iter().filter(|i| i.managed) {
            match InstanceWorker::connect(instance, &config.settings, client.clone(), probe.clone())
                .await
            {
                Ok(worker) => workers.push(Arc::new(worker)),
                Err(e) => {
                    error!(instance = %instance.name, "Instance not started: {}", e);
                    skipped.push(SkippedInstance {
                        instance: instance.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let unmanaged = config.instances.iter().filter(|i| !i.managed).count();
        info!(
            workers = workers.len(),
            skipped = skipped.len(),
            unmanaged,
            "Supervisor built"
        );
        Ok(Self::from_workers(
            workers,
            skipped,
            config.connectivity.clone(),
        ))
    }

    /// Assemble a supervisor from prepared workers.
    pub fn from_workers(
        workers: Vec<Arc<InstanceWorker>>,
        skipped: Vec<SkippedInstance>,
        connectivity: ConnectivityConfig,
    ) -> Self {
        Self {
            runtime: Arc::new(RuntimeHandle::new()),
            connectivity,
            workers,
            skipped,
            tasks: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            started_at: Utc::now(),
        }
    }

    pub fn context(&self) -> RuntimeContext {
        self.runtime.context()
    }

    pub fn workers(&self) -> &[Arc<InstanceWorker>] {
        &self.workers
    }

    /// Spawn the connectivity monitor and every worker cycle.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Supervisor already running");
            return;
        }

        let mut tasks = self.tasks.lock().await;
        if let Some(task) = spawn_connectivity_monitor(&self.connectivity, self.runtime.clone()) {
            tasks.push(task);
        }
        let ctx = self.runtime.context();
        for worker in &self.workers {
            tasks.extend(worker.spawn(&ctx));
        }
        info!(tasks = tasks.len(), "Supervisor started");
    }

    /// Signal every cycle to stop at its next suspension point.
    pub fn request_shutdown(&self) {
        self.runtime.request_shutdown();
    }

    /// Stop all tasks, waiting up to `timeout` before aborting the rest.
    ///
    /// Returns `true` when every task finished in time.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.request_shutdown();
        self.running.store(false, Ordering::SeqCst);

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        if tasks.is_empty() {
            return true;
        }
        info!(tasks = tasks.len(), "Waiting for running cycles to finish");

        let aborts: Vec<_> = tasks.iter().map(|t| t.abort_handle()).collect();
        let joined = tokio::time::timeout(timeout, futures::future::join_all(tasks)).await;
        match joined {
            Ok(_) => {
                info!("All cycles stopped");
                true
            }
            Err(_) => {
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "Cycles still running after shutdown timeout, aborting"
                );
                for abort in aborts {
                    abort.abort();
                }
                false
            }
        }
    }

    pub fn status(&self) -> SupervisorStatus {
        let ctx = self.runtime.context();
        SupervisorStatus {
            started_at: self.started_at,
            online: ctx.is_online(),
            shutting_down: ctx.is_shutting_down(),
            workers: self.workers.iter().map(|w| w.status(&ctx)).collect(),
            skipped: self.skipped.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arr::ArrKind;
    use crate::config::Settings;
    use crate::testing::{fixtures, MockArrClient, MockTorrentClient};
    use crate::worker::WorkerDeps;

    fn offline_connectivity() -> ConnectivityConfig {
        ConnectivityConfig {
            enabled: false,
            ..Default::default()
        }
    }

    fn worker(name: &str, arr: Arc<MockArrClient>) -> Arc<InstanceWorker> {
        let mut instance = fixtures::instance(name, ArrKind::Sonarr);
        instance.refresh_downloads_timer_mins = 1;
        let deps = WorkerDeps {
            client: Arc::new(MockTorrentClient::new()),
            arr,
            probe: Arc::new(NoProbe),
            catalog: None,
            request_services: Vec::new(),
        };
        Arc::new(InstanceWorker::new(&instance, &Settings::default(), deps).unwrap())
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let arr = Arc::new(MockArrClient::new(ArrKind::Sonarr));
        let supervisor = Supervisor::from_workers(
            vec![worker("tv", arr.clone())],
            vec![SkippedInstance {
                instance: "broken".to_string(),
                reason: "unreachable".to_string(),
            }],
            offline_connectivity(),
        );

        supervisor.start().await;
        while arr.command_names().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let status = supervisor.status();
        assert!(status.online);
        assert_eq!(status.workers.len(), 1);
        assert_eq!(status.skipped[0].instance, "broken");

        assert!(supervisor.shutdown(Duration::from_secs(5)).await);
        assert!(supervisor.status().shutting_down);
    }

    #[tokio::test]
    async fn test_instances_are_isolated() {
        let healthy = Arc::new(MockArrClient::new(ArrKind::Sonarr));
        let broken = Arc::new(MockArrClient::new(ArrKind::Sonarr));
        broken.set_unavailable(true).await;

        let supervisor = Supervisor::from_workers(
            vec![worker("broken", broken.clone()), worker("tv", healthy.clone())],
            Vec::new(),
            offline_connectivity(),
        );
        supervisor.start().await;
        while healthy.command_names().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        supervisor.shutdown(Duration::from_secs(5)).await;

        assert!(broken.command_names().await.is_empty());
        assert_eq!(healthy.command_names().await.len(), 1);
    }

    #[tokio::test]
    async fn test_build_skips_unreachable_instance() {
        let config: Config = crate::config::load_config_from_str(
            r#"
            [connectivity]
            enabled = false

            [probe]
            enabled = false

            [qbittorrent]
            url = "http://127.0.0.1:1"

            [[instances]]
            name = "tv"
            kind = "sonarr"
            uri = "http://127.0.0.1:1"
            api_key = "key"
            timeout_secs = 1
            "#,
        )
        .unwrap();

        let supervisor = Supervisor::build(&config).await.unwrap();
        let status = supervisor.status();
        assert!(status.workers.is_empty());
        assert_eq!(status.skipped.len(), 1);
        assert!(status.skipped[0].reason.contains("unreachable"));
    }
}
