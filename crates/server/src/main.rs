mod api;
mod metrics;
mod state;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use arrwarden_core::{load_config, validate_config, Config, SanitizedConfig, Supervisor};

use api::create_router;
use state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();
    info!(version = VERSION, "Starting arrwarden");

    let config_path = std::env::var("ARRWARDEN_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    let mut config = load_and_validate(&config_path)?;
    let supervisor = build_supervisor(&config).await?;
    let state = Arc::new(AppState::new(
        config.clone(),
        config_hash(&config),
        supervisor,
    ));

    let server = if config.server.enabled {
        Some(StatusServer::start(&config, state.clone()).await?)
    } else {
        info!("Status endpoint disabled");
        None
    };

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let supervisor = state.supervisor();
        supervisor.start().await;

        let restart_after = config.settings.auto_restart_secs;
        let restart_timer = async {
            if restart_after == 0 {
                std::future::pending::<()>().await;
            } else {
                tokio::time::sleep(Duration::from_secs(restart_after)).await;
            }
        };

        let exiting = tokio::select! {
            _ = &mut shutdown => true,
            _ = restart_timer => false,
        };

        info!("Stopping workers");
        let timeout = Duration::from_secs(config.settings.shutdown_timeout_secs);
        if !supervisor.shutdown(timeout).await {
            warn!("Some cycles were aborted");
        }
        if exiting {
            break;
        }

        info!(after_secs = restart_after, "Restart timer fired, reloading configuration");
        match load_and_validate(&config_path) {
            Ok(reloaded) => config = reloaded,
            Err(e) => error!("Reload failed, keeping previous configuration: {:#}", e),
        }
        let supervisor = build_supervisor(&config).await?;
        state.replace(config.clone(), config_hash(&config), supervisor);
        metrics::RESTARTS_TOTAL.inc();
    }

    if let Some(server) = server {
        server.stop().await;
    }
    info!("arrwarden stopped");
    Ok(())
}

/// Install the tracing subscriber; `ARRWARDEN_LOG_FORMAT=json` switches to JSON lines.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let json = std::env::var("ARRWARDEN_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn load_and_validate(path: &Path) -> Result<Config> {
    info!("Loading configuration from {:?}", path);
    let config =
        load_config(path).with_context(|| format!("Failed to load config from {:?}", path))?;
    validate_config(&config).context("Configuration validation failed")?;

    let sanitized = SanitizedConfig::from(&config);
    info!(
        instances = sanitized.instances.len(),
        qbittorrent = %sanitized.qbittorrent.url,
        "Configuration loaded"
    );
    for instance in &sanitized.instances {
        info!(
            instance = %instance.name,
            kind = %instance.kind,
            managed = instance.managed,
            category = %instance.category,
            search_missing = instance.search_missing,
            "Instance configured"
        );
    }
    Ok(config)
}

async fn build_supervisor(config: &Config) -> Result<Arc<Supervisor>> {
    let supervisor = Supervisor::build(config)
        .await
        .context("Failed to build workers")?;
    Ok(Arc::new(supervisor))
}

/// Short content hash identifying the loaded configuration.
fn config_hash(config: &Config) -> String {
    let json = serde_json::to_string(config).unwrap_or_default();
    let digest = format!("{:x}", Sha256::digest(json.as_bytes()));
    digest[..16].to_string()
}

/// The optional HTTP status endpoint. It outlives worker restarts.
struct StatusServer {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl StatusServer {
    async fn start(config: &Config, state: Arc<AppState>) -> Result<Self> {
        let addr = SocketAddr::new(config.server.host, config.server.port);
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;
        info!("Status endpoint listening on {}", addr);

        let (stop, stopped) = oneshot::channel::<()>();
        let app = create_router(state);
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = stopped.await;
                })
                .await;
            if let Err(e) = result {
                error!("Status endpoint error: {}", e);
            }
        });
        Ok(Self { stop, task })
    }

    async fn stop(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.task.await {
            warn!("Status endpoint task failed: {}", e);
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
