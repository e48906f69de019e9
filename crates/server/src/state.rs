use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use arrwarden_core::{Config, SanitizedConfig, Supervisor};

/// One run of the workers together with the configuration it was built from.
struct Generation {
    config: Config,
    config_hash: String,
    supervisor: Arc<Supervisor>,
}

/// Shared application state.
///
/// Points at the current supervisor; a self-restart swaps in a new one.
pub struct AppState {
    current: RwLock<Generation>,
    restarts: AtomicU64,
}

impl AppState {
    pub fn new(config: Config, config_hash: String, supervisor: Arc<Supervisor>) -> Self {
        Self {
            current: RwLock::new(Generation {
                config,
                config_hash,
                supervisor,
            }),
            restarts: AtomicU64::new(0),
        }
    }

    pub fn supervisor(&self) -> Arc<Supervisor> {
        self.read(|g| g.supervisor.clone())
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        self.read(|g| SanitizedConfig::from(&g.config))
    }

    pub fn config_hash(&self) -> String {
        self.read(|g| g.config_hash.clone())
    }

    pub fn restarts(&self) -> u64 {
        self.restarts.load(Ordering::Relaxed)
    }

    /// Install the supervisor of a restarted run.
    pub fn replace(&self, config: Config, config_hash: String, supervisor: Arc<Supervisor>) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = Generation {
            config,
            config_hash,
            supervisor,
        };
        self.restarts.fetch_add(1, Ordering::Relaxed);
    }

    fn read<T>(&self, f: impl FnOnce(&Generation) -> T) -> T {
        let current = self.current.read().unwrap_or_else(|e| e.into_inner());
        f(&current)
    }
}
