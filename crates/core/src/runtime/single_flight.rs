//! Single-flight registry: at most one running cycle per (instance, kind).

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde::Serialize;

/// Recurring cycle kinds of an instance worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleKind {
    TransferMonitor,
    RssSync,
    QueueRefresh,
    SearchSweep,
    RequestFeed,
}

impl CycleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleKind::TransferMonitor => "transfer_monitor",
            CycleKind::RssSync => "rss_sync",
            CycleKind::QueueRefresh => "queue_refresh",
            CycleKind::SearchSweep => "search_sweep",
            CycleKind::RequestFeed => "request_feed",
        }
    }
}

impl std::fmt::Display for CycleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

type Key = (String, CycleKind);

#[derive(Clone, Default)]
pub struct SingleFlight {
    running: Arc<Mutex<HashSet<Key>>>,
}

/// Marks a cycle as running until dropped.
pub struct FlightGuard {
    key: Key,
    running: Arc<Mutex<HashSet<Key>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the cycle, or `None` if it is already running.
    pub fn try_enter(&self, instance: &str, kind: CycleKind) -> Option<FlightGuard> {
        let key = (instance.to_string(), kind);
        let mut running = self.running.lock().ok()?;
        if !running.insert(key.clone()) {
            return None;
        }
        Some(FlightGuard {
            key,
            running: self.running.clone(),
        })
    }

    pub fn is_running(&self, instance: &str, kind: CycleKind) -> bool {
        self.running
            .lock()
            .map(|running| running.contains(&(instance.to_string(), kind)))
            .unwrap_or(false)
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if let Ok(mut running) = self.running.lock() {
            running.remove(&self.key);
        }
    }
}
