//! Internet connectivity monitor.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::RuntimeHandle;
use crate::config::ConnectivityConfig;
use crate::metrics;

/// Whether any target accepts a TCP connection within `timeout`.
pub async fn probe_targets(targets: &[String], timeout: Duration) -> bool {
    for target in targets {
        match tokio::time::timeout(timeout, TcpStream::connect(target.as_str())).await {
            Ok(Ok(_)) => return true,
            Ok(Err(e)) => debug!(target = %target, "Connectivity probe failed: {}", e),
            Err(_) => debug!(target = %target, "Connectivity probe timed out"),
        }
    }
    false
}

/// Spawn the loop that keeps the online flag current.
///
/// Returns `None` when the monitor is disabled; the flag then stays online.
pub fn spawn_connectivity_monitor(
    config: &ConnectivityConfig,
    handle: Arc<RuntimeHandle>,
) -> Option<JoinHandle<()>> {
    if !config.enabled || config.targets.is_empty() {
        info!("Connectivity monitor disabled");
        metrics::CONNECTIVITY_ONLINE.set(1);
        return None;
    }

    let targets = config.targets.clone();
    let interval = Duration::from_secs(config.interval_secs.max(1));
    let timeout = Duration::from_millis(config.timeout_ms.max(1));
    let ctx = handle.context();

    Some(tokio::spawn(async move {
        info!(targets = ?targets, "Connectivity monitor started");
        loop {
            let online = probe_targets(&targets, timeout).await;
            metrics::CONNECTIVITY_ONLINE.set(if online { 1 } else { 0 });
            if handle.set_online(online) {
                if online {
                    info!("Connectivity restored, resuming cycles");
                } else {
                    warn!("No connectivity target reachable, pausing cycles");
                }
            }

            tokio::select! {
                _ = ctx.shutdown_requested() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        debug!("Connectivity monitor stopped");
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_probe_targets_reachable_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        assert!(probe_targets(&[addr], Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_probe_targets_unreachable() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        assert!(!probe_targets(&[addr], Duration::from_millis(200)).await);
        assert!(!probe_targets(&[], Duration::from_millis(200)).await);
    }

    #[tokio::test]
    async fn test_monitor_marks_offline_and_stops_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let handle = Arc::new(RuntimeHandle::new());
        let ctx = handle.context();
        let config = ConnectivityConfig {
            enabled: true,
            targets: vec![addr],
            interval_secs: 1,
            timeout_ms: 100,
        };
        let task = spawn_connectivity_monitor(&config, handle.clone()).unwrap();

        for _ in 0..50 {
            if !ctx.is_online() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!ctx.is_online());

        handle.request_shutdown();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }
}
