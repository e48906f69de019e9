use std::io::Write;
use std::net::TcpListener;
use std::time::Duration;

use reqwest::Client;
use tempfile::NamedTempFile;
use tokio::time::{sleep, timeout};

/// Find an available port
fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// A config with the status endpoint on `port`, no network probes, and one
/// instance whose back-end does not answer.
fn daemon_config(port: u16) -> String {
    format!(
        r#"
[connectivity]
enabled = false

[probe]
enabled = false

[qbittorrent]
url = "http://127.0.0.1:1"
username = "admin"
password = "hunter2"

[server]
enabled = true
host = "127.0.0.1"
port = {}

[[instances]]
name = "tv"
kind = "sonarr"
uri = "http://127.0.0.1:1"
api_key = "sonarr-secret"
timeout_secs = 1
"#,
        port
    )
}

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

/// Spawn the daemon and return a handle
fn spawn_daemon(config_path: &std::path::Path) -> tokio::process::Child {
    tokio::process::Command::new(env!("CARGO_BIN_EXE_arrwarden"))
        .env("ARRWARDEN_CONFIG", config_path)
        .env("RUST_LOG", "error")
        .kill_on_drop(true)
        .spawn()
        .expect("Failed to spawn daemon")
}

/// Wait for the status endpoint to answer
async fn wait_for_daemon(port: u16, max_attempts: u32) -> bool {
    let client = Client::new();
    for _ in 0..max_attempts {
        if client
            .get(format!("http://127.0.0.1:{}/api/v1/health", port))
            .send()
            .await
            .is_ok()
        {
            return true;
        }
        sleep(Duration::from_millis(100)).await;
    }
    false
}

async fn get_json(port: u16, path: &str) -> serde_json::Value {
    Client::new()
        .get(format!("http://127.0.0.1:{}{}", port, path))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse JSON")
}

#[tokio::test]
async fn test_status_endpoint_reports_skipped_instance() {
    let port = get_available_port();
    let config = write_config(&daemon_config(port));
    let mut daemon = spawn_daemon(config.path());

    assert!(wait_for_daemon(port, 100).await, "Daemon did not start in time");

    let health = get_json(port, "/api/v1/health").await;
    assert_eq!(health["status"], "ok");

    let status = get_json(port, "/api/v1/status").await;
    assert_eq!(status["workers"].as_array().unwrap().len(), 0);
    assert_eq!(status["skipped"][0]["instance"], "tv");
    assert_eq!(status["restarts"], 0);

    daemon.kill().await.ok();
}

#[tokio::test]
async fn test_config_endpoint_hides_secrets() {
    let port = get_available_port();
    let config = write_config(&daemon_config(port));
    let mut daemon = spawn_daemon(config.path());

    assert!(wait_for_daemon(port, 100).await, "Daemon did not start in time");

    let json = get_json(port, "/api/v1/config").await;
    assert_eq!(json["server"]["port"], port);
    assert_eq!(json["qbittorrent"]["password_configured"], true);
    let text = json.to_string();
    assert!(!text.contains("hunter2"));
    assert!(!text.contains("sonarr-secret"));

    daemon.kill().await.ok();
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let port = get_available_port();
    let config = write_config(&daemon_config(port));
    let mut daemon = spawn_daemon(config.path());

    assert!(wait_for_daemon(port, 100).await, "Daemon did not start in time");

    let body = Client::new()
        .get(format!("http://127.0.0.1:{}/metrics", port))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("arrwarden_instances_skipped 1"));
    assert!(body.contains("arrwarden_connectivity_online 1"));

    daemon.kill().await.ok();
}

#[cfg(unix)]
#[tokio::test]
async fn test_sigterm_stops_daemon_cleanly() {
    let port = get_available_port();
    let config = write_config(&daemon_config(port));
    let mut daemon = spawn_daemon(config.path());

    assert!(wait_for_daemon(port, 100).await, "Daemon did not start in time");

    let pid = daemon.id().expect("daemon has a pid");
    let sent = std::process::Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .status()
        .expect("Failed to run kill");
    assert!(sent.success());

    let status = timeout(Duration::from_secs(10), daemon.wait())
        .await
        .expect("Daemon did not stop in time")
        .expect("Failed to wait for daemon");
    assert!(status.success());
}

#[tokio::test]
async fn test_missing_config_file_exits_with_error() {
    let result = timeout(
        Duration::from_secs(5),
        tokio::process::Command::new(env!("CARGO_BIN_EXE_arrwarden"))
            .env("ARRWARDEN_CONFIG", "/nonexistent/config.toml")
            .env("RUST_LOG", "error")
            .output(),
    )
    .await
    .expect("Command timed out")
    .expect("Failed to execute command");

    assert!(!result.status.success());
}

#[tokio::test]
async fn test_duplicate_instance_names_exit_with_error() {
    let config = write_config(
        r#"
[qbittorrent]
url = "http://127.0.0.1:1"

[[instances]]
name = "tv"
kind = "sonarr"
uri = "http://127.0.0.1:1"
api_key = "a"

[[instances]]
name = "tv"
kind = "radarr"
uri = "http://127.0.0.1:2"
api_key = "b"
"#,
    );

    let result = timeout(
        Duration::from_secs(5),
        tokio::process::Command::new(env!("CARGO_BIN_EXE_arrwarden"))
            .env("ARRWARDEN_CONFIG", config.path())
            .env("RUST_LOG", "error")
            .output(),
    )
    .await
    .expect("Command timed out")
    .expect("Failed to execute command");

    assert!(!result.status.success());
}
