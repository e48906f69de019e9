//! qBittorrent torrent client implementation (Web API v2).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::QBittorrentConfig;

use super::{
    TorrentClient, TorrentClientError, TorrentFile, TorrentFilters, TorrentInfo, TorrentState,
    TrackerEntry, TrackerStatus,
};

/// qBittorrent reports this ETA for "infinite".
const QB_INFINITE_ETA: i64 = 8_640_000;

/// qBittorrent client implementation.
pub struct QBittorrentClient {
    client: Client,
    config: QBittorrentConfig,
    /// Set once the cookie jar holds a valid session (cleared on 403).
    session: Arc<RwLock<Option<String>>>,
}

impl QBittorrentClient {
    /// Create a new qBittorrent client.
    pub fn new(config: QBittorrentConfig) -> Result<Self, TorrentClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .cookie_store(true)
            .build()
            .map_err(|e| TorrentClientError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            config,
            session: Arc::new(RwLock::new(None)),
        })
    }

    /// Get the base URL without trailing slash.
    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    /// Login and store session cookie.
    async fn login(&self) -> Result<(), TorrentClientError> {
        let url = format!("{}/api/v2/auth/login", self.base_url());

        let params = [
            ("username", self.config.username.as_str()),
            ("password", self.config.password.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if body.contains("Ok.") {
            debug!("qBittorrent login successful");
            let mut session = self.session.write().await;
            *session = Some("authenticated".to_string());
            Ok(())
        } else if body.contains("Fails.") || status.as_u16() == 403 {
            Err(TorrentClientError::AuthenticationFailed(
                "Invalid credentials".to_string(),
            ))
        } else {
            Err(TorrentClientError::AuthenticationFailed(format!(
                "Unexpected response: {}",
                body.chars().take(100).collect::<String>()
            )))
        }
    }

    /// Ensure we have a valid session, logging in if needed.
    async fn ensure_authenticated(&self) -> Result<(), TorrentClientError> {
        let session = self.session.read().await;
        if session.is_some() {
            return Ok(());
        }
        drop(session);
        self.login().await
    }

    /// Send an authenticated request, re-authenticating once on 403.
    async fn execute<F>(&self, build: F) -> Result<String, TorrentClientError>
    where
        F: Fn() -> RequestBuilder,
    {
        self.ensure_authenticated().await?;

        let mut response = build().send().await.map_err(map_reqwest_error)?;

        if response.status().as_u16() == 403 {
            warn!("qBittorrent session expired, re-authenticating");
            {
                let mut session = self.session.write().await;
                *session = None;
            }
            self.login().await?;
            response = build().send().await.map_err(map_reqwest_error)?;
        }

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(TorrentClientError::TorrentNotFound(format!(
                "HTTP {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(TorrentClientError::ApiError(format!("HTTP {}", status)));
        }

        response
            .text()
            .await
            .map_err(|e| TorrentClientError::ApiError(e.to_string()))
    }

    /// Authenticated GET, parsed as JSON.
    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, TorrentClientError> {
        let url = format!("{}{}", self.base_url(), endpoint);
        let body = self.execute(|| self.client.get(&url)).await?;
        serde_json::from_str(&body)
            .map_err(|e| TorrentClientError::ApiError(format!("Failed to parse response: {}", e)))
    }

    /// Authenticated POST with form data.
    async fn post_form(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<String, TorrentClientError> {
        let url = format!("{}{}", self.base_url(), endpoint);
        self.execute(|| self.client.post(&url).form(params)).await
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TorrentClientError {
    if e.is_timeout() {
        TorrentClientError::Timeout
    } else if e.is_connect() {
        TorrentClientError::ConnectionFailed(e.to_string())
    } else {
        TorrentClientError::ApiError(e.to_string())
    }
}

/// qBittorrent torrent info response.
#[derive(Debug, Deserialize)]
struct QBTorrentInfo {
    hash: String,
    name: String,
    state: String,
    progress: f64,
    size: i64,
    dlspeed: i64,
    upspeed: i64,
    ratio: f64,
    #[serde(default)]
    seeding_time: i64,
    eta: i64,
    added_on: i64,
    completion_on: i64,
    #[serde(default)]
    last_activity: i64,
    save_path: String,
    #[serde(default)]
    content_path: String,
    category: String,
    #[serde(default)]
    tracker: String,
    up_limit: i64,
    dl_limit: i64,
    #[serde(default = "no_limit_ratio")]
    ratio_limit: f64,
    #[serde(default = "no_limit")]
    seeding_time_limit: i64,
}

fn no_limit_ratio() -> f64 {
    -2.0
}

fn no_limit() -> i64 {
    -2
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

impl QBTorrentInfo {
    fn into_torrent_info(self) -> TorrentInfo {
        TorrentInfo {
            hash: self.hash.to_lowercase(),
            name: self.name,
            state: parse_qb_state(&self.state),
            progress: self.progress,
            size_bytes: self.size.max(0) as u64,
            download_speed: self.dlspeed.max(0) as u64,
            upload_speed: self.upspeed.max(0) as u64,
            ratio: self.ratio,
            seeding_time_secs: self.seeding_time.max(0) as u64,
            eta_secs: match self.eta {
                eta if eta >= QB_INFINITE_ETA => Some(u64::MAX),
                eta if eta > 0 => Some(eta as u64),
                _ => None,
            },
            added_at: timestamp_to_datetime(self.added_on),
            completed_at: timestamp_to_datetime(self.completion_on),
            last_activity_at: timestamp_to_datetime(self.last_activity),
            save_path: non_empty(self.save_path),
            content_path: non_empty(self.content_path),
            category: non_empty(self.category),
            tracker: non_empty(self.tracker),
            upload_limit: self.up_limit.max(0) as u64,
            download_limit: self.dl_limit.max(0) as u64,
            ratio_limit: self.ratio_limit,
            seeding_time_limit_mins: self.seeding_time_limit,
        }
    }
}

/// qBittorrent file entry (`/torrents/files`).
#[derive(Debug, Deserialize)]
struct QBTorrentFile {
    /// Only reported by qBittorrent >= 4.2.
    #[serde(default)]
    index: Option<usize>,
    name: String,
    size: i64,
    progress: f64,
    priority: u8,
}

/// qBittorrent tracker entry (`/torrents/trackers`).
#[derive(Debug, Deserialize)]
struct QBTracker {
    url: String,
    status: i64,
    #[serde(default)]
    msg: String,
}

/// Parse qBittorrent state string to TorrentState.
fn parse_qb_state(state: &str) -> TorrentState {
    match state {
        "downloading" | "forcedDL" | "allocating" => TorrentState::Downloading,
        "metaDL" | "forcedMetaDL" => TorrentState::FetchingMetadata,
        "stalledDL" => TorrentState::StalledDownload,
        "pausedDL" | "stoppedDL" => TorrentState::PausedDownload,
        "queuedDL" => TorrentState::QueuedDownload,
        "uploading" | "forcedUP" => TorrentState::Seeding,
        "stalledUP" => TorrentState::StalledUpload,
        "pausedUP" | "stoppedUP" => TorrentState::PausedUpload,
        "queuedUP" => TorrentState::QueuedUpload,
        "checkingDL" | "checkingUP" | "checkingResumeData" => TorrentState::Checking,
        "moving" => TorrentState::Moving,
        "missingFiles" => TorrentState::MissingFiles,
        "error" => TorrentState::Error,
        _ => TorrentState::Unknown,
    }
}

fn parse_tracker_status(status: i64) -> TrackerStatus {
    match status {
        1 => TrackerStatus::NotContacted,
        2 => TrackerStatus::Working,
        3 => TrackerStatus::Updating,
        4 => TrackerStatus::NotWorking,
        _ => TrackerStatus::Disabled,
    }
}

/// Convert Unix timestamp to DateTime<Utc>.
fn timestamp_to_datetime(ts: i64) -> Option<DateTime<Utc>> {
    if ts > 0 {
        Utc.timestamp_opt(ts, 0).single()
    } else {
        None
    }
}

#[async_trait]
impl TorrentClient for QBittorrentClient {
    fn name(&self) -> &str {
        "qbittorrent"
    }

    async fn list_torrents(
        &self,
        filters: &TorrentFilters,
    ) -> Result<Vec<TorrentInfo>, TorrentClientError> {
        let mut endpoint = "/api/v2/torrents/info".to_string();
        if let Some(category) = &filters.category {
            endpoint.push_str(&format!("?category={}", urlencoding::encode(category)));
        }

        let torrents: Vec<QBTorrentInfo> = self.get_json(&endpoint).await?;
        Ok(torrents.into_iter().map(|t| t.into_torrent_info()).collect())
    }

    async fn list_files(&self, hash: &str) -> Result<Vec<TorrentFile>, TorrentClientError> {
        let endpoint = format!("/api/v2/torrents/files?hash={}", hash.to_lowercase());
        let files: Vec<QBTorrentFile> = self.get_json(&endpoint).await?;

        Ok(files
            .into_iter()
            .enumerate()
            .map(|(position, f)| TorrentFile {
                index: f.index.unwrap_or(position),
                name: f.name,
                size_bytes: f.size.max(0) as u64,
                progress: f.progress,
                priority: f.priority,
            })
            .collect())
    }

    async fn list_trackers(&self, hash: &str) -> Result<Vec<TrackerEntry>, TorrentClientError> {
        let endpoint = format!("/api/v2/torrents/trackers?hash={}", hash.to_lowercase());
        let trackers: Vec<QBTracker> = self.get_json(&endpoint).await?;

        Ok(trackers
            .into_iter()
            .map(|t| TrackerEntry {
                url: t.url,
                status: parse_tracker_status(t.status),
                message: t.msg,
            })
            .collect())
    }

    async fn remove_torrent(&self, hash: &str, delete_files: bool) -> Result<(), TorrentClientError> {
        let hash_lower = hash.to_lowercase();
        let delete_str = if delete_files { "true" } else { "false" };

        self.post_form(
            "/api/v2/torrents/delete",
            &[("hashes", &hash_lower), ("deleteFiles", delete_str)],
        )
        .await?;

        Ok(())
    }

    async fn resume_torrent(&self, hash: &str) -> Result<(), TorrentClientError> {
        let hash_lower = hash.to_lowercase();
        match self
            .post_form("/api/v2/torrents/resume", &[("hashes", &hash_lower)])
            .await
        {
            // qBittorrent 5 renamed resume to start
            Err(TorrentClientError::TorrentNotFound(_)) => {
                self.post_form("/api/v2/torrents/start", &[("hashes", &hash_lower)])
                    .await?;
            }
            other => {
                other?;
            }
        }
        Ok(())
    }

    async fn recheck_torrent(&self, hash: &str) -> Result<(), TorrentClientError> {
        let hash_lower = hash.to_lowercase();
        self.post_form("/api/v2/torrents/recheck", &[("hashes", &hash_lower)])
            .await?;
        Ok(())
    }

    async fn set_category(&self, hash: &str, category: &str) -> Result<(), TorrentClientError> {
        let hash_lower = hash.to_lowercase();
        self.post_form(
            "/api/v2/torrents/setCategory",
            &[("hashes", &hash_lower), ("category", category)],
        )
        .await?;
        Ok(())
    }

    async fn remove_trackers(
        &self,
        hash: &str,
        urls: &[String],
    ) -> Result<(), TorrentClientError> {
        if urls.is_empty() {
            return Ok(());
        }
        let hash_lower = hash.to_lowercase();
        let joined = urls.join("|");
        self.post_form(
            "/api/v2/torrents/removeTrackers",
            &[("hash", &hash_lower), ("urls", &joined)],
        )
        .await?;
        Ok(())
    }

    async fn set_file_priority(
        &self,
        hash: &str,
        file_indices: &[usize],
        priority: u8,
    ) -> Result<(), TorrentClientError> {
        if file_indices.is_empty() {
            return Ok(());
        }
        let hash_lower = hash.to_lowercase();
        let ids = file_indices
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join("|");
        let priority_str = priority.to_string();
        self.post_form(
            "/api/v2/torrents/filePrio",
            &[("hash", &hash_lower), ("id", &ids), ("priority", &priority_str)],
        )
        .await?;
        Ok(())
    }

    async fn set_upload_limit(&self, hash: &str, limit: u64) -> Result<(), TorrentClientError> {
        let hash_lower = hash.to_lowercase();
        let limit_str = limit.to_string();
        self.post_form(
            "/api/v2/torrents/setUploadLimit",
            &[("hashes", &hash_lower), ("limit", &limit_str)],
        )
        .await?;
        Ok(())
    }

    async fn set_download_limit(&self, hash: &str, limit: u64) -> Result<(), TorrentClientError> {
        let hash_lower = hash.to_lowercase();
        let limit_str = limit.to_string();
        self.post_form(
            "/api/v2/torrents/setDownloadLimit",
            &[("hashes", &hash_lower), ("limit", &limit_str)],
        )
        .await?;
        Ok(())
    }

    async fn set_share_limits(
        &self,
        hash: &str,
        ratio: f64,
        seeding_time_mins: i64,
    ) -> Result<(), TorrentClientError> {
        let hash_lower = hash.to_lowercase();
        let ratio_str = ratio.to_string();
        let time_str = seeding_time_mins.to_string();
        self.post_form(
            "/api/v2/torrents/setShareLimits",
            &[
                ("hashes", &hash_lower),
                ("ratioLimit", &ratio_str),
                ("seedingTimeLimit", &time_str),
                ("inactiveSeedingTimeLimit", "-2"),
            ],
        )
        .await?;
        Ok(())
    }
}
