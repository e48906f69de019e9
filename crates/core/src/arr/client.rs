//! HTTP implementation of [`ArrClient`] for Sonarr and Radarr (API v3).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{
    ArrClient, ArrError, ArrKind, CommandHandle, CommandStatus, ImportMode, QueueEntry,
    SearchTarget, SystemStatus,
};

/// Queue page size; queues are walked until a short page is returned.
const QUEUE_PAGE_SIZE: usize = 200;

/// Back-end HTTP client.
pub struct ArrHttpClient {
    client: Client,
    name: String,
    kind: ArrKind,
    base_url: String,
    api_key: String,
}

impl ArrHttpClient {
    /// Create a client for one instance.
    pub fn new(
        name: impl Into<String>,
        kind: ArrKind,
        base_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ArrError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ArrError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            name: name.into(),
            kind,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/api/v3{}", self.base_url, endpoint)
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, ArrError> {
        let response = request
            .header("X-Api-Key", &self.api_key)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ArrError::Rejected {
                status: status.as_u16(),
                message: message.chars().take(200).collect(),
            });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ArrError> {
        let response = self.send(self.client.get(self.url(endpoint))).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ArrError::InvalidResponse(e.to_string()))
    }

    /// POST `/command` with the given body.
    async fn command(&self, body: Value) -> Result<CommandHandle, ArrError> {
        debug!(instance = %self.name, body = %body, "Posting command");
        let response = self
            .send(self.client.post(self.url("/command")).json(&body))
            .await?;
        let parsed: CommandResponse = response
            .json()
            .await
            .map_err(|e| ArrError::InvalidResponse(e.to_string()))?;

        let fallback = body
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(CommandHandle {
            id: parsed.id,
            name: parsed.name.unwrap_or(fallback),
        })
    }

    /// JSON body of a search command for this back-end kind.
    fn search_body(&self, target: &SearchTarget) -> Value {
        match (self.kind, target) {
            (ArrKind::Sonarr, SearchTarget::Items(ids)) => {
                json!({ "name": "EpisodeSearch", "episodeIds": ids })
            }
            (ArrKind::Sonarr, SearchTarget::Parent(series_id)) => {
                json!({ "name": "SeriesSearch", "seriesId": series_id })
            }
            (ArrKind::Radarr, SearchTarget::Items(ids)) => {
                json!({ "name": "MoviesSearch", "movieIds": ids })
            }
            (ArrKind::Radarr, SearchTarget::Parent(movie_id)) => {
                json!({ "name": "MoviesSearch", "movieIds": [movie_id] })
            }
        }
    }

    fn queue_query(&self, page: usize) -> String {
        let unknown = match self.kind {
            ArrKind::Sonarr => "includeUnknownSeriesItems",
            ArrKind::Radarr => "includeUnknownMovieItems",
        };
        format!(
            "/queue?page={}&pageSize={}&{}=true",
            page, QUEUE_PAGE_SIZE, unknown
        )
    }
}

fn map_reqwest_error(e: reqwest::Error) -> ArrError {
    if e.is_timeout() {
        ArrError::Timeout
    } else if e.is_connect() {
        ArrError::ConnectionFailed(e.to_string())
    } else {
        ArrError::Internal(e.to_string())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommandResponse {
    id: i64,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommandStatusResponse {
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SystemStatusResponse {
    #[serde(default)]
    app_name: Option<String>,
    version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueuePage {
    #[serde(default)]
    records: Vec<QueueRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueueRecord {
    id: i64,
    #[serde(default)]
    download_id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    episode_id: Option<i64>,
    #[serde(default)]
    series_id: Option<i64>,
    #[serde(default)]
    movie_id: Option<i64>,
    #[serde(default)]
    tracked_download_state: Option<String>,
}

impl From<QueueRecord> for QueueEntry {
    fn from(record: QueueRecord) -> Self {
        QueueEntry {
            id: record.id,
            download_id: record.download_id.map(|d| d.to_lowercase()),
            title: record.title,
            episode_id: record.episode_id,
            series_id: record.series_id,
            movie_id: record.movie_id,
            tracked_download_state: record.tracked_download_state,
        }
    }
}

#[async_trait]
impl ArrClient for ArrHttpClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ArrKind {
        self.kind
    }

    async fn system_status(&self) -> Result<SystemStatus, ArrError> {
        let status: SystemStatusResponse = self.get_json("/system/status").await?;
        Ok(SystemStatus {
            app_name: status.app_name,
            version: status.version,
        })
    }

    async fn queue(&self) -> Result<Vec<QueueEntry>, ArrError> {
        let mut entries = Vec::new();
        let mut page = 1;
        loop {
            let result: QueuePage = self.get_json(&self.queue_query(page)).await?;
            let count = result.records.len();
            entries.extend(result.records.into_iter().map(QueueEntry::from));
            if count < QUEUE_PAGE_SIZE {
                break;
            }
            page += 1;
        }
        Ok(entries)
    }

    async fn remove_queue_item(
        &self,
        queue_id: i64,
        remove_from_client: bool,
        blocklist: bool,
    ) -> Result<(), ArrError> {
        let url = format!(
            "{}?removeFromClient={}&blocklist={}",
            self.url(&format!("/queue/{}", queue_id)),
            remove_from_client,
            blocklist
        );
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn downloaded_scan(
        &self,
        path: &str,
        download_id: &str,
        import_mode: ImportMode,
    ) -> Result<CommandHandle, ArrError> {
        self.command(json!({
            "name": self.kind.downloaded_scan_command(),
            "path": path,
            "downloadClientId": download_id.to_uppercase(),
            "importMode": import_mode.as_str(),
        }))
        .await
    }

    async fn rss_sync(&self) -> Result<CommandHandle, ArrError> {
        self.command(json!({ "name": "RssSync" })).await
    }

    async fn refresh_monitored_downloads(&self) -> Result<CommandHandle, ArrError> {
        self.command(json!({ "name": "RefreshMonitoredDownloads" }))
            .await
    }

    async fn search(&self, target: &SearchTarget) -> Result<CommandHandle, ArrError> {
        self.command(self.search_body(target)).await
    }

    async fn command_status(&self, command_id: i64) -> Result<CommandStatus, ArrError> {
        match self
            .get_json::<CommandStatusResponse>(&format!("/command/{}", command_id))
            .await
        {
            Ok(response) => Ok(response
                .status
                .as_deref()
                .map(CommandStatus::parse)
                .unwrap_or(CommandStatus::Missing)),
            Err(ArrError::Rejected { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Ok(CommandStatus::Missing)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(kind: ArrKind) -> ArrHttpClient {
        ArrHttpClient::new(
            "test",
            kind,
            "http://127.0.0.1:8989/",
            "key",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_url_building() {
        let c = client(ArrKind::Sonarr);
        assert_eq!(c.url("/queue"), "http://127.0.0.1:8989/api/v3/queue");
        assert_eq!(
            c.queue_query(2),
            "/queue?page=2&pageSize=200&includeUnknownSeriesItems=true"
        );
        assert!(client(ArrKind::Radarr)
            .queue_query(1)
            .contains("includeUnknownMovieItems"));
    }

    #[test]
    fn test_search_bodies() {
        let sonarr = client(ArrKind::Sonarr);
        assert_eq!(
            sonarr.search_body(&SearchTarget::Items(vec![1, 2])),
            json!({ "name": "EpisodeSearch", "episodeIds": [1, 2] })
        );
        assert_eq!(
            sonarr.search_body(&SearchTarget::Parent(7)),
            json!({ "name": "SeriesSearch", "seriesId": 7 })
        );

        let radarr = client(ArrKind::Radarr);
        assert_eq!(
            radarr.search_body(&SearchTarget::Parent(3)),
            json!({ "name": "MoviesSearch", "movieIds": [3] })
        );
    }

    #[test]
    fn test_queue_record_conversion() {
        let json = r#"{
            "page": 1,
            "totalRecords": 1,
            "records": [{
                "id": 55,
                "downloadId": "ABCDEF0123",
                "title": "Show.S01E01",
                "episodeId": 12,
                "seriesId": 3,
                "trackedDownloadState": "importPending"
            }]
        }"#;
        let page: QueuePage = serde_json::from_str(json).unwrap();
        let entry: QueueEntry = page.records.into_iter().next().unwrap().into();
        assert_eq!(entry.id, 55);
        assert_eq!(entry.download_id.as_deref(), Some("abcdef0123"));
        assert_eq!(entry.episode_id, Some(12));
        assert!(entry.movie_id.is_none());
        assert!(entry.awaits_import());
    }
}
