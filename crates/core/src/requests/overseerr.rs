//! Overseerr request feed.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{RequestError, RequestService, RequestedMedia};
use crate::arr::ArrKind;
use crate::config::OverseerrConfig;

const PAGE_SIZE: usize = 100;

/// Media status values reported by Overseerr.
const STATUS_PROCESSING: i64 = 3;
const STATUS_AVAILABLE: i64 = 5;

#[derive(Debug, Deserialize)]
struct RequestPage {
    #[serde(default)]
    results: Vec<OverseerrRequest>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OverseerrRequest {
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    #[serde(default)]
    pub is4k: bool,
    #[serde(default)]
    pub media: OverseerrMedia,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OverseerrMedia {
    pub tmdb_id: Option<i64>,
    pub tvdb_id: Option<i64>,
    pub imdb_id: Option<String>,
    pub status: Option<i64>,
    pub status4k: Option<i64>,
}

/// Overseerr API client.
pub struct OverseerrClient {
    client: Client,
    base_url: String,
    api_key: String,
    approved_only: bool,
    is_4k: bool,
}

impl OverseerrClient {
    pub fn new(config: &OverseerrConfig, timeout: Duration) -> Result<Self, RequestError> {
        if config.api_key.is_empty() {
            return Err(RequestError::NotConfigured(
                "Overseerr API key is required".to_string(),
            ));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: config.uri.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            approved_only: config.approved_only,
            is_4k: config.is_4k,
        })
    }

    async fn page(&self, skip: usize) -> Result<Vec<OverseerrRequest>, RequestError> {
        let filter = if self.approved_only {
            "approved"
        } else {
            "unavailable"
        };
        let response = self
            .client
            .get(format!("{}/api/v1/request", self.base_url))
            .header("X-Api-Key", &self.api_key)
            .query(&[
                ("take", PAGE_SIZE.to_string()),
                ("skip", skip.to_string()),
                ("sort", "added".to_string()),
                ("filter", filter.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RequestError::Rejected {
                status: status.as_u16(),
                message: body,
            });
        }

        let page: RequestPage = response
            .json()
            .await
            .map_err(|e| RequestError::InvalidResponse(format!("request list: {}", e)))?;
        Ok(page.results)
    }
}

/// Keep requests for this back-end kind that are still wanted.
pub(crate) fn wanted_media(
    requests: &[OverseerrRequest],
    kind: ArrKind,
    approved_only: bool,
    is_4k: bool,
) -> Vec<RequestedMedia> {
    let media_type = match kind {
        ArrKind::Sonarr => "tv",
        ArrKind::Radarr => "movie",
    };

    requests
        .iter()
        .filter(|r| r.media_type.as_deref() == Some(media_type))
        .filter(|r| r.is4k == is_4k)
        .filter(|r| {
            let status = if is_4k { r.media.status4k } else { r.media.status };
            if approved_only {
                status == Some(STATUS_PROCESSING)
            } else {
                status != Some(STATUS_AVAILABLE)
            }
        })
        .map(|r| RequestedMedia {
            tmdb_id: r.media.tmdb_id,
            tvdb_id: r.media.tvdb_id,
            imdb_id: r.media.imdb_id.clone(),
        })
        .collect()
}

#[async_trait]
impl RequestService for OverseerrClient {
    fn name(&self) -> &str {
        "overseerr"
    }

    async fn requested(&self, kind: ArrKind) -> Result<Vec<RequestedMedia>, RequestError> {
        let mut all = Vec::new();
        let mut skip = 0;
        loop {
            let page = self.page(skip).await?;
            let count = page.len();
            all.extend(page);
            if count < PAGE_SIZE {
                break;
            }
            skip += count;
        }

        let media = wanted_media(&all, kind, self.approved_only, self.is_4k);
        debug!(
            "Overseerr: {} requests, {} wanted for {}",
            all.len(),
            media.len(),
            kind
        );
        Ok(media)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requests() -> Vec<OverseerrRequest> {
        serde_json::from_str(
            r#"[
                {"type": "tv", "is4k": false, "media": {"tvdbId": 1, "status": 3}},
                {"type": "tv", "is4k": false, "media": {"tvdbId": 2, "status": 5}},
                {"type": "tv", "is4k": false, "media": {"tvdbId": 3, "status": 2}},
                {"type": "tv", "is4k": true, "media": {"tvdbId": 4, "status4k": 3}},
                {"type": "movie", "is4k": false, "media": {"tmdbId": 10, "imdbId": "tt10", "status": 3}}
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_approved_only_keeps_processing() {
        let media = wanted_media(&requests(), ArrKind::Sonarr, true, false);
        assert_eq!(media.len(), 1);
        assert_eq!(media[0].tvdb_id, Some(1));
    }

    #[test]
    fn test_unfiltered_skips_available() {
        let media = wanted_media(&requests(), ArrKind::Sonarr, false, false);
        let ids: Vec<_> = media.iter().filter_map(|m| m.tvdb_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_4k_toggle_and_media_type() {
        let media = wanted_media(&requests(), ArrKind::Sonarr, true, true);
        assert_eq!(media.len(), 1);
        assert_eq!(media[0].tvdb_id, Some(4));

        let movies = wanted_media(&requests(), ArrKind::Radarr, true, false);
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].tmdb_id, Some(10));
        assert_eq!(movies[0].imdb_id.as_deref(), Some("tt10"));
    }
}
