//! Ombi request feed.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{RequestError, RequestService, RequestedMedia};
use crate::arr::ArrKind;
use crate::config::OmbiConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OmbiRequest {
    #[serde(default)]
    pub denied: Option<bool>,
    #[serde(default)]
    pub child_requests: Vec<OmbiChildRequest>,
    pub imdb_id: Option<String>,
    pub the_movie_db_id: Option<i64>,
    pub tv_db_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct OmbiChildRequest {
    #[serde(default)]
    pub denied: Option<bool>,
}

/// Ombi API client.
pub struct OmbiClient {
    client: Client,
    base_url: String,
    api_key: String,
    approved_only: bool,
}

impl OmbiClient {
    pub fn new(config: &OmbiConfig, timeout: Duration) -> Result<Self, RequestError> {
        if config.api_key.is_empty() {
            return Err(RequestError::NotConfigured(
                "Ombi API key is required".to_string(),
            ));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: config.uri.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            approved_only: config.approved_only,
        })
    }
}

/// Convert Ombi requests, dropping denied ones when `approved_only` is set.
pub(crate) fn wanted_media(
    requests: &[OmbiRequest],
    kind: ArrKind,
    approved_only: bool,
) -> Vec<RequestedMedia> {
    requests
        .iter()
        .filter(|r| {
            if !approved_only {
                return true;
            }
            match kind {
                ArrKind::Radarr => r.denied != Some(true),
                // A series with any denied season is skipped entirely.
                ArrKind::Sonarr => !r.child_requests.iter().any(|c| c.denied == Some(true)),
            }
        })
        .map(|r| RequestedMedia {
            tmdb_id: match kind {
                ArrKind::Radarr => r.the_movie_db_id,
                ArrKind::Sonarr => None,
            },
            tvdb_id: match kind {
                ArrKind::Sonarr => r.tv_db_id,
                ArrKind::Radarr => None,
            },
            imdb_id: r.imdb_id.clone().filter(|id| !id.is_empty()),
        })
        .collect()
}

#[async_trait]
impl RequestService for OmbiClient {
    fn name(&self) -> &str {
        "ombi"
    }

    async fn requested(&self, kind: ArrKind) -> Result<Vec<RequestedMedia>, RequestError> {
        let endpoint = match kind {
            ArrKind::Sonarr => "/api/v1/Request/tvlite",
            ArrKind::Radarr => "/api/v1/Request/movie",
        };
        let response = self
            .client
            .get(format!("{}{}", self.base_url, endpoint))
            .header("ApiKey", &self.api_key)
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

        let requests: Vec<OmbiRequest> = response
            .json()
            .await
            .map_err(|e| RequestError::InvalidResponse(format!("request list: {}", e)))?;
        let media = wanted_media(&requests, kind, self.approved_only);
        debug!("Ombi: {} requests, {} wanted for {}", requests.len(), media.len(), kind);
        Ok(media)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denied_movies_skipped_when_approved_only() {
        let requests: Vec<OmbiRequest> = serde_json::from_str(
            r#"[
                {"denied": true, "theMovieDbId": 1, "imdbId": "tt1"},
                {"denied": false, "theMovieDbId": 2, "imdbId": ""}
            ]"#,
        )
        .unwrap();

        let media = wanted_media(&requests, ArrKind::Radarr, true);
        assert_eq!(media.len(), 1);
        assert_eq!(media[0].tmdb_id, Some(2));
        assert_eq!(media[0].imdb_id, None);

        assert_eq!(wanted_media(&requests, ArrKind::Radarr, false).len(), 2);
    }

    #[test]
    fn test_partially_denied_series_skipped() {
        let requests: Vec<OmbiRequest> = serde_json::from_str(
            r#"[
                {"tvDbId": 7, "childRequests": [{"denied": false}, {"denied": true}]},
                {"tvDbId": 8, "childRequests": [{"denied": false}]}
            ]"#,
        )
        .unwrap();

        let media = wanted_media(&requests, ArrKind::Sonarr, true);
        assert_eq!(media.len(), 1);
        assert_eq!(media[0].tvdb_id, Some(8));
        assert_eq!(media[0].tmdb_id, None);
    }
}
