//! Types for request services.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::arr::ArrKind;

/// Errors from a request service.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Request service rejected call (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for RequestError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RequestError::Timeout
        } else if e.is_connect() {
            RequestError::ConnectionFailed(e.to_string())
        } else if e.is_decode() {
            RequestError::InvalidResponse(e.to_string())
        } else {
            RequestError::ConnectionFailed(e.to_string())
        }
    }
}

/// External ids of one requested series or movie.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestedMedia {
    pub tmdb_id: Option<i64>,
    pub tvdb_id: Option<i64>,
    pub imdb_id: Option<String>,
}

/// A source of user media requests.
#[async_trait]
pub trait RequestService: Send + Sync {
    /// Service name for logging.
    fn name(&self) -> &str;

    /// Pending requests for media handled by a back-end of `kind`.
    async fn requested(&self, kind: ArrKind) -> Result<Vec<RequestedMedia>, RequestError>;
}
