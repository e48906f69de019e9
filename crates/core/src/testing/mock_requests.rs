//! Mock request service for testing.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::arr::ArrKind;
use crate::requests::{RequestError, RequestService, RequestedMedia};

/// Mock implementation of the RequestService trait.
#[derive(Debug)]
pub struct MockRequestService {
    name: String,
    requested: Arc<RwLock<Vec<RequestedMedia>>>,
    next_error: Arc<RwLock<Option<RequestError>>>,
    calls: Arc<RwLock<Vec<ArrKind>>>,
}

impl MockRequestService {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requested: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn set_requested(&self, media: Vec<RequestedMedia>) {
        *self.requested.write().await = media;
    }

    pub async fn set_next_error(&self, error: RequestError) {
        *self.next_error.write().await = Some(error);
    }

    /// Back-end kinds the service was queried for.
    pub async fn calls(&self) -> Vec<ArrKind> {
        self.calls.read().await.clone()
    }
}

#[async_trait]
impl RequestService for MockRequestService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn requested(&self, kind: ArrKind) -> Result<Vec<RequestedMedia>, RequestError> {
        self.calls.write().await.push(kind);
        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }
        Ok(self.requested.read().await.clone())
    }
}
