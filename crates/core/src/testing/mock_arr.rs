//! Mock Sonarr/Radarr back-end for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::arr::{
    ArrClient, ArrError, ArrKind, CommandHandle, CommandStatus, ImportMode, QueueEntry,
    SearchTarget, SystemStatus,
};

/// A recorded import request.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedScan {
    pub path: String,
    pub download_id: String,
    pub import_mode: ImportMode,
}

#[derive(Debug, Default)]
struct MockArrState {
    queue: Vec<QueueEntry>,
    commands: HashMap<i64, CommandStatus>,
    next_command_id: i64,
    searches: Vec<SearchTarget>,
    scans: Vec<RecordedScan>,
    blocklisted: Vec<i64>,
    command_names: Vec<String>,
}

/// Mock implementation of the ArrClient trait.
///
/// Commands start out `Started` and stay there until a test completes them
/// with [`MockArrClient::complete_command`] or changes the default status.
#[derive(Debug)]
pub struct MockArrClient {
    kind: ArrKind,
    state: Arc<RwLock<MockArrState>>,
    default_status: Arc<RwLock<CommandStatus>>,
    next_error: Arc<RwLock<Option<ArrError>>>,
    unavailable: Arc<RwLock<bool>>,
}

impl MockArrClient {
    pub fn new(kind: ArrKind) -> Self {
        Self {
            kind,
            state: Arc::new(RwLock::new(MockArrState {
                next_command_id: 1,
                ..Default::default()
            })),
            default_status: Arc::new(RwLock::new(CommandStatus::Started)),
            next_error: Arc::new(RwLock::new(None)),
            unavailable: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn add_queue_entry(&self, entry: QueueEntry) {
        self.state.write().await.queue.push(entry);
    }

    /// Status newly issued commands start with.
    pub async fn set_default_status(&self, status: CommandStatus) {
        *self.default_status.write().await = status;
    }

    pub async fn complete_command(&self, id: i64) {
        self.state
            .write()
            .await
            .commands
            .insert(id, CommandStatus::Completed);
    }

    /// Ids of commands that have not reached a terminal state.
    pub async fn running_commands(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .state
            .read()
            .await
            .commands
            .iter()
            .filter(|(_, status)| !status.is_terminal())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub async fn searches(&self) -> Vec<SearchTarget> {
        self.state.read().await.searches.clone()
    }

    pub async fn scans(&self) -> Vec<RecordedScan> {
        self.state.read().await.scans.clone()
    }

    /// Queue ids removed with blocklisting.
    pub async fn blocklisted(&self) -> Vec<i64> {
        self.state.read().await.blocklisted.clone()
    }

    /// Names of every command issued, in order.
    pub async fn command_names(&self) -> Vec<String> {
        self.state.read().await.command_names.clone()
    }

    /// Configure the next call to fail with the given error.
    pub async fn set_next_error(&self, error: ArrError) {
        *self.next_error.write().await = Some(error);
    }

    /// Make every call fail as if the back-end were down.
    pub async fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().await = unavailable;
    }

    async fn check(&self) -> Result<(), ArrError> {
        if *self.unavailable.read().await {
            return Err(ArrError::ConnectionFailed("mock back-end unavailable".to_string()));
        }
        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }
        Ok(())
    }

    async fn issue(&self, name: &str) -> CommandHandle {
        let status = *self.default_status.read().await;
        let mut state = self.state.write().await;
        let id = state.next_command_id;
        state.next_command_id += 1;
        state.commands.insert(id, status);
        state.command_names.push(name.to_string());
        CommandHandle {
            id,
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl ArrClient for MockArrClient {
    fn name(&self) -> &str {
        "mock"
    }

    fn kind(&self) -> ArrKind {
        self.kind
    }

    async fn system_status(&self) -> Result<SystemStatus, ArrError> {
        self.check().await?;
        Ok(SystemStatus {
            app_name: Some(self.kind.as_str().to_string()),
            version: "4.0.0".to_string(),
        })
    }

    async fn queue(&self) -> Result<Vec<QueueEntry>, ArrError> {
        self.check().await?;
        Ok(self.state.read().await.queue.clone())
    }

    async fn remove_queue_item(
        &self,
        queue_id: i64,
        _remove_from_client: bool,
        blocklist: bool,
    ) -> Result<(), ArrError> {
        self.check().await?;
        let mut state = self.state.write().await;
        let before = state.queue.len();
        state.queue.retain(|e| e.id != queue_id);
        if state.queue.len() == before {
            return Err(ArrError::Rejected {
                status: 404,
                message: format!("queue item {} not found", queue_id),
            });
        }
        if blocklist {
            state.blocklisted.push(queue_id);
        }
        Ok(())
    }

    async fn downloaded_scan(
        &self,
        path: &str,
        download_id: &str,
        import_mode: ImportMode,
    ) -> Result<CommandHandle, ArrError> {
        self.check().await?;
        self.state.write().await.scans.push(RecordedScan {
            path: path.to_string(),
            download_id: download_id.to_string(),
            import_mode,
        });
        Ok(self.issue(self.kind.downloaded_scan_command()).await)
    }

    async fn rss_sync(&self) -> Result<CommandHandle, ArrError> {
        self.check().await?;
        Ok(self.issue("RssSync").await)
    }

    async fn refresh_monitored_downloads(&self) -> Result<CommandHandle, ArrError> {
        self.check().await?;
        Ok(self.issue("RefreshMonitoredDownloads").await)
    }

    async fn search(&self, target: &SearchTarget) -> Result<CommandHandle, ArrError> {
        self.check().await?;
        self.state.write().await.searches.push(target.clone());
        let name = match (self.kind, target) {
            (ArrKind::Sonarr, SearchTarget::Items(_)) => "EpisodeSearch",
            (ArrKind::Sonarr, SearchTarget::Parent(_)) => "SeriesSearch",
            (ArrKind::Radarr, _) => "MoviesSearch",
        };
        Ok(self.issue(name).await)
    }

    async fn command_status(&self, command_id: i64) -> Result<CommandStatus, ArrError> {
        self.check().await?;
        Ok(self
            .state
            .read()
            .await
            .commands
            .get(&command_id)
            .copied()
            .unwrap_or(CommandStatus::Missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[tokio::test]
    async fn test_commands_run_until_completed() {
        let arr = MockArrClient::new(ArrKind::Sonarr);
        let handle = arr.search(&SearchTarget::Items(vec![1])).await.unwrap();
        assert_eq!(handle.name, "EpisodeSearch");
        assert_eq!(arr.command_status(handle.id).await.unwrap(), CommandStatus::Started);

        arr.complete_command(handle.id).await;
        assert_eq!(arr.command_status(handle.id).await.unwrap(), CommandStatus::Completed);
        assert_eq!(arr.command_status(99).await.unwrap(), CommandStatus::Missing);
    }

    #[tokio::test]
    async fn test_blocklist_removes_queue_entry() {
        let arr = MockArrClient::new(ArrKind::Radarr);
        arr.add_queue_entry(fixtures::queue_entry(7, "abc", None)).await;

        arr.remove_queue_item(7, false, true).await.unwrap();
        assert!(arr.queue().await.unwrap().is_empty());
        assert_eq!(arr.blocklisted().await, vec![7]);
        assert!(arr.remove_queue_item(7, false, true).await.is_err());
    }
}
