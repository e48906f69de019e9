//! Per-instance rate and concurrency governor.
//!
//! Every outbound call of an instance passes [`Governor::pace`], which keeps
//! a minimum spacing between calls. Search dispatch additionally holds a
//! [`SearchPermit`] for as long as the back-end command is running.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::{Duration, Instant};

/// Governor status for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct GovernorStatus {
    pub search_limit: usize,
    pub searches_in_flight: usize,
    pub spacing_ms: u64,
}

/// Budget slot for one in-flight search. Released on drop.
#[derive(Debug)]
pub struct SearchPermit {
    _permit: OwnedSemaphorePermit,
}

/// Spacing gate plus search semaphore for one instance.
pub struct Governor {
    search_limit: usize,
    spacing: Duration,
    semaphore: Arc<Semaphore>,
    last_call: Mutex<Option<Instant>>,
}

impl Governor {
    pub fn new(search_limit: usize, spacing: Duration) -> Self {
        Self {
            search_limit,
            spacing,
            semaphore: Arc::new(Semaphore::new(search_limit)),
            last_call: Mutex::new(None),
        }
    }

    /// Wait until at least `spacing` has passed since the previous call.
    ///
    /// Callers are served one at a time, so concurrent callers are spread
    /// out instead of all firing when the gate opens.
    pub async fn pace(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(last) = *last_call {
            tokio::time::sleep_until(last + self.spacing).await;
        }
        *last_call = Some(Instant::now());
    }

    /// Wait for a free search slot.
    pub async fn acquire_search(&self) -> Option<SearchPermit> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .ok()
            .map(|permit| SearchPermit { _permit: permit })
    }

    pub fn in_flight(&self) -> usize {
        self.search_limit
            .saturating_sub(self.semaphore.available_permits())
    }

    pub fn status(&self) -> GovernorStatus {
        GovernorStatus {
            search_limit: self.search_limit,
            searches_in_flight: self.in_flight(),
            spacing_ms: self.spacing.as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[tokio::test(start_paused = true)]
    async fn test_pace_spaces_calls() {
        let governor = Governor::new(1, Duration::from_millis(500));
        let start = Instant::now();

        governor.pace().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        governor.pace().await;
        assert!(start.elapsed() >= Duration::from_millis(500));

        tokio::time::sleep(Duration::from_secs(2)).await;
        let before = Instant::now();
        governor.pace().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_search_budget_is_bounded() {
        let governor = Governor::new(2, Duration::ZERO);

        let first = governor.acquire_search().await.unwrap();
        let _second = governor.acquire_search().await.unwrap();
        assert_eq!(governor.in_flight(), 2);

        let mut waiting = task::spawn(governor.acquire_search());
        assert_pending!(waiting.poll());

        drop(first);
        assert!(waiting.is_woken());
        let third = assert_ready!(waiting.poll());
        assert!(third.is_some());
        assert_eq!(governor.in_flight(), 2);
    }

    #[test]
    fn test_status() {
        let governor = Governor::new(3, Duration::from_millis(250));
        let status = governor.status();
        assert_eq!(status.search_limit, 3);
        assert_eq!(status.searches_in_flight, 0);
        assert_eq!(status.spacing_ms, 250);
    }
}
