//! Per-item search cooldowns.

use std::collections::HashMap;

use tokio::time::{Duration, Instant};

use super::CooldownKey;

/// Last dispatch time per key. In memory only.
#[derive(Debug)]
pub struct CooldownTracker {
    every: Duration,
    last: HashMap<CooldownKey, Instant>,
}

impl CooldownTracker {
    pub fn new(every: Duration) -> Self {
        Self {
            every,
            last: HashMap::new(),
        }
    }

    /// Whether `key` may be searched at `now`.
    pub fn is_ready(&self, key: CooldownKey, now: Instant) -> bool {
        match self.last.get(&key) {
            Some(last) => now.saturating_duration_since(*last) >= self.every,
            None => true,
        }
    }

    /// Claim `key` at `now` if it is ready.
    ///
    /// Returns the previous timestamp so a failed dispatch can be undone
    /// with [`CooldownTracker::restore`].
    pub fn reserve(&mut self, key: CooldownKey, now: Instant) -> Option<Option<Instant>> {
        if !self.is_ready(key, now) {
            return None;
        }
        Some(self.last.insert(key, now))
    }

    /// Put back the state from before a [`CooldownTracker::reserve`].
    pub fn restore(&mut self, key: CooldownKey, previous: Option<Instant>) {
        match previous {
            Some(at) => {
                self.last.insert(key, at);
            }
            None => {
                self.last.remove(&key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }

    /// Drop entries whose cooldown has run out.
    pub fn prune(&mut self, now: Instant) {
        let every = self.every;
        self.last
            .retain(|_, last| now.saturating_duration_since(*last) < every);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_blocks_until_elapsed() {
        let mut tracker = CooldownTracker::new(Duration::from_secs(1800));
        let key = CooldownKey::Item(1);

        assert!(tracker.reserve(key, Instant::now()).is_some());
        assert!(tracker.reserve(key, Instant::now()).is_none());

        tokio::time::advance(Duration::from_secs(1799)).await;
        assert!(!tracker.is_ready(key, Instant::now()));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(tracker.is_ready(key, Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_undoes_reservation() {
        let mut tracker = CooldownTracker::new(Duration::from_secs(60));
        let key = CooldownKey::Parent(3);

        let previous = tracker.reserve(key, Instant::now()).unwrap();
        assert_eq!(previous, None);
        tracker.restore(key, previous);
        assert!(tracker.is_empty());
        assert!(tracker.is_ready(key, Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_drops_expired() {
        let mut tracker = CooldownTracker::new(Duration::from_secs(60));
        tracker.reserve(CooldownKey::Item(1), Instant::now());
        tokio::time::advance(Duration::from_secs(30)).await;
        tracker.reserve(CooldownKey::Item(2), Instant::now());
        tokio::time::advance(Duration::from_secs(40)).await;

        tracker.prune(Instant::now());
        assert_eq!(tracker.len(), 1);
        assert!(tracker.is_ready(CooldownKey::Item(1), Instant::now()));
    }
}
