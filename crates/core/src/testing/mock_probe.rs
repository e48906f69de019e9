//! Scriptable media probe for testing.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::filter::{MediaProbe, ProbeOutcome};

/// Mock implementation of the MediaProbe trait.
///
/// Every probed path is valid unless it ends with a name registered
/// through [`MockProbe::set_invalid`].
#[derive(Debug)]
pub struct MockProbe {
    available: AtomicBool,
    invalid: Arc<RwLock<Vec<String>>>,
    probed: Arc<RwLock<Vec<PathBuf>>>,
}

impl Default for MockProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProbe {
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            invalid: Arc::new(RwLock::new(Vec::new())),
            probed: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub async fn set_invalid(&self, name: impl Into<String>) {
        self.invalid.write().await.push(name.into());
    }

    /// Paths passed to `probe`, in order.
    pub async fn probed(&self) -> Vec<PathBuf> {
        self.probed.read().await.clone()
    }
}

#[async_trait]
impl MediaProbe for MockProbe {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn probe(&self, path: &Path) -> ProbeOutcome {
        if !self.is_available() {
            return ProbeOutcome::Skipped;
        }
        self.probed.write().await.push(path.to_path_buf());
        let invalid = self.invalid.read().await;
        if invalid.iter().any(|name| path.ends_with(name)) {
            ProbeOutcome::Invalid("mock: no media streams".to_string())
        } else {
            ProbeOutcome::Valid
        }
    }
}
