//! In-memory catalog for testing.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::catalog::{CatalogError, CatalogReader, MissingItem};

/// Mock implementation of the CatalogReader trait.
#[derive(Debug, Default)]
pub struct MockCatalog {
    items: Mutex<Vec<MissingItem>>,
    unavailable: AtomicBool,
    reads: AtomicUsize,
}

impl MockCatalog {
    pub fn new(items: Vec<MissingItem>) -> Self {
        Self {
            items: Mutex::new(items),
            ..Default::default()
        }
    }

    pub fn set_items(&self, items: Vec<MissingItem>) {
        if let Ok(mut current) = self.items.lock() {
            *current = items;
        }
    }

    /// Mark an item as downloaded.
    pub fn set_has_file(&self, id: i64) {
        if let Ok(mut items) = self.items.lock() {
            for item in items.iter_mut().filter(|i| i.id == id) {
                item.has_file = true;
            }
        }
    }

    /// Make reads fail as if the database were missing.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of read attempts.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl CatalogReader for MockCatalog {
    fn items(&self) -> Result<Vec<MissingItem>, CatalogError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable("mock catalog unavailable".to_string()));
        }
        self.items
            .lock()
            .map(|items| items.clone())
            .map_err(|e| CatalogError::Database(e.to_string()))
    }
}
