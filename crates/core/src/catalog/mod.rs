//! Media catalog - read-only view of a back-end's episodes or movies.
//!
//! The search scheduler re-reads the catalog every sweep to find items
//! that are missing, below their quality cutoff, or requested.

mod sqlite;
mod types;

pub use sqlite::SqliteCatalogReader;
pub use types::*;

/// Trait for catalog sources.
///
/// Implementations are synchronous; async callers run them on the
/// blocking pool.
pub trait CatalogReader: Send + Sync {
    /// Read every episode (Sonarr) or movie (Radarr) in catalog order.
    fn items(&self) -> Result<Vec<MissingItem>, CatalogError>;
}
