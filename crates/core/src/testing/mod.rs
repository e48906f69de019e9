//! Testing utilities and mock implementations.
//!
//! Mocks for every external service trait, so monitor and scheduler
//! cycles can be exercised without a download client or back-end.
//!
//! # Example
//!
//! ```rust,ignore
//! use arrwarden_core::testing::{fixtures, MockArrClient, MockTorrentClient};
//!
//! let client = MockTorrentClient::new();
//! let arr = MockArrClient::new(ArrKind::Sonarr);
//!
//! client.add_record(fixtures::transfer("abc", "tv")).await;
//! arr.add_queue_entry(fixtures::queue_entry(1, "abc", Some(10))).await;
//! ```

pub mod fixtures;
mod mock_arr;
mod mock_catalog;
mod mock_probe;
mod mock_requests;
mod mock_torrent_client;

pub use mock_arr::{MockArrClient, RecordedScan};
pub use mock_catalog::MockCatalog;
pub use mock_probe::MockProbe;
pub use mock_requests::MockRequestService;
pub use mock_torrent_client::{MockTorrentClient, RecordedCommand};
