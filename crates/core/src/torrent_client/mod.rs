//! Torrent client abstraction.
//!
//! The `TorrentClient` trait exposes the subset of the download client's
//! control API the monitor needs: listing transfers with their files and
//! trackers, and the commands it issues back (delete, recheck, category,
//! tracker removal, file priority and per-torrent limits).

mod qbittorrent;
mod types;

pub use qbittorrent::QBittorrentClient;
pub use types::*;
