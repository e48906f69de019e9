//! Transfer monitor: classifies every torrent of an instance and acts on it.

mod classify;
mod runner;
mod tracker;
mod types;

pub use classify::{classify, ClassifyContext};
pub use runner::TorrentMonitor;
pub use tracker::{record_hosts, tracker_host, trackers_to_remove, EffectivePolicy};
pub use types::*;
