//! Media-management back-end (Sonarr/Radarr) integration.

mod client;
mod types;

pub use client::ArrHttpClient;
pub use types::*;
