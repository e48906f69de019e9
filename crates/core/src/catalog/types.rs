//! Types for the media catalog (episodes or movies of one back-end).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while reading a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// External identifiers used to match request-feed entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIds {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tvdb: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmdb: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imdb: Option<String>,
}

/// One episode or movie read from the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissingItem {
    /// Episode id (Sonarr) or movie id (Radarr).
    pub id: i64,
    /// Series id (Sonarr); equals `id` for movies.
    pub parent_id: i64,
    pub title: String,
    pub parent_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode: Option<i32>,
    /// Air date (episodes) or earliest release date (movies).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_date: Option<DateTime<Utc>>,
    pub monitored: bool,
    pub parent_monitored: bool,
    pub has_file: bool,
    /// The existing file reaches the profile cutoff (false without a file).
    pub quality_cutoff_met: bool,
    #[serde(default)]
    pub external_ids: ExternalIds,
}

impl MissingItem {
    /// Season 0 holds specials.
    pub fn is_special(&self) -> bool {
        self.season == Some(0)
    }

    /// Human-readable label for logs.
    pub fn label(&self) -> String {
        match (self.season, self.episode) {
            (Some(season), Some(episode)) => {
                format!("{} S{:02}E{:02}", self.parent_title, season, episode)
            }
            _ => self.title.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(season: Option<i32>, episode: Option<i32>) -> MissingItem {
        MissingItem {
            id: 1,
            parent_id: 2,
            title: "Pilot".to_string(),
            parent_title: "Some Show".to_string(),
            season,
            episode,
            release_date: None,
            monitored: true,
            parent_monitored: true,
            has_file: false,
            quality_cutoff_met: false,
            external_ids: ExternalIds::default(),
        }
    }

    #[test]
    fn test_label() {
        assert_eq!(item(Some(1), Some(3)).label(), "Some Show S01E03");
        assert_eq!(item(None, None).label(), "Pilot");
    }

    #[test]
    fn test_is_special() {
        assert!(item(Some(0), Some(1)).is_special());
        assert!(!item(Some(1), Some(1)).is_special());
        assert!(!item(None, None).is_special());
    }
}
