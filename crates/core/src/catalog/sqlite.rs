//! Read-only reader over the Sonarr/Radarr SQLite database.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rusqlite::{Connection, OpenFlags, Row};
use serde_json::Value;

use super::{CatalogError, CatalogReader, ExternalIds, MissingItem};
use crate::arr::ArrKind;

const SONARR_QUERY: &str = r#"
    SELECT e.Id, e.SeriesId, e.Title, s.Title, e.SeasonNumber, e.EpisodeNumber,
           e.AirDateUtc, e.Monitored, s.Monitored, ef.Id, ef.Quality,
           qp.Cutoff, qp.Items, s.TvdbId, s.ImdbId
    FROM Episodes e
    JOIN Series s ON s.Id = e.SeriesId
    LEFT JOIN EpisodeFiles ef ON ef.Id = e.EpisodeFileId AND e.EpisodeFileId > 0
    LEFT JOIN QualityProfiles qp ON qp.Id = s.QualityProfileId
    ORDER BY e.Id
"#;

/// Read-only catalog reader for one back-end database file.
///
/// The connection is opened lazily and dropped after any failure so a
/// database that appears later (or is replaced) is picked up on the next read.
pub struct SqliteCatalogReader {
    path: PathBuf,
    kind: ArrKind,
    conn: Mutex<Option<Connection>>,
}

impl SqliteCatalogReader {
    pub fn new(path: &Path, kind: ArrKind) -> Self {
        Self {
            path: path.to_path_buf(),
            kind,
            conn: Mutex::new(None),
        }
    }

    fn open(&self) -> Result<Connection, CatalogError> {
        if !self.path.exists() {
            return Err(CatalogError::Unavailable(format!(
                "{} does not exist",
                self.path.display()
            )));
        }
        Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| CatalogError::Unavailable(e.to_string()))
    }

    fn read(&self, conn: &Connection) -> Result<Vec<MissingItem>, CatalogError> {
        match self.kind {
            ArrKind::Sonarr => read_episodes(conn),
            ArrKind::Radarr => read_movies(conn),
        }
    }
}

impl CatalogReader for SqliteCatalogReader {
    fn items(&self) -> Result<Vec<MissingItem>, CatalogError> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| CatalogError::Database("connection lock poisoned".to_string()))?;

        if guard.is_none() {
            *guard = Some(self.open()?);
        }
        let result = match guard.as_ref() {
            Some(conn) => self.read(conn),
            None => Err(CatalogError::Unavailable("not connected".to_string())),
        };
        if result.is_err() {
            *guard = None;
        }
        result
    }
}

fn db_err(e: rusqlite::Error) -> CatalogError {
    CatalogError::Database(e.to_string())
}

fn read_episodes(conn: &Connection) -> Result<Vec<MissingItem>, CatalogError> {
    let mut stmt = conn.prepare(SONARR_QUERY).map_err(db_err)?;
    let mut profiles = ProfileCache::default();

    let rows = stmt
        .query_map([], |row| {
            Ok(RawItem {
                id: row.get(0)?,
                parent_id: row.get(1)?,
                title: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                parent_title: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                season: row.get(4)?,
                episode: row.get(5)?,
                release_date: row
                    .get::<_, Option<String>>(6)?
                    .as_deref()
                    .and_then(parse_timestamp),
                monitored: flag(row, 7)?,
                parent_monitored: flag(row, 8)?,
                has_file: row.get::<_, Option<i64>>(9)?.is_some(),
                quality: row.get(10)?,
                cutoff: row.get(11)?,
                profile_items: row.get(12)?,
                external_ids: ExternalIds {
                    tvdb: row.get(13)?,
                    tmdb: None,
                    imdb: row.get(14)?,
                },
            })
        })
        .map_err(db_err)?;

    rows.map(|row| row.map(|raw| raw.into_item(&mut profiles)).map_err(db_err))
        .collect()
}

fn read_movies(conn: &Connection) -> Result<Vec<MissingItem>, CatalogError> {
    // Radarr v5 renamed ProfileId to QualityProfileId.
    let has_quality_profile_id: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM pragma_table_info('Movies') WHERE name = 'QualityProfileId'",
            [],
            |row| row.get(0),
        )
        .map_err(db_err)?;
    let profile_column = if has_quality_profile_id > 0 {
        "QualityProfileId"
    } else {
        "ProfileId"
    };

    let sql = format!(
        r#"
        SELECT m.Id, mm.Title, mm.Year, mm.InCinemas, mm.DigitalRelease, mm.PhysicalRelease,
               m.Monitored, mf.Id, mf.Quality, qp.Cutoff, qp.Items, mm.TmdbId, mm.ImdbId
        FROM Movies m
        JOIN MovieMetadata mm ON mm.Id = m.MovieMetadataId
        LEFT JOIN MovieFiles mf ON mf.Id = m.MovieFileId AND m.MovieFileId > 0
        LEFT JOIN QualityProfiles qp ON qp.Id = m.{}
        ORDER BY m.Id
        "#,
        profile_column
    );

    let mut stmt = conn.prepare(&sql).map_err(db_err)?;
    let mut profiles = ProfileCache::default();

    let rows = stmt
        .query_map([], |row| {
            let id: i64 = row.get(0)?;
            let title = row.get::<_, Option<String>>(1)?.unwrap_or_default();
            let year: Option<i32> = row.get(2)?;
            let release_date = [3, 4, 5]
                .iter()
                .map(|&idx| row.get::<_, Option<String>>(idx))
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .flatten()
                .filter_map(|s| parse_timestamp(&s))
                .min()
                .or_else(|| year.and_then(start_of_year));
            let monitored = flag(row, 6)?;

            Ok(RawItem {
                id,
                parent_id: id,
                parent_title: title.clone(),
                title,
                season: None,
                episode: None,
                release_date,
                monitored,
                parent_monitored: monitored,
                has_file: row.get::<_, Option<i64>>(7)?.is_some(),
                quality: row.get(8)?,
                cutoff: row.get(9)?,
                profile_items: row.get(10)?,
                external_ids: ExternalIds {
                    tvdb: None,
                    tmdb: row.get(11)?,
                    imdb: row.get(12)?,
                },
            })
        })
        .map_err(db_err)?;

    rows.map(|row| row.map(|raw| raw.into_item(&mut profiles)).map_err(db_err))
        .collect()
}

fn flag(row: &Row<'_>, idx: usize) -> rusqlite::Result<bool> {
    Ok(row.get::<_, Option<i64>>(idx)?.unwrap_or(0) != 0)
}

/// Columns of one catalog row before quality evaluation.
struct RawItem {
    id: i64,
    parent_id: i64,
    title: String,
    parent_title: String,
    season: Option<i32>,
    episode: Option<i32>,
    release_date: Option<DateTime<Utc>>,
    monitored: bool,
    parent_monitored: bool,
    has_file: bool,
    quality: Option<String>,
    cutoff: Option<i64>,
    profile_items: Option<String>,
    external_ids: ExternalIds,
}

impl RawItem {
    fn into_item(self, profiles: &mut ProfileCache) -> MissingItem {
        let quality_cutoff_met = self.has_file
            && match (self.quality.as_deref(), self.cutoff, self.profile_items) {
                (Some(quality), Some(cutoff), Some(items)) => {
                    let ranks = profiles.ranks(items);
                    match file_quality_id(quality) {
                        Some(quality_id) => cutoff_met(ranks, quality_id, cutoff),
                        None => true,
                    }
                }
                // Without a profile there is nothing to upgrade towards.
                _ => true,
            };

        MissingItem {
            id: self.id,
            parent_id: self.parent_id,
            title: self.title,
            parent_title: self.parent_title,
            season: self.season,
            episode: self.episode,
            release_date: self.release_date,
            monitored: self.monitored,
            parent_monitored: self.parent_monitored,
            has_file: self.has_file,
            quality_cutoff_met,
            external_ids: self.external_ids,
        }
    }
}

/// Parsed quality rankings, keyed by the raw `Items` JSON of a profile.
#[derive(Default)]
struct ProfileCache {
    parsed: HashMap<String, HashMap<i64, usize>>,
}

impl ProfileCache {
    fn ranks(&mut self, items: String) -> &HashMap<i64, usize> {
        self.parsed
            .entry(items)
            .or_insert_with_key(|items| quality_ranks(items))
    }
}

/// Rank of every quality (and quality group) id in profile order.
///
/// Qualities inside a group share the group's rank.
fn quality_ranks(items_json: &str) -> HashMap<i64, usize> {
    let mut ranks = HashMap::new();
    let items: Vec<Value> = serde_json::from_str(items_json).unwrap_or_default();

    for (rank, item) in items.iter().enumerate() {
        if let Some(id) = item.get("quality").and_then(quality_id) {
            ranks.insert(id, rank);
        }
        if let Some(group_id) = item.get("id").and_then(Value::as_i64) {
            ranks.insert(group_id, rank);
        }
        if let Some(children) = item.get("items").and_then(Value::as_array) {
            for child in children {
                if let Some(id) = child.get("quality").and_then(quality_id) {
                    ranks.insert(id, rank);
                }
            }
        }
    }
    ranks
}

/// A quality reference is either a bare id or `{"id": n, ...}`.
fn quality_id(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.get("id").and_then(Value::as_i64))
}

/// Quality id of a file's `Quality` column (`{"quality": ..., "revision": ...}`).
fn file_quality_id(quality_json: &str) -> Option<i64> {
    let value: Value = serde_json::from_str(quality_json).ok()?;
    value.get("quality").and_then(quality_id)
}

fn cutoff_met(ranks: &HashMap<i64, usize>, quality_id: i64, cutoff: i64) -> bool {
    match (ranks.get(&quality_id), ranks.get(&cutoff)) {
        (Some(quality_rank), Some(cutoff_rank)) => quality_rank >= cutoff_rank,
        _ => true,
    }
}

/// Parse the timestamp formats found in back-end databases.
pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = value.trim_end_matches('Z');
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, format) {
            return Some(Utc.from_utc_datetime(&dt));
        }
    }
    NaiveDate::parse_from_str(naive, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
}

fn start_of_year(year: i32) -> Option<DateTime<Utc>> {
    if year <= 0 {
        return None;
    }
    NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
}
