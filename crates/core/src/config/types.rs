use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::arr::{ArrKind, ImportMode};

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub connectivity: ConnectivityConfig,
    pub qbittorrent: QBittorrentConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub instances: Vec<InstanceConfig>,
}

/// Process-wide settings shared by every instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Category a user moves a torrent into to mark it failed.
    #[serde(default = "default_failed_category")]
    pub failed_category: String,
    /// Category a user moves a torrent into to request a recheck.
    #[serde(default = "default_recheck_category")]
    pub recheck_category: String,
    /// Interval of the transfer monitor sweep (seconds).
    #[serde(default = "default_loop_sleep")]
    pub loop_sleep_secs: u64,
    /// Restart all workers after this many seconds (0 = never).
    #[serde(default)]
    pub auto_restart_secs: u64,
    /// How long shutdown waits for running cycles (seconds).
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            failed_category: default_failed_category(),
            recheck_category: default_recheck_category(),
            loop_sleep_secs: default_loop_sleep(),
            auto_restart_secs: 0,
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

fn default_failed_category() -> String {
    "failed".to_string()
}

fn default_recheck_category() -> String {
    "recheck".to_string()
}

fn default_loop_sleep() -> u64 {
    5
}

fn default_shutdown_timeout() -> u64 {
    30
}

/// Internet reachability probe configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectivityConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// `host:port` pairs; connectivity is up when any of them accepts a TCP connection.
    #[serde(default = "default_ping_targets")]
    pub targets: Vec<String>,
    #[serde(default = "default_connectivity_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_connectivity_timeout")]
    pub timeout_ms: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            targets: default_ping_targets(),
            interval_secs: default_connectivity_interval(),
            timeout_ms: default_connectivity_timeout(),
        }
    }
}

fn default_ping_targets() -> Vec<String> {
    vec!["1.1.1.1:53".to_string(), "8.8.8.8:53".to_string()]
}

fn default_connectivity_interval() -> u64 {
    15
}

fn default_connectivity_timeout() -> u64 {
    2000
}

/// qBittorrent Web API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QBittorrentConfig {
    /// WebUI URL (e.g., "http://localhost:8080")
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

fn default_timeout() -> u32 {
    30
}

/// Media validity probe configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProbeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ffprobe_path: default_ffprobe_path(),
        }
    }
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

/// Status endpoint configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}

fn default_port() -> u16 {
    6969
}

/// One Sonarr/Radarr connection and its policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InstanceConfig {
    pub name: String,
    pub kind: ArrKind,
    /// Unmanaged instances are ignored entirely.
    #[serde(default = "default_true")]
    pub managed: bool,
    pub uri: String,
    pub api_key: String,
    /// Download client category owned by this instance (defaults to `name`).
    #[serde(default)]
    pub category: Option<String>,
    /// Search again for the items of a blacklisted release.
    #[serde(default)]
    pub re_search: bool,
    #[serde(default)]
    pub import_mode: ImportMode,
    /// Queue refresh interval in minutes (0 = disabled).
    #[serde(default = "default_refresh_downloads")]
    pub refresh_downloads_timer_mins: u64,
    /// RSS sync interval in minutes (0 = disabled).
    #[serde(default = "default_rss_sync")]
    pub rss_sync_timer_mins: u64,
    /// Minimum spacing between outbound calls for this instance.
    #[serde(default = "default_api_call_spacing")]
    pub api_call_spacing_ms: u64,
    /// HTTP timeout for back-end calls in seconds.
    #[serde(default = "default_instance_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub torrent: TorrentPolicy,
    #[serde(default)]
    pub search: EntrySearchConfig,
}

impl InstanceConfig {
    /// Category label assigned to this instance's torrents.
    pub fn category(&self) -> &str {
        self.category.as_deref().unwrap_or(&self.name)
    }
}

fn default_refresh_downloads() -> u64 {
    1
}

fn default_rss_sync() -> u64 {
    15
}

fn default_api_call_spacing() -> u64 {
    500
}

fn default_instance_timeout() -> u64 {
    30
}

/// Per-instance torrent handling policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TorrentPolicy {
    #[serde(default)]
    pub case_sensitive_matches: bool,
    #[serde(default = "default_folder_exclusions")]
    pub folder_exclusion_regex: Vec<String>,
    #[serde(default = "default_file_name_exclusions")]
    pub file_name_exclusion_regex: Vec<String>,
    /// Allowed extensions; empty allows everything.
    #[serde(default = "default_extension_allowlist")]
    pub file_extension_allowlist: Vec<String>,
    /// Mark rejected files as "do not download".
    #[serde(default)]
    pub auto_delete: bool,
    /// Age gate in seconds.
    #[serde(default = "default_ignore_younger_than")]
    pub ignore_torrents_younger_than: i64,
    /// ETA ceiling in seconds (<= 0 disables the check).
    #[serde(default = "default_maximum_eta")]
    pub maximum_eta: i64,
    #[serde(default = "default_maximum_deletable_percentage")]
    pub maximum_deletable_percentage: f64,
    #[serde(default)]
    pub do_not_remove_slow: bool,
    #[serde(default)]
    pub seeding: SeedingPolicy,
    #[serde(default)]
    pub trackers: Vec<TrackerPolicy>,
}

impl Default for TorrentPolicy {
    fn default() -> Self {
        Self {
            case_sensitive_matches: false,
            folder_exclusion_regex: default_folder_exclusions(),
            file_name_exclusion_regex: default_file_name_exclusions(),
            file_extension_allowlist: default_extension_allowlist(),
            auto_delete: false,
            ignore_torrents_younger_than: default_ignore_younger_than(),
            maximum_eta: default_maximum_eta(),
            maximum_deletable_percentage: default_maximum_deletable_percentage(),
            do_not_remove_slow: false,
            seeding: SeedingPolicy::default(),
            trackers: Vec::new(),
        }
    }
}

impl TorrentPolicy {
    /// Whether classification needs the full tracker list of each torrent.
    pub fn needs_trackers(&self) -> bool {
        self.seeding.remove_dead_trackers || !self.trackers.is_empty()
    }
}

fn default_folder_exclusions() -> Vec<String> {
    vec![
        r"\bextras?\b".to_string(),
        r"\bfeaturettes?\b".to_string(),
        r"\bsamples?\b".to_string(),
        r"\bscreens?\b".to_string(),
        r"\bspecials?\b".to_string(),
    ]
}

fn default_file_name_exclusions() -> Vec<String> {
    vec![
        r"\bncop\d+?\b".to_string(),
        r"\bnced\d+?\b".to_string(),
        r"\bsample\b".to_string(),
        r"brarbg.com\b".to_string(),
        r"\btrailer\b".to_string(),
        r"music video".to_string(),
        r"comandotorrents.com".to_string(),
    ]
}

fn default_extension_allowlist() -> Vec<String> {
    [".mp4", ".mkv", ".sub", ".ass", ".srt", ".!qB", ".parts"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_ignore_younger_than() -> i64 {
    600
}

fn default_maximum_eta() -> i64 {
    86400
}

fn default_maximum_deletable_percentage() -> f64 {
    0.95
}

/// When a completed torrent is removed from the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum RemoveTorrentPolicy {
    /// Never remove (`-1`).
    #[default]
    Never,
    /// Ratio ceiling reached (`1`).
    Ratio,
    /// Seeding time ceiling reached (`2`).
    SeedingTime,
    /// Either ceiling reached (`3`).
    Either,
    /// Both ceilings reached (`4`).
    Both,
}

impl TryFrom<i64> for RemoveTorrentPolicy {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 | 0 => Ok(Self::Never),
            1 => Ok(Self::Ratio),
            2 => Ok(Self::SeedingTime),
            3 => Ok(Self::Either),
            4 => Ok(Self::Both),
            other => Err(format!("invalid remove_torrent value {}", other)),
        }
    }
}

impl From<RemoveTorrentPolicy> for i64 {
    fn from(policy: RemoveTorrentPolicy) -> Self {
        match policy {
            RemoveTorrentPolicy::Never => -1,
            RemoveTorrentPolicy::Ratio => 1,
            RemoveTorrentPolicy::SeedingTime => 2,
            RemoveTorrentPolicy::Either => 3,
            RemoveTorrentPolicy::Both => 4,
        }
    }
}

/// Seeding limits and tracker maintenance; `-1` means unbounded.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SeedingPolicy {
    /// Bytes/second.
    #[serde(default = "default_unbounded")]
    pub download_rate_limit_per_torrent: i64,
    /// Bytes/second.
    #[serde(default = "default_unbounded")]
    pub upload_rate_limit_per_torrent: i64,
    #[serde(default = "default_unbounded_ratio")]
    pub max_upload_ratio: f64,
    /// Seconds.
    #[serde(default = "default_unbounded")]
    pub max_seeding_time: i64,
    #[serde(default)]
    pub remove_torrent: RemoveTorrentPolicy,
    #[serde(default)]
    pub remove_dead_trackers: bool,
    #[serde(default = "default_dead_tracker_messages")]
    pub remove_tracker_with_message: Vec<String>,
}

impl Default for SeedingPolicy {
    fn default() -> Self {
        Self {
            download_rate_limit_per_torrent: -1,
            upload_rate_limit_per_torrent: -1,
            max_upload_ratio: -1.0,
            max_seeding_time: -1,
            remove_torrent: RemoveTorrentPolicy::Never,
            remove_dead_trackers: false,
            remove_tracker_with_message: default_dead_tracker_messages(),
        }
    }
}

fn default_unbounded() -> i64 {
    -1
}

fn default_unbounded_ratio() -> f64 {
    -1.0
}

fn default_dead_tracker_messages() -> Vec<String> {
    vec![
        "skipping tracker announce (unreachable)".to_string(),
        "No such host is known".to_string(),
        "unsupported URL protocol".to_string(),
        "info hash is not authorized with this tracker".to_string(),
    ]
}

/// Overrides applied to torrents announcing to a given tracker.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TrackerPolicy {
    #[serde(default)]
    pub name: Option<String>,
    /// Tracker URL or bare hostname.
    pub uri: String,
    /// Highest priority wins when several trackers match.
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub maximum_eta: Option<i64>,
    #[serde(default)]
    pub download_rate_limit: Option<i64>,
    #[serde(default)]
    pub upload_rate_limit: Option<i64>,
    #[serde(default)]
    pub max_upload_ratio: Option<f64>,
    #[serde(default)]
    pub max_seeding_time: Option<i64>,
    #[serde(default)]
    pub remove_tracker_with_message: Option<Vec<String>>,
    /// Strip this tracker from every torrent that carries it.
    #[serde(default)]
    pub remove_if_exists: bool,
}

/// Missing/upgrade search configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EntrySearchConfig {
    #[serde(default)]
    pub search_missing: bool,
    #[serde(default)]
    pub also_search_specials: bool,
    #[serde(default = "default_true")]
    pub search_by_year: bool,
    #[serde(default)]
    pub search_in_reverse: bool,
    /// Maximum concurrent search commands for this instance.
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    #[serde(default = "default_true")]
    pub prioritize_todays_releases: bool,
    #[serde(default)]
    pub search_by_series: bool,
    #[serde(default)]
    pub do_upgrade_search: bool,
    #[serde(default)]
    pub quality_unmet_search: bool,
    #[serde(default)]
    pub search_again_on_search_completion: bool,
    /// Cooldown between searches of the same item (seconds).
    #[serde(default = "default_search_requests_every")]
    pub search_requests_every: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub request_sweep_interval_secs: u64,
    #[serde(default = "default_command_poll_interval")]
    pub command_poll_interval_secs: u64,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    /// Path to the back-end's SQLite database.
    #[serde(default)]
    pub database_file: Option<PathBuf>,
    #[serde(default)]
    pub overseerr: Option<OverseerrConfig>,
    #[serde(default)]
    pub ombi: Option<OmbiConfig>,
}

impl Default for EntrySearchConfig {
    fn default() -> Self {
        Self {
            search_missing: false,
            also_search_specials: false,
            search_by_year: true,
            search_in_reverse: false,
            search_limit: default_search_limit(),
            prioritize_todays_releases: true,
            search_by_series: false,
            do_upgrade_search: false,
            quality_unmet_search: false,
            search_again_on_search_completion: false,
            search_requests_every: default_search_requests_every(),
            sweep_interval_secs: default_sweep_interval(),
            request_sweep_interval_secs: default_sweep_interval(),
            command_poll_interval_secs: default_command_poll_interval(),
            command_timeout_secs: default_command_timeout(),
            database_file: None,
            overseerr: None,
            ombi: None,
        }
    }
}

fn default_search_limit() -> usize {
    5
}

fn default_search_requests_every() -> u64 {
    1800
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_command_poll_interval() -> u64 {
    5
}

fn default_command_timeout() -> u64 {
    3600
}

/// Overseerr request feed
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OverseerrConfig {
    pub uri: String,
    pub api_key: String,
    #[serde(default = "default_true")]
    pub approved_only: bool,
    #[serde(default)]
    pub is_4k: bool,
}

/// Ombi request feed
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OmbiConfig {
    pub uri: String,
    pub api_key: String,
    #[serde(default = "default_true")]
    pub approved_only: bool,
}

fn default_true() -> bool {
    true
}

/// Sanitized config for logging and the status endpoint (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub settings: Settings,
    pub connectivity: ConnectivityConfig,
    pub qbittorrent: SanitizedQBittorrentConfig,
    pub probe: ProbeConfig,
    pub server: ServerConfig,
    pub instances: Vec<SanitizedInstanceConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedQBittorrentConfig {
    pub url: String,
    pub username: String,
    pub password_configured: bool,
    pub timeout_secs: u32,
}

/// Instance summary with the API keys hidden.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedInstanceConfig {
    pub name: String,
    pub kind: ArrKind,
    pub managed: bool,
    pub uri: String,
    pub api_key_configured: bool,
    pub category: String,
    pub search_missing: bool,
    pub search_limit: usize,
    pub overseerr_configured: bool,
    pub ombi_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            settings: config.settings.clone(),
            connectivity: config.connectivity.clone(),
            qbittorrent: SanitizedQBittorrentConfig {
                url: config.qbittorrent.url.clone(),
                username: config.qbittorrent.username.clone(),
                password_configured: !config.qbittorrent.password.is_empty(),
                timeout_secs: config.qbittorrent.timeout_secs,
            },
            probe: config.probe.clone(),
            server: config.server.clone(),
            instances: config
                .instances
                .iter()
                .map(|i| SanitizedInstanceConfig {
                    name: i.name.clone(),
                    kind: i.kind,
                    managed: i.managed,
                    uri: i.uri.clone(),
                    api_key_configured: !i.api_key.is_empty(),
                    category: i.category().to_string(),
                    search_missing: i.search.search_missing,
                    search_limit: i.search.search_limit,
                    overseerr_configured: i.search.overseerr.is_some(),
                    ombi_configured: i.search.ombi.is_some(),
                })
                .collect(),
        }
    }
}
