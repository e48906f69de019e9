use std::collections::HashSet;

use reqwest::Url;
use tracing::warn;

use super::{
    types::{Config, InstanceConfig, Settings},
    ConfigError,
};

/// Spacing below which back-end task queues tend to back up.
const SAFE_SPACING_FLOOR_MS: u64 = 100;

/// Validate process-wide configuration.
///
/// Failures here abort startup. Problems that only affect a single
/// instance are reported by [`validate_instance`] instead so that the
/// remaining instances can still run.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.qbittorrent.url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "qbittorrent.url cannot be empty".to_string(),
        ));
    }
    Url::parse(&config.qbittorrent.url).map_err(|e| {
        ConfigError::ValidationError(format!("qbittorrent.url is invalid: {}", e))
    })?;

    if config.server.enabled && config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.settings.loop_sleep_secs == 0 {
        return Err(ConfigError::ValidationError(
            "settings.loop_sleep_secs cannot be 0".to_string(),
        ));
    }

    if config.settings.failed_category == config.settings.recheck_category {
        return Err(ConfigError::ValidationError(
            "settings.failed_category and settings.recheck_category must differ".to_string(),
        ));
    }

    let mut names = HashSet::new();
    for instance in &config.instances {
        if !names.insert(instance.name.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate instance name '{}'",
                instance.name
            )));
        }
    }

    Ok(())
}

/// Validate a single instance against the process-wide settings.
pub fn validate_instance(
    instance: &InstanceConfig,
    settings: &Settings,
) -> Result<(), ConfigError> {
    let fail = |msg: String| ConfigError::ValidationError(format!("[{}] {}", instance.name, msg));

    if instance.name.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "instance name cannot be empty".to_string(),
        ));
    }
    Url::parse(&instance.uri).map_err(|e| fail(format!("uri is invalid: {}", e)))?;
    if instance.api_key.is_empty() {
        return Err(fail("api_key cannot be empty".to_string()));
    }

    let category = instance.category();
    if category == settings.failed_category || category == settings.recheck_category {
        return Err(fail(format!(
            "category '{}' clashes with the failed/recheck categories",
            category
        )));
    }

    let pct = instance.torrent.maximum_deletable_percentage;
    if !(0.0..=1.0).contains(&pct) {
        return Err(fail(format!(
            "torrent.maximum_deletable_percentage must be within 0..=1, got {}",
            pct
        )));
    }

    if instance.search.search_missing {
        if instance.search.search_limit == 0 {
            return Err(fail("search.search_limit must be at least 1".to_string()));
        }
        if instance.search.database_file.is_none() {
            return Err(fail(
                "search.database_file is required when search_missing is enabled".to_string(),
            ));
        }
        if instance.search.sweep_interval_secs == 0 {
            return Err(fail("search.sweep_interval_secs cannot be 0".to_string()));
        }
    }

    if instance.api_call_spacing_ms < SAFE_SPACING_FLOOR_MS {
        warn!(
            instance = %instance.name,
            spacing_ms = instance.api_call_spacing_ms,
            "api_call_spacing_ms is below the recommended floor of {}ms",
            SAFE_SPACING_FLOOR_MS
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn config_with_instance(extra: &str) -> Config {
        let toml = format!(
            r#"
[qbittorrent]
url = "http://127.0.0.1:8080"

[[instances]]
name = "sonarr"
kind = "sonarr"
uri = "http://127.0.0.1:8989"
api_key = "key"
{}
"#,
            extra
        );
        load_config_from_str(&toml).unwrap()
    }

    #[test]
    fn test_validate_valid_config() {
        let config = config_with_instance("");
        assert!(validate_config(&config).is_ok());
        assert!(validate_instance(&config.instances[0], &config.settings).is_ok());
    }

    #[test]
    fn test_validate_duplicate_instance_names_fails() {
        let mut config = config_with_instance("");
        config.instances.push(config.instances[0].clone());
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_instance_category_clash() {
        let config = config_with_instance(r#"category = "failed""#);
        assert!(validate_config(&config).is_ok());
        assert!(validate_instance(&config.instances[0], &config.settings).is_err());
    }

    #[test]
    fn test_validate_instance_search_requires_database() {
        let config = config_with_instance(
            r#"
[instances.search]
search_missing = true
"#,
        );
        let err = validate_instance(&config.instances[0], &config.settings).unwrap_err();
        assert!(err.to_string().contains("database_file"));
    }

    #[test]
    fn test_validate_instance_invalid_uri() {
        let mut config = config_with_instance("");
        config.instances[0].uri = "not a url".to_string();
        assert!(validate_instance(&config.instances[0], &config.settings).is_err());
    }

    #[test]
    fn test_validate_zero_search_limit() {
        let config = config_with_instance(
            r#"
[instances.search]
search_missing = true
search_limit = 0
database_file = "/tmp/sonarr.db"
"#,
        );
        assert!(validate_instance(&config.instances[0], &config.settings).is_err());
    }
}
