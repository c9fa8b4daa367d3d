//! Runtime settings read from the environment.

use std::path::PathBuf;

use thiserror::Error;

/// Default API endpoint serving the latest core version.
pub const DEFAULT_API_URL: &str = "https://api.matomo.org";
/// Default endpoint listing and serving core release archives.
pub const DEFAULT_BUILDS_URL: &str = "https://builds.matomo.org";
/// Default plugin marketplace endpoint.
pub const DEFAULT_PLUGINS_URL: &str = "https://plugins.matomo.org";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("SOURCE_DATE_EPOCH must be an integer number of seconds, got '{0}'")]
    InvalidEpoch(String),
}

/// Endpoints, cache location and reproducibility override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_url: String,
    pub builds_url: String,
    pub plugins_url: String,
    /// `None` disables the cache entirely.
    pub cache_dir: Option<PathBuf>,
    /// Explicit mtime clamp (`SOURCE_DATE_EPOCH`).
    pub source_date_epoch: Option<i64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            builds_url: DEFAULT_BUILDS_URL.to_string(),
            plugins_url: DEFAULT_PLUGINS_URL.to_string(),
            cache_dir: default_cache_dir(),
            source_date_epoch: None,
        }
    }
}

impl Settings {
    /// Read `MDIST_API_URL`, `MDIST_BUILDS_URL`, `MDIST_PLUGINS_URL`,
    /// `MDIST_CACHE_DIR` and `SOURCE_DATE_EPOCH`, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let source_date_epoch = match non_empty("SOURCE_DATE_EPOCH") {
            Some(raw) => Some(
                raw.trim()
                    .parse::<i64>()
                    .map_err(|_| ConfigError::InvalidEpoch(raw.clone()))?,
            ),
            None => None,
        };

        Ok(Self {
            api_url: non_empty("MDIST_API_URL").unwrap_or(defaults.api_url),
            builds_url: non_empty("MDIST_BUILDS_URL").unwrap_or(defaults.builds_url),
            plugins_url: non_empty("MDIST_PLUGINS_URL").unwrap_or(defaults.plugins_url),
            cache_dir: non_empty("MDIST_CACHE_DIR")
                .map(PathBuf::from)
                .or(defaults.cache_dir),
            source_date_epoch,
        })
    }
}

/// Cache path: `$XDG_CACHE_HOME/mdist` (or the platform equivalent).
pub fn default_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("mdist"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            ("MDIST_PLUGINS_URL", "http://127.0.0.1:9000"),
            ("MDIST_CACHE_DIR", "/tmp/mdist-cache"),
            ("SOURCE_DATE_EPOCH", "1700000000"),
        ]))
        .unwrap();
        assert_eq!(settings.plugins_url, "http://127.0.0.1:9000");
        assert_eq!(settings.api_url, DEFAULT_API_URL);
        assert_eq!(settings.cache_dir, Some(PathBuf::from("/tmp/mdist-cache")));
        assert_eq!(settings.source_date_epoch, Some(1_700_000_000));
    }

    #[test]
    fn test_invalid_epoch() {
        let err = Settings::from_lookup(lookup(&[("SOURCE_DATE_EPOCH", "yesterday")]));
        assert!(matches!(err, Err(ConfigError::InvalidEpoch(_))));
    }

    #[test]
    fn test_empty_values_fall_back() {
        let settings = Settings::from_lookup(lookup(&[("MDIST_API_URL", "  ")])).unwrap();
        assert_eq!(settings.api_url, DEFAULT_API_URL);
        assert_eq!(settings.source_date_epoch, None);
    }
}
