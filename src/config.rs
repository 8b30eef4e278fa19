use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{PipelineError, Result};

/// Runtime configuration, loaded from a TOML file. Every field has a
/// default so the binary runs without any config file present.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scraper: ScraperConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub base_url: String,
    /// Courtesy delay after each fetch, per the source site's access policy.
    pub request_delay_ms: u64,
    /// Bound on a single navigate-and-render attempt.
    pub page_timeout_ms: u64,
    /// Total attempts for the navigate/wait step.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Explicit Chromium binary; auto-detected when unset.
    pub chrome_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root for the database and CSV exports.
    pub data_dir: PathBuf,
    pub table_name: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.basketball-reference.com".to_string(),
            request_delay_ms: 3000,
            page_timeout_ms: 10_000,
            max_retries: 3,
            retry_backoff_ms: 2000,
            chrome_path: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            table_name: "player_totals".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scraper: ScraperConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Load from `path`, or fall back to defaults when no file exists.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("failed to read '{}': {e}", path.display()))
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            PipelineError::Config(format!("failed to parse '{}': {e}", path.display()))
        })?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.scraper.max_retries, 3);
        assert_eq!(config.storage.table_name, "player_totals");
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "[scraper]\nrequest_delay_ms = 500").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.scraper.request_delay_ms, 500);
        assert_eq!(config.scraper.page_timeout_ms, 10_000);
        assert_eq!(config.storage.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not valid toml [[[").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
