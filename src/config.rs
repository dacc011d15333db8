// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::api::DEFAULT_FMP_BASE_URL;
use crate::normalizer::{DEFAULT_BASE_CURRENCY, DEFAULT_FETCH_TIMEOUT};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Pivot for two-hop conversions and the currency peer aggregates are
    /// stored in
    pub base_currency: String,
    pub default_report_currency: String,
    pub fetch_timeout_secs: u64,
    pub rate_api_base_url: String,
    /// Currencies kept when bulk-fetching rates; empty keeps every pair
    pub tracked_currencies: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_currency: DEFAULT_BASE_CURRENCY.to_string(),
            default_report_currency: DEFAULT_BASE_CURRENCY.to_string(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
            rate_api_base_url: DEFAULT_FMP_BASE_URL.to_string(),
            tracked_currencies: ["EUR", "USD", "GBP", "JPY", "CHF", "CAD", "AUD"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }
}

impl Config {
    /// Load from the configured path, falling back to the defaults when the
    /// file is missing or unreadable
    pub fn load_or_default() -> Self {
        match load_config() {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Using default configuration");
                Self::default()
            }
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// `BENCHMARK_CONFIG` when set, otherwise `config.toml` next to the manifest
fn get_config_path() -> PathBuf {
    match std::env::var("BENCHMARK_CONFIG") {
        Ok(path) if !path.is_empty() => PathBuf::from(path),
        _ => {
            let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
            path.push("config.toml");
            path
        }
    }
}

pub fn load_config() -> anyhow::Result<Config> {
    load_config_from(&get_config_path())
}

pub fn load_config_from(config_path: &Path) -> anyhow::Result<Config> {
    match fs::read_to_string(config_path) {
        Ok(config_str) => match toml::from_str(&config_str) {
            Ok(config) => Ok(config),
            Err(e) => {
                warn!(path = ?config_path, error = %e, "Failed to parse config file");
                Err(e.into())
            }
        },
        Err(e) => {
            warn!(path = ?config_path, error = %e, "Failed to read config file");
            Err(e.into())
        }
    }
}

pub fn save_config(config: &Config, config_path: &Path) -> anyhow::Result<()> {
    let config_str = toml::to_string_pretty(config)?;
    fs::write(config_path, config_str)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_default_values() {
        let config = Config::default();
        assert_eq!(config.base_currency, "EUR");
        assert_eq!(config.default_report_currency, "EUR");
        assert_eq!(config.fetch_timeout(), Duration::from_secs(5));
        assert!(config.tracked_currencies.contains(&"USD".to_string()));
    }

    #[test]
    fn test_config_deserialization_from_toml_string() {
        let toml_content = r#"
base_currency = "USD"
default_report_currency = "GBP"
fetch_timeout_secs = 2
rate_api_base_url = "http://localhost:9999"
tracked_currencies = ["USD", "GBP"]
"#;

        let config: Config = toml::from_str(toml_content).expect("Failed to parse TOML");

        assert_eq!(config.base_currency, "USD");
        assert_eq!(config.default_report_currency, "GBP");
        assert_eq!(config.fetch_timeout_secs, 2);
        assert_eq!(config.tracked_currencies.len(), 2);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: Config =
            toml::from_str("default_report_currency = \"JPY\"\n").expect("Failed to parse TOML");

        assert_eq!(config.default_report_currency, "JPY");
        assert_eq!(config.base_currency, "EUR");
        assert_eq!(config.rate_api_base_url, DEFAULT_FMP_BASE_URL);
    }

    #[test]
    fn test_invalid_toml_syntax() {
        let invalid_toml = r#"
base_currency = "EUR
"#;

        let result: Result<Config, _> = toml::from_str(invalid_toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let result: Result<Config, _> = toml::from_str("fetch_timeout_secs = \"soon\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_from_temp_file() {
        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        temp_file
            .write_all(b"base_currency = \"CHF\"\nfetch_timeout_secs = 1\n")
            .expect("Failed to write");

        let loaded = load_config_from(temp_file.path()).expect("Failed to load");
        assert_eq!(loaded.base_currency, "CHF");
        assert_eq!(loaded.fetch_timeout_secs, 1);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        assert!(load_config_from(&dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("config.toml");
        let config = Config {
            default_report_currency: "USD".to_string(),
            tracked_currencies: vec![],
            ..Config::default()
        };

        save_config(&config, &path).expect("Failed to save");
        assert_eq!(load_config_from(&path).expect("Failed to load"), config);
    }
}
