// src/config.rs
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::processing::sensor::SensorRouter;
use crate::request::DEFAULT_THUMBNAIL_DIMENSIONS;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderSettings,
    /// First day routed to the high-resolution sensor.
    #[serde(default = "default_high_res_available_from")]
    pub high_res_available_from: NaiveDate,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_thumbnail_dimensions")]
    pub thumbnail_dimensions: u32,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettings {
    pub base_url: Option<String>,
    /// Environment variable holding the bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            token_env: default_token_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderSettings::default(),
            high_res_available_from: default_high_res_available_from(),
            max_concurrency: default_max_concurrency(),
            thumbnail_dimensions: default_thumbnail_dimensions(),
        }
    }
}

fn default_high_res_available_from() -> NaiveDate {
    SensorRouter::default().high_res_from()
}

fn default_max_concurrency() -> usize {
    num_cpus::get().max(4)
}

fn default_thumbnail_dimensions() -> u32 {
    DEFAULT_THUMBNAIL_DIMENSIONS
}

fn default_token_env() -> String {
    "INDEX_PROVIDER_TOKEN".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

impl Config {
    /// Reads a JSON config; a missing path means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    pub fn router(&self) -> SensorRouter {
        SensorRouter::new(self.high_res_available_from)
    }

    /// Bearer token from the configured environment variable, if set.
    pub fn provider_token(&self) -> Option<String> {
        std::env::var(&self.provider.token_env)
            .ok()
            .filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_all_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.high_res_available_from.to_string(), "2017-03-28");
        assert_eq!(config.provider.timeout_secs, 60);
        assert_eq!(config.provider.token_env, "INDEX_PROVIDER_TOKEN");
        assert_eq!(config.thumbnail_dimensions, 1024);
        assert!(config.max_concurrency >= 4);
    }

    #[test]
    fn test_overrides() {
        let config: Config = serde_json::from_str(
            r#"{
                "provider": {"baseUrl": "https://imagery.test", "timeoutSecs": 5},
                "highResAvailableFrom": "2018-01-01",
                "maxConcurrency": 2
            }"#,
        )
        .unwrap();
        assert_eq!(config.provider.base_url.as_deref(), Some("https://imagery.test"));
        assert_eq!(config.provider.timeout_secs, 5);
        assert_eq!(config.provider.token_env, "INDEX_PROVIDER_TOKEN");
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(
            config.router().high_res_from(),
            NaiveDate::from_ymd_opt(2018, 1, 1).unwrap()
        );
    }

    #[test]
    fn test_missing_path_is_default() {
        assert_eq!(Config::load(None).unwrap(), Config::default());
        assert!(Config::load(Some(Path::new("/nonexistent/config.json"))).is_err());
    }
}
