//! Configuration management for the CLI

use crate::output::OutputFormat;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// CLI configuration stored in `~/.config/rbctl/config.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// API endpoint URL
    pub api_url: Option<String>,
    /// Default output format ("table" or "json")
    pub default_format: Option<String>,
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        let Some(config_path) = Self::config_path() else {
            return Ok(Self::default());
        };

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file {}", config_path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    pub fn default_format(&self) -> Result<OutputFormat> {
        match self.default_format.as_deref() {
            None | Some("table") => Ok(OutputFormat::Table),
            Some("json") => Ok(OutputFormat::Json),
            Some(other) => bail!("Unknown default_format {:?} in config file", other),
        }
    }

    /// Get the configuration file path
    fn config_path() -> Option<PathBuf> {
        let home = dirs_next::home_dir()?;
        Some(home.join(".config").join("rbctl").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_format() {
        assert!(matches!(
            Config::default().default_format().unwrap(),
            OutputFormat::Table
        ));

        let config = Config {
            api_url: None,
            default_format: Some("json".to_string()),
        };
        assert!(matches!(config.default_format().unwrap(), OutputFormat::Json));

        let config = Config {
            api_url: None,
            default_format: Some("yaml".to_string()),
        };
        assert!(config.default_format().is_err());
    }

    #[test]
    fn test_parse_config_file() {
        let config: Config =
            serde_json::from_str(r#"{"api_url": "http://rebalancer:8080"}"#).unwrap();
        assert_eq!(config.api_url.as_deref(), Some("http://rebalancer:8080"));
        assert!(config.default_format.is_none());
    }
}
