//! Configuration loading.
//!
//! Sources, lowest priority first: built-in defaults, a TOML file, then
//! `WBDASH_*` environment variables.

use crate::error::ConfigError;
use crate::models::YearRange;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub dashboard: DashboardConfig,
}

/// World Bank client settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Maximum number of indicator candidates returned by a search.
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// How many catalog entries a search scans.
    #[serde(default = "default_catalog_page_size")]
    pub catalog_page_size: u32,
}

fn default_base_url() -> String {
    "https://api.worldbank.org/v2".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_search_limit() -> usize {
    20
}

fn default_catalog_page_size() -> u32 {
    500
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            search_limit: default_search_limit(),
            catalog_page_size: default_catalog_page_size(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// What a country change does when no series are active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyPolicy {
    /// Load the built-in default indicator set for the new country.
    #[default]
    LoadDefaults,
    /// Stay empty.
    KeepEmpty,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    /// Source label used when the URL carries none.
    #[serde(default = "default_source")]
    pub default_source: String,

    /// Visible range used when the URL carries none (or a malformed one).
    #[serde(default)]
    pub default_range: YearRange,

    #[serde(default)]
    pub empty_policy: EmptyPolicy,
}

pub const DEFAULT_SOURCE: &str = "World Bank";

fn default_source() -> String {
    DEFAULT_SOURCE.to_string()
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            default_source: default_source(),
            default_range: YearRange::DEFAULT,
            empty_policy: EmptyPolicy::default(),
        }
    }
}

impl Config {
    /// Parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Explicit path if given, else `<config dir>/wbdash/config.toml` when it
    /// exists, else defaults. Environment overrides apply in every case.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(p) => {
                    log::debug!("loading config from {}", p.display());
                    Self::load(&p)?
                }
                None => Self::default(),
            },
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("wbdash").join("config.toml"))
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(url) = std::env::var("WBDASH_BASE_URL") {
            self.api.base_url = url;
        }
        if let Ok(raw) = std::env::var("WBDASH_TIMEOUT_SECS") {
            self.api.timeout_secs = raw.parse().map_err(|_| ConfigError::Env {
                key: "WBDASH_TIMEOUT_SECS",
                value: raw,
            })?;
        }
        Ok(())
    }
}
