//! Error types surfaced by the dashboard core.
//!
//! Network and decoding failures never reach this layer: the data source
//! degrades them to empty results. What remains are the user-visible
//! rejections of an explicit add and configuration problems.

use std::path::PathBuf;

/// Why an explicit "add indicator" request made no change.
///
/// The `Display` text is the warning shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddError {
    #[error("Please select a country first.")]
    NoCountrySelected,

    #[error("No data found for indicator {indicator} in country {country}.")]
    NoData { indicator: String, country: String },

    #[error("The country selection changed while {indicator} was loading.")]
    Superseded { indicator: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {value}")]
    Env { key: &'static str, value: String },
}
