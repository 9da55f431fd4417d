//! TOML configuration for the fetch and check jobs.
//!
//! Every field has a default, so an empty file (or no file at all) gives the
//! stock setup: NQ1! at 1m and 5m plus ES1! at 1m from CME_MINI, 500 bars per
//! request, monthly partitions under `data/`.

use barsync_core::data::{Credentials, PartitionMode, MAX_BARS_PER_REQUEST};
use barsync_core::domain::{Interval, SeriesSpec};
use barsync_core::quality::{CheckOptions, PriceRange};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable overriding the configured provider username.
pub const USERNAME_ENV: &str = "BARSYNC_TV_USERNAME";
/// Environment variable overriding the configured provider password.
pub const PASSWORD_ENV: &str = "BARSYNC_TV_PASSWORD";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Which chart provider the fetcher talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Tradingview,
    Yahoo,
}

/// One series entry in `[[series]]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesConfig {
    pub symbol: String,
    #[serde(default)]
    pub exchange: String,
    pub interval: Interval,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<u32>,
    /// Storage folder under the data dir. Defaults to `<TICKER>_<interval>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
}

impl SeriesConfig {
    pub fn new(symbol: &str, exchange: &str, interval: Interval) -> Self {
        Self {
            symbol: symbol.to_string(),
            exchange: exchange.to_string(),
            interval,
            contract: None,
            folder: None,
        }
    }

    pub fn spec(&self) -> SeriesSpec {
        SeriesSpec {
            symbol: self.symbol.clone(),
            exchange: self.exchange.clone(),
            interval: self.interval,
            contract: self.contract,
        }
    }

    pub fn folder(&self) -> String {
        self.folder
            .clone()
            .unwrap_or_else(|| self.spec().default_folder())
    }
}

/// Optional provider login. The password is never serialized or printed.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<SecretString>,
}

impl CredentialsConfig {
    /// Username and password from the environment replace configured ones.
    pub fn apply_env(&mut self) {
        if let Ok(username) = std::env::var(USERNAME_ENV) {
            if !username.is_empty() {
                self.username = Some(username);
            }
        }
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            if !password.is_empty() {
                self.password = Some(SecretString::new(password.into()));
            }
        }
    }

    /// Login credentials, or `None` for anonymous access.
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) if !username.is_empty() => Some(Credentials {
                username: username.clone(),
                password: SecretString::new(password.expose_secret().into()),
            }),
            _ => None,
        }
    }
}

/// Fetcher configuration.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub data_dir: PathBuf,
    pub run_log: PathBuf,
    /// Bars requested per series; clamped to the provider maximum.
    pub n_bars: usize,
    pub provider: ProviderKind,
    pub partition: PartitionMode,
    /// Request extended-hours bars where the provider supports it.
    pub extended_session: bool,
    pub timeout_secs: u64,
    pub credentials: CredentialsConfig,
    pub series: Vec<SeriesConfig>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            run_log: PathBuf::from("run_log.txt"),
            n_bars: 500,
            provider: ProviderKind::default(),
            partition: PartitionMode::Monthly,
            extended_session: false,
            timeout_secs: 10,
            credentials: CredentialsConfig::default(),
            series: vec![
                SeriesConfig::new("NQ1!", "CME_MINI", Interval::Min1),
                SeriesConfig::new("NQ1!", "CME_MINI", Interval::Min5),
                SeriesConfig::new("ES1!", "CME_MINI", Interval::Min1),
            ],
        }
    }
}

impl FetchConfig {
    /// Load a fetch config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a fetch config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_bars == 0 {
            return Err(ConfigError::Invalid("n_bars must be at least 1".into()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be at least 1".into()));
        }
        for series in &self.series {
            if series.symbol.trim().is_empty() {
                return Err(ConfigError::Invalid("series with empty symbol".into()));
            }
            if series.folder.as_deref().is_some_and(|f| f.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "series {} has an empty folder",
                    series.spec()
                )));
            }
        }
        Ok(())
    }

    /// Bar count actually requested from the provider.
    pub fn effective_n_bars(&self) -> usize {
        if self.n_bars > MAX_BARS_PER_REQUEST {
            tracing::warn!(
                requested = self.n_bars,
                max = MAX_BARS_PER_REQUEST,
                "n_bars above provider maximum, clamping"
            );
        }
        self.n_bars.clamp(1, MAX_BARS_PER_REQUEST)
    }
}

/// One file in `[[targets]]`, with optional per-file overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckTarget {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_interval: Option<Interval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_range: Option<PriceRange>,
}

/// Checker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    pub report: PathBuf,
    /// Searched recursively for `*.csv` when `targets` is empty.
    pub scan_dir: PathBuf,
    /// Cadence for every file unless a target overrides it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_interval: Option<Interval>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_range: Option<PriceRange>,
    pub targets: Vec<CheckTarget>,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            report: PathBuf::from("quality_report.txt"),
            scan_dir: PathBuf::from("data"),
            expected_interval: None,
            price_range: None,
            targets: Vec::new(),
        }
    }
}

impl CheckConfig {
    /// Load a check config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a check config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let intervals = std::iter::once(self.expected_interval)
            .chain(self.targets.iter().map(|t| t.expected_interval))
            .flatten();
        for interval in intervals {
            if interval.duration().is_none() {
                return Err(ConfigError::Invalid(format!(
                    "expected_interval {interval} has no fixed length"
                )));
            }
        }

        let ranges = std::iter::once(self.price_range)
            .chain(self.targets.iter().map(|t| t.price_range))
            .flatten();
        for range in ranges {
            if !(range.min <= range.max) {
                return Err(ConfigError::Invalid(format!(
                    "price_range min {} exceeds max {}",
                    range.min, range.max
                )));
            }
        }
        Ok(())
    }

    /// Check options for a target, falling back to the global settings.
    pub fn options_for(&self, target: Option<&CheckTarget>) -> CheckOptions {
        let interval = target
            .and_then(|t| t.expected_interval)
            .or(self.expected_interval);
        CheckOptions {
            expected_interval: interval.and_then(Interval::duration),
            price_range: target.and_then(|t| t.price_range).or(self.price_range),
        }
    }
}
