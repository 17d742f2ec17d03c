//! Configuration loading for the Pulse client.
//!
//! All fields are required. No defaults.

use pulse_cache::CachePolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PulseConfig {
    pub api_base_url: String,
    pub data_source: DataSource,
    pub request_timeout_ms: u64,
    pub settings_path: PathBuf,
    pub export_dir: PathBuf,
    pub cache: CacheConfig,
    pub log: LogConfig,
}

/// Where dashboard data comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// The HTTP statistics/events service.
    Live,
    /// Built-in sample data, no network.
    Fixture,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    pub stale_after_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub sweep_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub json: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or PULSE_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

const MAX_RETRIES_LIMIT: u32 = 10;

impl PulseConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        Self::from_path(&path)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate a TOML document.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: PulseConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(invalid("api_base_url", "must not be empty"));
        }
        if self.data_source == DataSource::Live
            && !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://"))
        {
            return Err(invalid("api_base_url", "must start with http:// or https://"));
        }
        if self.request_timeout_ms == 0 {
            return Err(invalid("request_timeout_ms", "must be > 0"));
        }
        if self.settings_path.as_os_str().is_empty() {
            return Err(invalid("settings_path", "must not be empty"));
        }
        if self.export_dir.as_os_str().is_empty() {
            return Err(invalid("export_dir", "must not be empty"));
        }
        if self.cache.stale_after_ms == 0 {
            return Err(invalid("cache.stale_after_ms", "must be > 0"));
        }
        if self.cache.retry_delay_ms == 0 {
            return Err(invalid("cache.retry_delay_ms", "must be > 0"));
        }
        if self.cache.sweep_interval_ms == 0 {
            return Err(invalid("cache.sweep_interval_ms", "must be > 0"));
        }
        if self.cache.max_retries > MAX_RETRIES_LIMIT {
            return Err(ConfigError::InvalidValue {
                field: "cache.max_retries",
                reason: format!("must be <= {MAX_RETRIES_LIMIT}"),
            });
        }
        if self.log.filter.trim().is_empty() {
            return Err(invalid("log.filter", "must not be empty"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.cache.stale_after_ms)
    }

    /// Cache policy derived from the `[cache]` table and the request timeout.
    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy::default()
            .with_stale_after(self.stale_after())
            .with_max_retries(self.cache.max_retries)
            .with_retry_delay(Duration::from_millis(self.cache.retry_delay_ms))
            .with_request_timeout(self.request_timeout())
            .with_sweep_interval(Duration::from_millis(self.cache.sweep_interval_ms))
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("PULSE_CONFIG").ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}
