//! Process-level configuration for mavtables.
//!
//! Covers everything that is not part of the rule chains themselves:
//! logging, per-connection queue sizing and address expiry. The chain
//! definitions are loaded by `mavtables_filter::config`.
//!
//! Settings come from a YAML file, optionally merged with `MAVTABLES__*`
//! environment variables (e.g. `MAVTABLES__QUEUE__CAPACITY=512`).

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Main application configuration.
///
/// # Examples
///
/// ```
/// use mavtables_core::config::AppConfig;
///
/// let config = AppConfig::from_yaml("queue:\n  capacity: 64\n").unwrap();
/// assert_eq!(config.queue.capacity, Some(64));
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Outbound packet queue settings applied to every connection
    #[serde(default)]
    pub queue: QueueConfig,

    /// Address learning settings applied to every connection
    #[serde(default)]
    pub address_pool: AddressPoolConfig,
}

impl AppConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path.display().to_string()).into());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::from_yaml(&contents)
    }

    /// Loads configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML cannot be parsed.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Loads configuration through the `config` crate so that
    /// `MAVTABLES__<SECTION>__<KEY>` environment variables override the file.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded or merged.
    pub fn from_config_builder<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = config::Config::builder()
            .add_source(config::File::from(path).required(true))
            .add_source(
                config::Environment::with_prefix("MAVTABLES")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::LoadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        config.try_deserialize().map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error on an unknown log level, a zero queue capacity or a
    /// zero address timeout.
    pub fn validate(&self) -> Result<()> {
        self.logging.parse_level()?;

        if self.queue.capacity == Some(0) {
            return Err(ConfigError::invalid_value(
                "queue.capacity",
                "must be greater than zero (omit it for an unbounded queue)",
            )
            .into());
        }

        if self.address_pool.timeout_ms == Some(0) {
            return Err(ConfigError::invalid_value(
                "address_pool.timeout_ms",
                "must be greater than zero (omit it to disable expiry)",
            )
            .into());
        }

        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "text" or "json"
    #[serde(default)]
    pub format: LogFormat,

    /// Whether to include file/line info
    #[serde(default)]
    pub file_line: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
            file_line: false,
        }
    }
}

impl LoggingConfig {
    /// Parses the log level string to a tracing Level.
    pub fn parse_level(&self) -> Result<Level> {
        self.level.parse().map_err(|_| {
            ConfigError::invalid_value("logging.level", format!("Invalid log level: {}", self.level))
                .into()
        })
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for structured logging
    Json,
}

/// Per-connection packet queue settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum queued packets per connection; unbounded when absent
    #[serde(default)]
    pub capacity: Option<usize>,
}

/// Per-connection address pool settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPoolConfig {
    /// Forget addresses not heard from for this long; never when absent
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl AddressPoolConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}
