//! Configuration loading and validation
//!
//! Configuration is read from a TOML file with an `[alerts]` table for the
//! alert policy and a `[mandrill]` table for the delivery API.

use crate::alerts::{AlertPolicy, AlertRenderer, DEFAULT_MAX_PER_HOUR};
use crate::delivery::mandrill::{DEFAULT_ENDPOINT, DEFAULT_TIMEOUT};
use crate::delivery::MandrillSink;
use crate::error::{AlertError, ConfigError};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub mandrill: MandrillConfig,
}

/// Alert policy settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertsConfig {
    /// Addresses every alert is sent to
    pub recipients: Vec<String>,
    #[serde(default)]
    pub from_email: String,
    #[serde(default)]
    pub from_name: String,
    #[serde(default)]
    pub subject_prefix: String,
    /// Alert ceiling per rolling hour
    #[serde(default = "default_max_per_hour")]
    pub max_per_hour: usize,
    /// Whether alert bodies carry a captured call stack
    #[serde(default = "default_include_stack")]
    pub include_stack: bool,
    /// Lowest log level forwarded by the logger adapter
    #[serde(default = "default_min_level")]
    pub min_level: String,
}

/// Mandrill delivery settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MandrillConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_max_per_hour() -> usize {
    DEFAULT_MAX_PER_HOUR
}

fn default_include_stack() -> bool {
    true
}

fn default_min_level() -> String {
    "error".to_string()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

impl Default for MandrillConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: default_endpoint(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReadError` if the file cannot be read,
    /// `ConfigError::TomlError` if it is not valid TOML for this schema, and
    /// `ConfigError::ValidationError` for out-of-range values.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        contents.parse()
    }

    /// Check values serde cannot check on its own
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Recipient and limit checks live with the policy itself
        self.policy()?;
        self.min_level()?;

        if self.mandrill.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "mandrill.timeout_seconds must be greater than zero".to_string(),
            ));
        }
        if self.mandrill.endpoint.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "mandrill.endpoint must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the alert policy described by `[alerts]`
    pub fn policy(&self) -> Result<AlertPolicy, ConfigError> {
        AlertPolicy::new(
            self.alerts.recipients.clone(),
            self.alerts.from_email.clone(),
            self.alerts.from_name.clone(),
            self.alerts.subject_prefix.clone(),
        )?
        .with_max_per_hour(self.alerts.max_per_hour)
    }

    pub fn renderer(&self) -> AlertRenderer {
        if self.alerts.include_stack {
            AlertRenderer::new()
        } else {
            AlertRenderer::without_stack()
        }
    }

    /// Parse `alerts.min_level` into a log level filter
    pub fn min_level(&self) -> Result<LevelFilter, ConfigError> {
        self.alerts.min_level.parse().map_err(|_| {
            ConfigError::ValidationError(format!(
                "unknown alerts.min_level '{}'",
                self.alerts.min_level
            ))
        })
    }

    /// Build the Mandrill sink described by `[mandrill]`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if no API key is configured.
    pub fn mandrill_sink(&self) -> Result<MandrillSink, ConfigError> {
        if self.mandrill.api_key.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "mandrill.api_key is required to send alerts".to_string(),
            ));
        }
        MandrillSink::with_endpoint(
            self.mandrill.api_key.clone(),
            self.mandrill.endpoint.clone(),
            Duration::from_secs(self.mandrill.timeout_seconds),
        )
        .map_err(|e: AlertError| ConfigError::ValidationError(e.to_string()))
    }
}
