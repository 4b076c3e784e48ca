use thiserror::Error;

/// Errors that can occur while turning a log event into a delivered alert
///
/// Rate limiting and duplicate suppression are not errors; they are reported
/// through [`crate::alerts::AlertOutcome`].
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Failed to serialize log event: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to deliver alert: {0}")]
    DeliveryFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}
