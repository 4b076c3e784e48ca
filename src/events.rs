//! Core event types consumed by the alert gate
//!
//! A [`LogEvent`] is the read-only input handed over by the logging pipeline,
//! one per logged record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Timestamp type for consistent time handling across the crate
pub type Timestamp = DateTime<Utc>;

/// A single structured log record
///
/// The context is positional: `[key1, value1, key2, value2, ...]`. An odd
/// number of elements is allowed and the trailing unpaired key is ignored
/// when rendering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEvent {
    /// When the record was logged
    #[serde(default = "Utc::now")]
    pub timestamp: Timestamp,
    /// Severity of the record
    pub level: Level,
    /// Log message
    pub message: String,
    /// Interleaved key/value context
    #[serde(default)]
    pub context: Vec<Value>,
    /// Module path or logger name of the emitting site, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Stack captured by the producer, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl LogEvent {
    /// Create an event timestamped now with no context
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            context: Vec::new(),
            target: None,
            stack: None,
        }
    }

    /// Append one key/value pair to the context
    pub fn with_pair(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.push(Value::String(key.into()));
        self.context.push(value.into());
        self
    }

    /// Replace the whole positional context
    pub fn with_context(mut self, context: Vec<Value>) -> Self {
        self.context = context;
        self
    }

    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Complete key/value pairs of the context, dropping a trailing odd key
    pub fn context_pairs(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.context
            .chunks_exact(2)
            .map(|pair| (&pair[0], &pair[1]))
    }
}

/// Severity level of a log record
///
/// Serialized uppercase; lowercase names are accepted on input.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    #[serde(alias = "trace")]
    Trace,
    #[serde(alias = "debug")]
    Debug,
    #[serde(alias = "info")]
    Info,
    #[serde(alias = "warn", alias = "warning", alias = "WARNING")]
    Warn,
    #[serde(alias = "error")]
    Error,
    /// Critical failure, above error
    #[serde(alias = "critical", alias = "CRIT", alias = "crit")]
    Critical,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<log::Level> for Level {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Level::Error,
            log::Level::Warn => Level::Warn,
            log::Level::Info => Level::Info,
            log::Level::Debug => Level::Debug,
            log::Level::Trace => Level::Trace,
        }
    }
}
