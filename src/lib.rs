/// Error types for alert delivery and configuration
pub mod error;

/// Log event types
pub mod events;

/// Admission gate, renderer and alert handler
pub mod alerts;

/// Delivery sinks (Mandrill, console, mock)
pub mod delivery;

/// Configuration management
pub mod config;

/// `log` crate integration
pub mod logger;

// Re-export commonly used types
pub use alerts::{AdmissionGate, AlertHandler, AlertOutcome, AlertPolicy, AlertRenderer};
pub use error::{AlertError, ConfigError};
pub use events::{Level, LogEvent};
pub use logger::AlertLogger;
