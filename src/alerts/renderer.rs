use crate::alerts::AlertPolicy;
use crate::error::AlertError;
use crate::events::LogEvent;
use chrono::SecondsFormat;
use serde_json::Value;
use std::backtrace::Backtrace;

/// Subject and body of an alert, ready for delivery
///
/// The body doubles as the key for duplicate suppression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertPayload {
    pub subject: String,
    pub body: String,
}

/// Turns log events into alert text
///
/// The body has a fixed layout: message, level, UTC time, a `CTX:` section
/// with one line per context pair, a `Raw:` section with the event as JSON,
/// and a `Stack:` section.
///
/// The stack is the renderer's own call stack at render time, not the stack
/// of the code that logged the event.
#[derive(Debug, Clone, Copy)]
pub struct AlertRenderer {
    capture_stack: bool,
}

impl Default for AlertRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertRenderer {
    /// Renderer that captures the call stack into every body
    pub fn new() -> Self {
        Self {
            capture_stack: true,
        }
    }

    /// Renderer that leaves the `Stack:` section empty
    pub fn without_stack() -> Self {
        Self {
            capture_stack: false,
        }
    }

    pub fn captures_stack(&self) -> bool {
        self.capture_stack
    }

    /// Render an event under the given policy
    ///
    /// # Errors
    ///
    /// Returns `AlertError::Serialization` if the event cannot be encoded as
    /// JSON for the raw section. No partial payload is produced.
    ///
    /// A [`LogEvent`] holds only strings, a chrono timestamp and
    /// `serde_json::Value`s, all of which always encode, so this does not
    /// happen in practice. The `Result` is kept so callers handle the raw
    /// dump the same way as delivery failures.
    pub fn render(&self, event: &LogEvent, policy: &AlertPolicy) -> Result<AlertPayload, AlertError> {
        let subject = format!("{} {}", policy.subject_prefix(), event.message)
            .trim()
            .to_string();

        let raw = serde_json::to_string(event)?;

        let mut lines = vec![
            format!("Message: {}", event.message),
            format!("LogLevel: {}", event.level),
            format!(
                "Time (UTC): {}",
                event.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
            "\nCTX:".to_string(),
        ];
        lines.extend(
            event
                .context_pairs()
                .map(|(key, value)| format!("{}: {}", display_value(key), display_value(value))),
        );
        lines.push(format!("\nRaw:\n{}", raw));

        let stack = if self.capture_stack {
            Backtrace::force_capture().to_string()
        } else {
            String::new()
        };
        let body = format!("{}\n\nStack:\n{}", lines.join("\n"), stack);

        Ok(AlertPayload { subject, body })
    }
}

/// Strings render bare, everything else as compact JSON
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
