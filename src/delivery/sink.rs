use crate::alerts::{AlertPayload, AlertPolicy};
use crate::error::AlertError;
use log::info;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

/// Display name attached to every alert recipient
pub const RECIPIENT_NAME: &str = "logging-recipient";

/// Trait for alert delivery implementations
///
/// A sink performs the actual transmission, including any network I/O,
/// authentication and timeouts. The alert handler awaits the result and
/// passes failures straight back to its caller.
pub trait AlertSink: Send + Sync {
    fn send<'a>(
        &'a self,
        message: &'a EmailMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), AlertError>> + Send + 'a>>;
}

/// How a recipient receives the message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecipientKind {
    To,
}

/// One addressee of an alert email
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recipient {
    pub email: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: RecipientKind,
}

/// A fully formed alert email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub from_email: String,
    pub from_name: String,
    pub subject: String,
    pub text: String,
    pub recipients: Vec<Recipient>,
}

impl EmailMessage {
    /// Address a rendered payload to every policy recipient as `to`
    pub fn from_payload(policy: &AlertPolicy, payload: AlertPayload) -> Self {
        let recipients = policy
            .recipients()
            .iter()
            .map(|email| Recipient {
                email: email.clone(),
                name: RECIPIENT_NAME.to_string(),
                kind: RecipientKind::To,
            })
            .collect();

        Self {
            from_email: policy.from_email().to_string(),
            from_name: policy.from_name().to_string(),
            subject: payload.subject,
            text: payload.body,
            recipients,
        }
    }
}

/// Mock sink for testing
///
/// Records every message it is asked to send. A failing mock records the
/// attempt and then returns `AlertError::DeliveryFailed`. Clones share the
/// same record.
#[derive(Debug, Clone, Default)]
pub struct MockSink {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
    failure: Option<String>,
}

impl MockSink {
    /// Create a mock sink that accepts every message
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock sink that rejects every message with the given reason
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            failure: Some(reason.into()),
        }
    }

    /// Messages handed to this sink so far, in order
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl AlertSink for MockSink {
    fn send<'a>(
        &'a self,
        message: &'a EmailMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), AlertError>> + Send + 'a>> {
        Box::pin(async move {
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(message.clone());

            match &self.failure {
                Some(reason) => Err(AlertError::DeliveryFailed(reason.clone())),
                None => Ok(()),
            }
        })
    }
}

/// Sink that prints messages to stdout instead of sending them
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    fn format_message(message: &EmailMessage) -> String {
        let to = message
            .recipients
            .iter()
            .map(|r| r.email.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "From: {} <{}>\nTo: {}\nSubject: {}\n\n{}\n",
            message.from_name, message.from_email, to, message.subject, message.text
        )
    }
}

impl AlertSink for ConsoleSink {
    fn send<'a>(
        &'a self,
        message: &'a EmailMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), AlertError>> + Send + 'a>> {
        Box::pin(async move {
            info!("DRY RUN - not sending alert: {}", message.subject);
            println!("{}", Self::format_message(message));
            Ok(())
        })
    }
}
