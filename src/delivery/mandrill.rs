use crate::delivery::{AlertSink, EmailMessage, Recipient};
use crate::error::AlertError;
use log::{debug, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Default Mandrill API base URL
pub const DEFAULT_ENDPOINT: &str = "https://mandrillapp.com/api/1.0";

/// Default timeout for a single send request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Mandrill transactional email sink
///
/// Sends each alert with one call to the `messages/send` API. No retries are
/// made; a failed call is reported as `AlertError::DeliveryFailed`.
pub struct MandrillSink {
    client: Client,
    api_key: String,
    endpoint: String,
}

/// Request format for the send API
#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    key: &'a str,
    message: SendMessage<'a>,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    text: &'a str,
    subject: &'a str,
    from_email: &'a str,
    from_name: &'a str,
    to: &'a [Recipient],
}

/// Per-recipient result returned by the send API
#[derive(Debug, Deserialize)]
struct SendResult {
    email: String,
    status: String,
    #[serde(default)]
    reject_reason: Option<String>,
}

/// Error body returned with a non-success status
#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    name: Option<String>,
    message: String,
}

impl MandrillSink {
    /// Create a sink talking to the public Mandrill endpoint
    ///
    /// # Errors
    ///
    /// Returns `AlertError::DeliveryFailed` if the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>) -> Result<Self, AlertError> {
        Self::with_endpoint(api_key, DEFAULT_ENDPOINT, DEFAULT_TIMEOUT)
    }

    /// Create a sink with a custom API base URL and request timeout
    pub fn with_endpoint(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AlertError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AlertError::DeliveryFailed(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: endpoint.into(),
        })
    }

    /// Format the send API URL
    fn api_url(&self) -> String {
        format!("{}/messages/send.json", self.endpoint.trim_end_matches('/'))
    }

    fn build_request<'a>(&'a self, message: &'a EmailMessage) -> SendRequest<'a> {
        SendRequest {
            key: &self.api_key,
            message: SendMessage {
                text: &message.text,
                subject: &message.subject,
                from_email: &message.from_email,
                from_name: &message.from_name,
                to: &message.recipients,
            },
        }
    }

    /// Interpret the per-recipient results of a successful call
    ///
    /// Fails only if no recipient accepted the message.
    fn check_results(results: &[SendResult]) -> Result<(), AlertError> {
        let mut rejected = Vec::new();
        for result in results {
            match result.status.as_str() {
                "rejected" | "invalid" => {
                    let reason = result.reject_reason.as_deref().unwrap_or("unknown");
                    warn!(
                        "Alert recipient {} {}: {}",
                        result.email, result.status, reason
                    );
                    rejected.push(format!("{} ({})", result.email, reason));
                }
                status => debug!("Alert to {} {}", result.email, status),
            }
        }

        if !results.is_empty() && rejected.len() == results.len() {
            return Err(AlertError::DeliveryFailed(format!(
                "All recipients rejected: {}",
                rejected.join(", ")
            )));
        }
        Ok(())
    }

    fn describe_api_error(status: reqwest::StatusCode, body: &str) -> String {
        match serde_json::from_str::<ApiError>(body) {
            Ok(api_error) => match api_error.name {
                Some(name) => format!(
                    "Mandrill API returned {} ({}): {}",
                    status, name, api_error.message
                ),
                None => format!("Mandrill API returned {}: {}", status, api_error.message),
            },
            Err(_) => format!("Mandrill API returned {}: {}", status, body),
        }
    }
}

impl AlertSink for MandrillSink {
    fn send<'a>(
        &'a self,
        message: &'a EmailMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), AlertError>> + Send + 'a>> {
        Box::pin(async move {
            let request = self.build_request(message);

            let response = self
                .client
                .post(self.api_url())
                .json(&request)
                .send()
                .await
                .map_err(|e| AlertError::DeliveryFailed(format!("HTTP request failed: {}", e)))?;

            if !response.status().is_success() {
                let status = response.status();
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(AlertError::DeliveryFailed(Self::describe_api_error(
                    status,
                    &error_text,
                )));
            }

            let results: Vec<SendResult> = response.json().await.map_err(|e| {
                AlertError::DeliveryFailed(format!("Failed to parse Mandrill response: {}", e))
            })?;

            Self::check_results(&results)
        })
    }
}
