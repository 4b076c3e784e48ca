use crate::alerts::{AdmissionGate, AlertPolicy, AlertRenderer, Scheduler};
use crate::delivery::{AlertSink, EmailMessage};
use crate::error::AlertError;
use crate::events::LogEvent;
use log::{debug, error, info};
use std::sync::Arc;

/// What happened to a log event handed to the [`AlertHandler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertOutcome {
    /// Rendered and accepted by the delivery sink
    Sent,
    /// Hourly budget exhausted; nothing rendered or sent
    RateLimited,
    /// Rendered body identical to the previous alert; not sent
    Suppressed,
}

/// Turns log events into delivered alert emails
///
/// Each event passes three stages in order: volume admission, rendering,
/// and duplicate suppression. Only then is the message handed to the sink.
/// An admitted event consumes hourly budget even if it is later suppressed
/// or its delivery fails.
///
/// The handler holds no lock while rendering or awaiting the sink, so slow
/// deliveries do not block other callers' admission checks.
pub struct AlertHandler {
    policy: AlertPolicy,
    gate: AdmissionGate,
    renderer: AlertRenderer,
    sink: Arc<dyn AlertSink>,
}

impl AlertHandler {
    /// Create a handler that captures stacks into alert bodies
    ///
    /// # Arguments
    ///
    /// * `policy` - Sender, recipients, subject prefix and hourly limit
    /// * `sink` - Where rendered alerts are delivered
    /// * `scheduler` - Runs the hourly release of admissions
    pub fn new(
        policy: AlertPolicy,
        sink: Arc<dyn AlertSink>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self::with_renderer(policy, sink, scheduler, AlertRenderer::new())
    }

    /// Create a handler with a specific renderer
    pub fn with_renderer(
        policy: AlertPolicy,
        sink: Arc<dyn AlertSink>,
        scheduler: Arc<dyn Scheduler>,
        renderer: AlertRenderer,
    ) -> Self {
        let gate = AdmissionGate::new(policy.max_per_hour(), scheduler);
        Self {
            policy,
            gate,
            renderer,
            sink,
        }
    }

    /// Process one log event
    ///
    /// # Returns
    ///
    /// `Ok(AlertOutcome)` describing whether the alert was sent, rate limited
    /// or suppressed as a duplicate.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::Serialization` if the event could not be rendered
    /// (nothing is sent) and `AlertError::DeliveryFailed` if the sink failed.
    /// Neither refunds the admission.
    pub async fn handle(&self, event: &LogEvent) -> Result<AlertOutcome, AlertError> {
        if !self.gate.request_admission() {
            debug!("Dropping alert due to rate limit: {}", event.message);
            return Ok(AlertOutcome::RateLimited);
        }

        let payload = self.renderer.render(event, &self.policy)?;

        if self.gate.should_suppress_duplicate(&payload.body) {
            debug!("Dropping duplicate alert: {}", payload.subject);
            return Ok(AlertOutcome::Suppressed);
        }

        let message = EmailMessage::from_payload(&self.policy, payload);
        match self.sink.send(&message).await {
            Ok(()) => {
                info!("Sent alert: {}", message.subject);
                Ok(AlertOutcome::Sent)
            }
            Err(e) => {
                error!("Failed to send alert '{}': {}", message.subject, e);
                Err(e)
            }
        }
    }

    pub fn policy(&self) -> &AlertPolicy {
        &self.policy
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{ManualScheduler, ADMISSION_WINDOW};
    use crate::delivery::MockSink;
    use crate::events::Level;
    use std::time::Duration;

    fn test_policy(max: usize) -> AlertPolicy {
        AlertPolicy::new(
            vec!["ops@example.com".to_string()],
            "alerts@example.com",
            "Alerts",
            "[ALERT]",
        )
        .unwrap()
        .with_max_per_hour(max)
        .unwrap()
    }

    fn create_test_handler(max: usize, sink: MockSink) -> (AlertHandler, ManualScheduler) {
        let scheduler = ManualScheduler::new();
        let handler = AlertHandler::with_renderer(
            test_policy(max),
            Arc::new(sink),
            Arc::new(scheduler.clone()),
            AlertRenderer::without_stack(),
        );
        (handler, scheduler)
    }

    fn disk_full() -> LogEvent {
        LogEvent::new(Level::Error, "disk full").with_pair("host", "db1")
    }

    #[tokio::test]
    async fn test_end_to_end_send_suppress_deny() {
        let sink = MockSink::new();
        let (handler, scheduler) = create_test_handler(1, sink.clone());
        let event_a = disk_full();
        let event_b = LogEvent::new(Level::Error, "cpu hot").with_pair("host", "db2");

        assert_eq!(handler.handle(&event_a).await.unwrap(), AlertOutcome::Sent);
        assert_eq!(handler.handle(&event_a).await.unwrap(), AlertOutcome::Suppressed);
        assert_eq!(handler.handle(&event_b).await.unwrap(), AlertOutcome::RateLimited);

        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "[ALERT] disk full");
        assert!(sent[0].text.contains("Message: disk full"));
        assert!(sent[0].text.contains("LogLevel: ERROR"));
        assert!(sent[0].text.contains("CTX:\nhost: db1"));
        assert_eq!(sent[0].recipients[0].email, "ops@example.com");

        // Both admissions of A expire together
        scheduler.advance(ADMISSION_WINDOW);
        assert_eq!(handler.handle(&event_b).await.unwrap(), AlertOutcome::Sent);
        assert_eq!(sink.send_count(), 2);
    }

    #[tokio::test]
    async fn test_duplicates_consume_budget() {
        let sink = MockSink::new();
        let (handler, _scheduler) = create_test_handler(2, sink.clone());
        let event = disk_full();

        assert_eq!(handler.handle(&event).await.unwrap(), AlertOutcome::Sent);
        assert_eq!(handler.handle(&event).await.unwrap(), AlertOutcome::Suppressed);
        assert_eq!(handler.handle(&event).await.unwrap(), AlertOutcome::Suppressed);
        assert_eq!(handler.gate().admitted_count(), 3);
        assert_eq!(handler.handle(&event).await.unwrap(), AlertOutcome::RateLimited);
        assert_eq!(sink.send_count(), 1);
    }

    #[tokio::test]
    async fn test_duplicates_with_captured_stack() {
        let sink = MockSink::new();
        let scheduler = ManualScheduler::new();
        let handler = AlertHandler::new(test_policy(10), Arc::new(sink.clone()), Arc::new(scheduler));
        let event = disk_full();

        // Same call site each time, so the captured stacks match
        let mut outcomes = Vec::new();
        for _ in 0..2 {
            outcomes.push(handler.handle(&event).await.unwrap());
        }

        assert_eq!(outcomes, vec![AlertOutcome::Sent, AlertOutcome::Suppressed]);
        assert!(sink.sent()[0].text.contains("\n\nStack:\n"));
    }

    #[tokio::test]
    async fn test_alternating_events_are_not_suppressed() {
        let sink = MockSink::new();
        let (handler, _scheduler) = create_test_handler(10, sink.clone());
        let a = disk_full();
        let b = LogEvent::new(Level::Warn, "slow query");

        for event in [&a, &b, &a, &b] {
            assert_eq!(handler.handle(event).await.unwrap(), AlertOutcome::Sent);
        }
        assert_eq!(sink.send_count(), 4);
    }

    #[tokio::test]
    async fn test_delivery_failure_keeps_budget_consumed() {
        let sink = MockSink::failing("smtp down");
        let (handler, scheduler) = create_test_handler(0, sink.clone());

        let result = handler.handle(&disk_full()).await;
        assert!(matches!(result, Err(AlertError::DeliveryFailed(_))));
        assert_eq!(handler.gate().admitted_count(), 1);

        let other = LogEvent::new(Level::Error, "another");
        assert_eq!(handler.handle(&other).await.unwrap(), AlertOutcome::RateLimited);

        scheduler.advance(Duration::from_secs(3600));
        assert_eq!(handler.gate().admitted_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_body_is_still_remembered() {
        // The failed attempt becomes the dedup reference, matching a sent one
        let sink = MockSink::failing("smtp down");
        let (handler, _scheduler) = create_test_handler(10, sink.clone());
        let event = disk_full();

        assert!(handler.handle(&event).await.is_err());
        assert_eq!(handler.handle(&event).await.unwrap(), AlertOutcome::Suppressed);
        assert_eq!(sink.send_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_expiry_with_tokio_scheduler() {
        let sink = MockSink::new();
        let handler = AlertHandler::with_renderer(
            test_policy(0),
            Arc::new(sink.clone()),
            Arc::new(crate::alerts::TokioScheduler::try_current().unwrap()),
            AlertRenderer::without_stack(),
        );
        let first = LogEvent::new(Level::Error, "first");
        let second = LogEvent::new(Level::Error, "second");

        assert_eq!(handler.handle(&first).await.unwrap(), AlertOutcome::Sent);
        assert_eq!(handler.handle(&second).await.unwrap(), AlertOutcome::RateLimited);

        tokio::time::sleep(ADMISSION_WINDOW - Duration::from_secs(1)).await;
        assert_eq!(handler.handle(&second).await.unwrap(), AlertOutcome::RateLimited);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(handler.handle(&second).await.unwrap(), AlertOutcome::Sent);
        assert_eq!(sink.send_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_handlers_share_budget() {
        let sink = MockSink::new();
        let (handler, _scheduler) = create_test_handler(4, sink.clone());
        let handler = Arc::new(handler);

        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    let event = LogEvent::new(Level::Error, format!("event {}", i));
                    handler.handle(&event).await.unwrap()
                })
            })
            .collect();

        let mut sent = 0;
        for task in tasks {
            if task.await.unwrap() == AlertOutcome::Sent {
                sent += 1;
            }
        }
        assert_eq!(sent, 5);
        assert_eq!(sink.send_count(), 5);
    }
}
