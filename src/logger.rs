//! `log` integration
//!
//! [`AlertLogger`] installs the alert pipeline as the process-wide logger.
//! Records at or above a threshold become [`LogEvent`]s and are run through
//! an [`AlertHandler`] on a small runtime owned by the logger. The logging
//! thread waits for the outcome before `log` returns.

use crate::alerts::{AlertHandler, AlertOutcome, AlertPolicy, AlertRenderer, TokioScheduler};
use crate::delivery::AlertSink;
use crate::error::AlertError;
use crate::events::LogEvent;
use chrono::Utc;
use log::kv::{self, Key, VisitSource};
use log::{LevelFilter, Log, Metadata, Record};
use serde_json::Value;
use std::sync::{mpsc, Arc};
use tokio::runtime::{Builder, Runtime};

/// Name of the threads that deliver alerts
pub const ALERT_THREAD_NAME: &str = "mailgate-alerts";

/// Targets whose records never become alerts
///
/// Our own diagnostics and the HTTP stack used for delivery would otherwise
/// feed back into the pipeline.
const IGNORED_TARGET_PREFIXES: &[&str] = &[
    env!("CARGO_CRATE_NAME"),
    "reqwest",
    "hyper",
    "hyper_util",
    "h2",
    "rustls",
    "tokio",
];

/// A `log::Log` that turns records into alert emails
pub struct AlertLogger {
    handler: Arc<AlertHandler>,
    runtime: Runtime,
    min_level: LevelFilter,
    inner: Option<Box<dyn Log>>,
}

impl AlertLogger {
    /// Create a logger forwarding records at `min_level` or above
    ///
    /// # Errors
    ///
    /// Returns `AlertError::IoError` if the delivery runtime cannot be started.
    pub fn new(
        policy: AlertPolicy,
        sink: Arc<dyn AlertSink>,
        renderer: AlertRenderer,
        min_level: LevelFilter,
    ) -> Result<Self, AlertError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name(ALERT_THREAD_NAME)
            .enable_all()
            .build()?;
        let scheduler = Arc::new(TokioScheduler::new(runtime.handle().clone()));
        let handler = Arc::new(AlertHandler::with_renderer(policy, sink, scheduler, renderer));

        Ok(Self {
            handler,
            runtime,
            min_level,
            inner: None,
        })
    }

    /// Also pass every record to another logger, e.g. `env_logger`
    pub fn with_inner(mut self, inner: Box<dyn Log>) -> Self {
        self.inner = Some(inner);
        self
    }

    /// Install as the global logger
    pub fn install(self) -> Result<(), log::SetLoggerError> {
        log::set_max_level(self.max_level());
        log::set_boxed_logger(Box::new(self))
    }

    /// Most verbose level this logger needs to see
    ///
    /// An inner logger filters for itself, so it opens everything up.
    fn max_level(&self) -> LevelFilter {
        let inner_level = self
            .inner
            .as_ref()
            .map(|_| LevelFilter::Trace)
            .unwrap_or(LevelFilter::Off);
        self.min_level.max(inner_level)
    }

    /// Run one record through the alert pipeline and wait for the outcome
    ///
    /// # Returns
    ///
    /// `Ok(None)` if the record is below the threshold or comes from an
    /// ignored source, otherwise the handler's outcome.
    pub fn dispatch(&self, record: &Record<'_>) -> Result<Option<AlertOutcome>, AlertError> {
        if !self.forwards(record.metadata()) || on_alert_thread() {
            return Ok(None);
        }

        let event = event_from_record(record);
        let handler = Arc::clone(&self.handler);
        let (tx, rx) = mpsc::channel();
        self.runtime.spawn(async move {
            let outcome = handler.handle(&event).await;
            let _ = tx.send(outcome);
        });

        match rx.recv() {
            Ok(outcome) => outcome.map(Some),
            Err(_) => Err(AlertError::DeliveryFailed(
                "alert task stopped before completing".to_string(),
            )),
        }
    }

    pub fn handler(&self) -> &AlertHandler {
        &self.handler
    }

    fn forwards(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.min_level
            && !IGNORED_TARGET_PREFIXES
                .iter()
                .any(|prefix| is_target_under(metadata.target(), prefix))
    }
}

impl Log for AlertLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.forwards(metadata)
            || self
                .inner
                .as_ref()
                .is_some_and(|inner| inner.enabled(metadata))
    }

    fn log(&self, record: &Record<'_>) {
        if let Some(inner) = &self.inner {
            inner.log(record);
        }
        // Logging through `log` here would re-enter this logger
        if let Err(e) = self.dispatch(record) {
            eprintln!("mailgate: failed to send alert: {}", e);
        }
    }

    fn flush(&self) {
        if let Some(inner) = &self.inner {
            inner.flush();
        }
    }
}

fn on_alert_thread() -> bool {
    std::thread::current().name() == Some(ALERT_THREAD_NAME)
}

fn is_target_under(target: &str, prefix: &str) -> bool {
    target == prefix
        || target
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with("::"))
}

/// Convert a `log` record into an event, flattening key-values into context
pub fn event_from_record(record: &Record<'_>) -> LogEvent {
    let mut collector = ContextCollector {
        context: Vec::new(),
    };
    // Visiting only fails if the visitor does, and ours never does
    let _ = record.key_values().visit(&mut collector);

    LogEvent {
        timestamp: Utc::now(),
        level: record.level().into(),
        message: record.args().to_string(),
        context: collector.context,
        target: Some(record.target().to_string()),
        stack: None,
    }
}

struct ContextCollector {
    context: Vec<Value>,
}

impl<'kvs> VisitSource<'kvs> for ContextCollector {
    fn visit_pair(&mut self, key: Key<'kvs>, value: kv::Value<'kvs>) -> Result<(), kv::Error> {
        self.context.push(Value::String(key.as_str().to_string()));
        self.context.push(Value::String(value.to_string()));
        Ok(())
    }
}
