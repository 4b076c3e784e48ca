use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};
use mailgate::alerts::{AlertHandler, AlertOutcome, TokioScheduler};
use mailgate::config::Config;
use mailgate::delivery::{AlertSink, ConsoleSink};
use mailgate::events::LogEvent;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::sync::Arc;

/// Command-line arguments for the alert gate
#[derive(Parser)]
#[command(
    name = "mailgate",
    about = "Rate-limited email alerts for structured log events",
    long_about = "Reads newline-delimited JSON log events from stdin and sends each one as an \
                  email alert, limited to a maximum number of alerts per rolling hour and \
                  skipping alerts identical to the previous one."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(
        short,
        long,
        help = "Enable verbose logging output (sets RUST_LOG=debug)"
    )]
    verbose: bool,

    /// Print alerts instead of sending them
    #[arg(long, help = "Print rendered alerts to stdout instead of sending email")]
    dry_run: bool,
}

impl Cli {
    /// Validate the CLI arguments
    ///
    /// # Returns
    ///
    /// `Ok(())` if all arguments are valid, `Err(String)` with error message otherwise
    fn validate(&self) -> Result<(), String> {
        if self.config.exists() && !self.config.is_file() {
            return Err(format!(
                "Configuration path is not a file: {}",
                self.config.display()
            ));
        }

        if let Some(extension) = self.config.extension() {
            if extension != "toml" {
                warn!(
                    "Configuration file does not have .toml extension: {}",
                    self.config.display()
                );
            }
        }

        Ok(())
    }
}

/// Counters reported when input ends
#[derive(Debug, Default, PartialEq, Eq)]
struct RunSummary {
    sent: usize,
    rate_limited: usize,
    suppressed: usize,
    failed: usize,
    malformed: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: AlertOutcome) {
        match outcome {
            AlertOutcome::Sent => self.sent += 1,
            AlertOutcome::RateLimited => self.rate_limited += 1,
            AlertOutcome::Suppressed => self.suppressed += 1,
        }
    }
}

/// Parse one input line, `None` for blank lines
fn parse_event(line: &str) -> Option<Result<LogEvent, serde_json::Error>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(serde_json::from_str(trimmed))
}

/// Feed every event read from `input` through the handler
fn process_events<R: Read>(
    runtime: &tokio::runtime::Runtime,
    handler: &AlertHandler,
    input: R,
) -> anyhow::Result<RunSummary> {
    let mut summary = RunSummary::default();

    for (index, line) in BufReader::new(input).lines().enumerate() {
        let line = line.context("Failed to read log events from input")?;
        let event = match parse_event(&line) {
            None => continue,
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                warn!("Skipping malformed event on line {}: {}", index + 1, e);
                summary.malformed += 1;
                continue;
            }
        };

        match runtime.block_on(handler.handle(&event)) {
            Ok(outcome) => summary.record(outcome),
            Err(e) => {
                error!("Alert for line {} failed: {}", index + 1, e);
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

fn run(cli: &Cli) -> anyhow::Result<RunSummary> {
    let config = Config::from_file(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    let policy = config.policy().context("Invalid alert policy")?;

    let sink: Arc<dyn AlertSink> = if cli.dry_run {
        info!("Dry run: alerts will be printed, not sent");
        Arc::new(ConsoleSink)
    } else {
        Arc::new(config.mandrill_sink().context("Invalid delivery configuration")?)
    };

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let scheduler = Arc::new(TokioScheduler::new(runtime.handle().clone()));
    let handler = AlertHandler::with_renderer(policy, sink, scheduler, config.renderer());

    info!(
        "Forwarding log events to {} recipient(s), at most {} alerts per hour",
        handler.policy().recipients().len(),
        handler.policy().max_per_hour()
    );

    process_events(&runtime, &handler, std::io::stdin().lock())
}

fn main() {
    // Parse command-line arguments
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::init();

    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    match run(&cli) {
        Ok(summary) => info!(
            "Input closed: {} sent, {} rate limited, {} suppressed, {} failed, {} malformed",
            summary.sent, summary.rate_limited, summary.suppressed, summary.failed, summary.malformed
        ),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}
