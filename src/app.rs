//! Main application orchestration and execution

use crate::{
    cli::Cli,
    config::{display_config_summary, load_config},
    discovery::{LocateClient, QueryParams, ServerDiscovery, StaticServer},
    error::{AppError, ErrorReporter, Result},
    logging::{Logger, LoggerFactory},
    models::{Config, TestConfig},
    output::{OutputFormatter, OutputFormatterFactory},
    session::{Callbacks, Session, SessionSummary},
    socket::{ws::WsConnector, Connector},
    types::Direction,
};
use std::sync::Arc;

/// Main application struct that coordinates all components
pub struct App {
    config: Config,
    formatter: Arc<dyn OutputFormatter>,
    loggers: LoggerFactory,
}

impl App {
    pub fn new(config: Config) -> Self {
        let formatter = Arc::from(OutputFormatterFactory::from_config(&config));
        Self {
            loggers: LoggerFactory::new(config.clone()),
            config,
            formatter,
        }
    }

    /// Build the configuration from CLI arguments, env vars and `.env`
    pub fn from_cli(cli: Cli) -> Result<Self> {
        Ok(Self::new(load_config(cli)?))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the configured phases over real WebSocket connections
    pub async fn run(&self) -> Result<SessionSummary> {
        self.run_with(WsConnector::new()).await
    }

    /// Run the configured phases over connections made by `connector`.
    /// A phase in which no stream finished cleanly fails the run with the
    /// first error that phase saw.
    pub async fn run_with<C: Connector>(&self, connector: C) -> Result<SessionSummary> {
        let logger = self.loggers.create_logger("MSAK").await;
        logger
            .add_context_field("client_name".to_string(), &self.config.client_name)
            .await;

        let operation = logger.start_operation("measurement").await;
        let result = self.measure(connector, &logger).await;
        logger.end_operation(&operation, "measurement", result.is_ok()).await;

        if let Err(error) = &result {
            crate::log_error!(logger, "Measurement failed: {}", error);
        }
        result
    }

    async fn measure<C: Connector>(&self, connector: C, logger: &Logger) -> Result<SessionSummary> {
        let test = self.config.test_config()?;

        if self.config.debug {
            eprintln!("Configuration Summary:\n{}\n", display_config_summary(&self.config));
        }
        crate::log_debug!(logger, "Running {} stream(s) per phase for {} ms", test.streams(), test.duration_ms());

        let discovery = self.discovery(&test)?;
        let endpoints = discovery.next_endpoints().await?;
        logger
            .info("Selected measurement server")
            .field("discovery", discovery.name())
            .field("download_url", endpoints.download.as_str())
            .field("upload_url", endpoints.upload.as_str())
            .log()
            .await;

        println!(
            "{}",
            self.formatter
                .format_header(&format!("MSAK throughput test v{}", crate::VERSION))?
        );
        println!("{}\n", self.formatter.format_test_info(&test, &endpoints)?);

        let session = Session::new(connector, test).with_logger(logger.named("SESSION"));
        let mut callbacks = self.callbacks();
        let summary = session
            .run(&StaticServer::new(endpoints), self.config.phases, &mut callbacks)
            .await?;

        if let Some(text) = self.error_summary(&summary) {
            eprintln!("{}", text);
        }

        for phase in summary.phases() {
            if phase.all_failed() {
                crate::log_warn!(logger, "No {} stream completed", phase.direction);
                return Err(phase.errors.first().map(|e| e.error.clone()).unwrap_or_else(|| {
                    AppError::transport(format!("No {} stream completed", phase.direction))
                }));
            }
        }

        crate::log_info!(logger, "Measurement complete");
        println!("{}", self.formatter.format_success("Measurement complete")?);
        Ok(summary)
    }

    /// Stream errors of every phase grouped by category, or `None` when the
    /// session saw none
    fn error_summary(&self, summary: &SessionSummary) -> Option<String> {
        let errors: Vec<AppError> = summary
            .phases()
            .flat_map(|phase| phase.errors.iter().cloned().map(AppError::from))
            .collect();
        if errors.is_empty() {
            return None;
        }
        let reporter = ErrorReporter::new(self.config.enable_color, self.config.verbose);
        Some(reporter.format_error_summary(&errors))
    }

    /// Explicit server when configured, otherwise the Locate service
    fn discovery(&self, test: &TestConfig) -> Result<Box<dyn ServerDiscovery>> {
        let params = QueryParams::new(&self.config.client_name, &self.config.client_version, test);
        Ok(match &self.config.server {
            Some(server) => Box::new(StaticServer::for_server(test.scheme(), server, &params)?),
            None => Box::new(LocateClient::new(&self.config.locate_url, test.scheme(), params)?),
        })
    }

    /// Terminal output for a run: samples when verbose, the aggregate about
    /// once per second, stream errors, and a summary per phase
    fn callbacks(&self) -> Callbacks {
        let verbose = self.config.verbose;
        let samples = Arc::clone(&self.formatter);
        let aggregates = Arc::clone(&self.formatter);
        let errors = Arc::clone(&self.formatter);
        let summaries = Arc::clone(&self.formatter);
        let mut last_printed: Option<(Direction, u64)> = None;

        Callbacks::new()
            .on_measurement(move |update| {
                if verbose {
                    if let Ok(line) = samples.format_measurement(update) {
                        println!("{}", line);
                    }
                }
            })
            .on_result(move |result| {
                let second = result.elapsed_seconds.floor() as u64;
                if last_printed == Some((result.direction, second)) {
                    return;
                }
                last_printed = Some((result.direction, second));
                if let Ok(line) = aggregates.format_aggregate(result) {
                    println!("{}", line);
                }
            })
            .on_error(move |error| {
                if let Ok(line) = errors.format_stream_error(error) {
                    eprintln!("{}", line);
                }
            })
            .on_complete(move |summary| {
                if let Ok(text) = summaries.format_phase_summary(summary) {
                    println!("\n{}\n", text);
                }
            })
    }
}
