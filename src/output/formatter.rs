//! Core formatting traits and the plain text implementation

use crate::{
    discovery::EndpointPair,
    error::{AppError, Result, StreamError},
    models::{SessionResult, TestConfig},
    session::{MeasurementUpdate, PhaseSummary},
    types::SampleSource,
};
use std::fmt::Write as _;
use std::time::Duration;

/// Main trait for output formatting
pub trait OutputFormatter: Send + Sync {
    /// Format a header section
    fn format_header(&self, title: &str) -> Result<String>;

    /// Format the test parameters and the chosen server
    fn format_test_info(&self, config: &TestConfig, endpoints: &EndpointPair) -> Result<String>;

    /// Format one client or server sample of a stream
    fn format_measurement(&self, update: &MeasurementUpdate) -> Result<String>;

    /// Format the running aggregate of a phase
    fn format_aggregate(&self, result: &SessionResult) -> Result<String>;

    /// Format the end-of-phase summary
    fn format_phase_summary(&self, summary: &PhaseSummary) -> Result<String>;

    /// Format an error reported by a single stream
    fn format_stream_error(&self, error: &StreamError) -> Result<String>;

    /// Format error messages
    fn format_error(&self, error: &str) -> Result<String>;

    /// Format warning messages
    fn format_warning(&self, warning: &str) -> Result<String>;

    /// Format success messages
    fn format_success(&self, message: &str) -> Result<String>;
}

/// Configuration options for formatting
#[derive(Debug, Clone)]
pub struct FormattingOptions {
    /// Enable colored output
    pub enable_color: bool,
    /// Show every sample, not only the aggregate
    pub verbose_mode: bool,
}

impl Default for FormattingOptions {
    fn default() -> Self {
        Self {
            enable_color: true,
            verbose_mode: false,
        }
    }
}

/// Plain text formatter implementation
pub struct PlainFormatter {
    options: FormattingOptions,
}

impl PlainFormatter {
    /// Create a new plain formatter with options
    pub fn new(options: FormattingOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &FormattingOptions {
        &self.options
    }
}

fn fmt_err(what: &str) -> impl Fn(std::fmt::Error) -> AppError + '_ {
    move |e| AppError::io(format!("Failed to format {}: {}", what, e))
}

/// Format a rate in bits per second as Mb/s
pub fn format_rate(bps: f64) -> String {
    format!("{:.2} Mb/s", bps / 1e6)
}

/// Format a duration in human-readable form
pub fn format_duration(duration: Duration) -> String {
    let micros = duration.as_micros();
    if micros < 1_000 {
        format!("{}μs", micros)
    } else if micros < 1_000_000 {
        format!("{:.1}ms", micros as f64 / 1_000.0)
    } else {
        format!("{:.2}s", duration.as_secs_f64())
    }
}

/// Format a byte count with binary units
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Format a ratio as a percentage, or "n/a" when unknown
pub fn format_ratio(ratio: Option<f64>) -> String {
    match ratio {
        Some(r) => format!("{:.2}%", r * 100.0),
        None => "n/a".to_string(),
    }
}

pub(crate) fn format_min_rtt(rtt: Option<Duration>) -> String {
    rtt.map(format_duration).unwrap_or_else(|| "n/a".to_string())
}

/// One-line description of the bytes a sample reports
pub(crate) fn sample_counters(update: &MeasurementUpdate) -> String {
    let app = &update.sample.measurement.application;
    match update.sample.source {
        SampleSource::Client => format!(
            "sent {} recv {}",
            format_bytes(app.bytes_sent),
            format_bytes(app.bytes_received)
        ),
        SampleSource::Server => {
            let mut line = format!(
                "sent {} recv {}",
                format_bytes(app.bytes_sent),
                format_bytes(app.bytes_received)
            );
            if let Some(rtt) = update
                .sample
                .measurement
                .tcp_info
                .and_then(|t| t.min_rtt)
            {
                line.push_str(&format!(" minrtt {}", format_duration(Duration::from_micros(rtt))));
            }
            line
        }
    }
}

impl OutputFormatter for PlainFormatter {
    fn format_header(&self, title: &str) -> Result<String> {
        let mut output = String::new();
        let border = "=".repeat(title.chars().count() + 4);

        writeln!(output, "{}", border).map_err(fmt_err("header"))?;
        writeln!(output, "  {}  ", title).map_err(fmt_err("header"))?;
        write!(output, "{}", border).map_err(fmt_err("header"))?;

        Ok(output)
    }

    fn format_test_info(&self, config: &TestConfig, endpoints: &EndpointPair) -> Result<String> {
        let mut output = String::new();
        let host = endpoints.download.host_str().unwrap_or("unknown");

        writeln!(output, "Server:     {}", host).map_err(fmt_err("test info"))?;
        writeln!(output, "Streams:    {}", config.streams()).map_err(fmt_err("test info"))?;
        writeln!(output, "Duration:   {}", format_duration(config.duration())).map_err(fmt_err("test info"))?;
        write!(output, "Congestion: {}", config.cc()).map_err(fmt_err("test info"))?;
        if let Some(limit) = config.byte_limit() {
            write!(output, "\nByte limit: {}", format_bytes(limit)).map_err(fmt_err("test info"))?;
        }

        Ok(output)
    }

    fn format_measurement(&self, update: &MeasurementUpdate) -> Result<String> {
        Ok(format!(
            "[{} #{} {}] {:>8} {:>14}  {}",
            update.direction,
            update.stream,
            update.sample.source,
            format_duration(update.elapsed),
            format_rate(update.stream_goodput_bps),
            sample_counters(update)
        ))
    }

    fn format_aggregate(&self, result: &SessionResult) -> Result<String> {
        Ok(format!(
            "{} {:>8}: {} ({} streams, retrans {}, minrtt {})",
            result.direction,
            format!("{:.1}s", result.elapsed_seconds),
            format_rate(result.goodput_bps),
            result.streams_reporting,
            format_ratio(result.retransmission_ratio),
            format_min_rtt(result.min_rtt)
        ))
    }

    fn format_phase_summary(&self, summary: &PhaseSummary) -> Result<String> {
        let mut output = String::new();
        let title = format!("{} summary:", summary.direction);
        let result = &summary.result;

        writeln!(output, "{}", title).map_err(fmt_err("summary"))?;
        writeln!(output, "{}", "-".repeat(title.len())).map_err(fmt_err("summary"))?;
        writeln!(output, "Goodput:         {}", format_rate(result.goodput_bps)).map_err(fmt_err("summary"))?;
        writeln!(output, "Retransmission:  {}", format_ratio(result.retransmission_ratio))
            .map_err(fmt_err("summary"))?;
        writeln!(output, "Min RTT:         {}", format_min_rtt(result.min_rtt)).map_err(fmt_err("summary"))?;
        writeln!(output, "Elapsed:         {:.2}s", result.elapsed_seconds).map_err(fmt_err("summary"))?;
        write!(
            output,
            "Streams:         {}/{} ok, {} errored",
            summary.streams_closed, summary.streams, summary.streams_errored
        )
        .map_err(fmt_err("summary"))?;
        if summary.forced_closures > 0 {
            write!(output, ", {} forced closed", summary.forced_closures).map_err(fmt_err("summary"))?;
        }

        if self.options.verbose_mode {
            for snapshot in &summary.snapshots {
                write!(
                    output,
                    "\n  #{}: sent {} recv {}",
                    snapshot.id,
                    format_bytes(snapshot.bytes_sent),
                    format_bytes(snapshot.bytes_received)
                )
                .map_err(fmt_err("summary"))?;
            }
            for snapshot in &summary.failed {
                write!(
                    output,
                    "\n  #{}: failed after recv {} (not counted)",
                    snapshot.id,
                    format_bytes(snapshot.bytes_received)
                )
                .map_err(fmt_err("summary"))?;
            }
        }

        Ok(output)
    }

    fn format_stream_error(&self, error: &StreamError) -> Result<String> {
        let kind = if error.terminal { "ERROR" } else { "WARNING" };
        Ok(format!(
            "{}: {} stream #{}: {}",
            kind, error.direction, error.stream, error.error
        ))
    }

    fn format_error(&self, error: &str) -> Result<String> {
        Ok(format!("ERROR: {}", error))
    }

    fn format_warning(&self, warning: &str) -> Result<String> {
        Ok(format!("WARNING: {}", warning))
    }

    fn format_success(&self, message: &str) -> Result<String> {
        Ok(format!("SUCCESS: {}", message))
    }
}
