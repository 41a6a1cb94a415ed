//! Colored formatter implementation with terminal color support

use super::formatter::{
    format_bytes, format_duration, format_min_rtt, format_rate, format_ratio, sample_counters,
    FormattingOptions, OutputFormatter,
};
use crate::{
    discovery::EndpointPair,
    error::{AppError, Result, StreamError},
    models::{SessionResult, TestConfig},
    session::{MeasurementUpdate, PhaseSummary},
    types::{Direction, SampleSource},
};
use colored::*;
use std::fmt::Write as _;

/// Color scheme configuration
#[derive(Debug, Clone)]
pub struct ColorScheme {
    pub header: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
    pub info: Color,
    pub highlight: Color,
    pub muted: Color,
    pub border: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            header: Color::Blue,
            success: Color::Green,
            warning: Color::Yellow,
            error: Color::Red,
            info: Color::Cyan,
            highlight: Color::Magenta,
            muted: Color::BrightBlack,
            border: Color::BrightBlack,
        }
    }
}

/// Colored formatter implementation
pub struct ColoredFormatter {
    options: FormattingOptions,
    color_scheme: ColorScheme,
}

impl ColoredFormatter {
    /// Create a new colored formatter with options
    pub fn new(options: FormattingOptions) -> Self {
        Self::with_color_scheme(options, ColorScheme::default())
    }

    /// Create a colored formatter with custom color scheme
    pub fn with_color_scheme(options: FormattingOptions, color_scheme: ColorScheme) -> Self {
        Self {
            options,
            color_scheme,
        }
    }

    /// Apply color to text if colors are enabled
    fn colorize(&self, text: &str, color: Color) -> ColoredString {
        if self.options.enable_color {
            text.color(color)
        } else {
            text.normal()
        }
    }

    fn bold(&self, text: &str) -> ColoredString {
        if self.options.enable_color {
            text.bold()
        } else {
            text.normal()
        }
    }

    /// Bold and colored if colors are enabled
    fn strong(&self, text: &str, color: Color) -> ColoredString {
        if self.options.enable_color {
            text.bold().color(color)
        } else {
            text.normal()
        }
    }

    fn direction_color(&self, direction: Direction) -> Color {
        match direction {
            Direction::Download => self.color_scheme.info,
            Direction::Upload => self.color_scheme.highlight,
        }
    }

    /// Retransmission above 5% is shown as a warning, above 20% as an error
    fn ratio_colored(&self, ratio: Option<f64>) -> ColoredString {
        let text = format_ratio(ratio);
        let color = match ratio {
            None => self.color_scheme.muted,
            Some(r) if r > 0.20 => self.color_scheme.error,
            Some(r) if r > 0.05 => self.color_scheme.warning,
            Some(_) => self.color_scheme.success,
        };
        self.colorize(&text, color)
    }

    fn section_header(&self, title: &str, symbol: &str) -> String {
        let title = format!("{} {}", symbol, title);
        let underline = "─".repeat(title.chars().count());
        format!(
            "{}\n{}",
            self.strong(&title, self.color_scheme.header),
            self.colorize(&underline, self.color_scheme.border)
        )
    }
}

fn fmt_err(what: &str) -> impl Fn(std::fmt::Error) -> AppError + '_ {
    move |e| AppError::io(format!("Failed to format {}: {}", what, e))
}

impl OutputFormatter for ColoredFormatter {
    fn format_header(&self, title: &str) -> Result<String> {
        let mut output = String::new();
        let border = "═".repeat(title.chars().count() + 4);

        writeln!(output, "{}", self.colorize(&border, self.color_scheme.border)).map_err(fmt_err("header"))?;
        writeln!(output, "  {}  ", self.strong(title, self.color_scheme.header)).map_err(fmt_err("header"))?;
        write!(output, "{}", self.colorize(&border, self.color_scheme.border)).map_err(fmt_err("header"))?;

        Ok(output)
    }

    fn format_test_info(&self, config: &TestConfig, endpoints: &EndpointPair) -> Result<String> {
        let mut output = String::new();
        let host = endpoints.download.host_str().unwrap_or("unknown");
        let label = |s: &str| self.colorize(s, self.color_scheme.muted);

        writeln!(output, "🌐 {} {}", label("Server:    "), self.bold(host)).map_err(fmt_err("test info"))?;
        writeln!(output, "🔀 {} {}", label("Streams:   "), config.streams()).map_err(fmt_err("test info"))?;
        writeln!(output, "⏱️  {} {}", label("Duration:  "), format_duration(config.duration()))
            .map_err(fmt_err("test info"))?;
        write!(output, "📶 {} {}", label("Congestion:"), config.cc()).map_err(fmt_err("test info"))?;
        if let Some(limit) = config.byte_limit() {
            write!(output, "\n📦 {} {}", label("Byte limit:"), format_bytes(limit)).map_err(fmt_err("test info"))?;
        }

        Ok(output)
    }

    fn format_measurement(&self, update: &MeasurementUpdate) -> Result<String> {
        let tag = format!("[{} #{} {}]", update.direction, update.stream, update.sample.source);
        let tag = match update.sample.source {
            SampleSource::Client => self.colorize(&tag, self.direction_color(update.direction)),
            SampleSource::Server => self.colorize(&tag, self.color_scheme.muted),
        };
        Ok(format!(
            "{} {:>8} {:>14}  {}",
            tag,
            format_duration(update.elapsed),
            self.bold(&format_rate(update.stream_goodput_bps)),
            self.colorize(&sample_counters(update), self.color_scheme.muted)
        ))
    }

    fn format_aggregate(&self, result: &SessionResult) -> Result<String> {
        let direction = result.direction.to_string();
        Ok(format!(
            "{} {:>8}: {} ({} streams, retrans {}, minrtt {})",
            self.colorize(&direction, self.direction_color(result.direction)),
            format!("{:.1}s", result.elapsed_seconds),
            self.strong(&format_rate(result.goodput_bps), self.color_scheme.success),
            result.streams_reporting,
            self.ratio_colored(result.retransmission_ratio),
            format_min_rtt(result.min_rtt)
        ))
    }

    fn format_phase_summary(&self, summary: &PhaseSummary) -> Result<String> {
        let mut output = String::new();
        let result = &summary.result;
        let symbol = match summary.direction {
            Direction::Download => "⬇️",
            Direction::Upload => "⬆️",
        };

        let title = format!("{} summary", summary.direction);
        writeln!(output, "{}", self.section_header(&title, symbol)).map_err(fmt_err("summary"))?;
        writeln!(
            output,
            "🚀 Goodput:        {}",
            self.strong(&format_rate(result.goodput_bps), self.color_scheme.success)
        )
        .map_err(fmt_err("summary"))?;
        writeln!(output, "🔁 Retransmission: {}", self.ratio_colored(result.retransmission_ratio))
            .map_err(fmt_err("summary"))?;
        writeln!(output, "📡 Min RTT:        {}", format_min_rtt(result.min_rtt)).map_err(fmt_err("summary"))?;
        writeln!(output, "⏱️  Elapsed:        {:.2}s", result.elapsed_seconds).map_err(fmt_err("summary"))?;

        let ok = format!("{}/{} ok", summary.streams_closed, summary.streams);
        let ok_color = if summary.streams_closed == summary.streams {
            self.color_scheme.success
        } else if summary.all_failed() {
            self.color_scheme.error
        } else {
            self.color_scheme.warning
        };
        write!(output, "🔀 Streams:        {}", self.colorize(&ok, ok_color)).map_err(fmt_err("summary"))?;
        if summary.streams_errored > 0 {
            let errored = format!("{} errored", summary.streams_errored);
            write!(output, ", {}", self.colorize(&errored, self.color_scheme.error)).map_err(fmt_err("summary"))?;
        }
        if summary.forced_closures > 0 {
            let forced = format!("{} forced closed", summary.forced_closures);
            write!(output, ", {}", self.colorize(&forced, self.color_scheme.warning)).map_err(fmt_err("summary"))?;
        }

        if self.options.verbose_mode {
            for snapshot in &summary.snapshots {
                let line = format!(
                    "#{}: sent {} recv {}",
                    snapshot.id,
                    format_bytes(snapshot.bytes_sent),
                    format_bytes(snapshot.bytes_received)
                );
                write!(output, "\n   {}", self.colorize(&line, self.color_scheme.muted)).map_err(fmt_err("summary"))?;
            }
            for snapshot in &summary.failed {
                let line = format!(
                    "#{}: failed after recv {} (not counted)",
                    snapshot.id,
                    format_bytes(snapshot.bytes_received)
                );
                write!(output, "\n   {}", self.colorize(&line, self.color_scheme.error)).map_err(fmt_err("summary"))?;
            }
        }

        Ok(output)
    }

    fn format_stream_error(&self, error: &StreamError) -> Result<String> {
        let text = format!("{} stream #{}: {}", error.direction, error.stream, error.error);
        if error.terminal {
            self.format_error(&text)
        } else {
            self.format_warning(&text)
        }
    }

    fn format_error(&self, error: &str) -> Result<String> {
        Ok(format!("❌ {}", self.colorize(error, self.color_scheme.error)))
    }

    fn format_warning(&self, warning: &str) -> Result<String> {
        Ok(format!("⚠️  {}", self.colorize(warning, self.color_scheme.warning)))
    }

    fn format_success(&self, message: &str) -> Result<String> {
        Ok(format!("✅ {}", self.colorize(message, self.color_scheme.success)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::formatter::tests::{summary, update};

    fn formatter(enable_color: bool) -> ColoredFormatter {
        ColoredFormatter::new(FormattingOptions {
            enable_color,
            verbose_mode: false,
        })
    }

    #[test]
    fn test_uncolored_output_has_no_escape_codes() {
        let f = formatter(false);
        let text = f.format_phase_summary(&summary()).unwrap();
        assert!(!text.contains('\x1b'));
        assert!(text.contains("16.00 Mb/s"));
        assert!(text.contains("1/2 ok"));
        assert!(text.contains("1 forced closed"));
    }

    #[test]
    fn test_measurement_line_contents() {
        let line = formatter(false).format_measurement(&update()).unwrap();
        assert!(line.contains("[upload #1 client]"));
        assert!(line.contains("0.07 Mb/s"));
    }

    #[test]
    fn test_message_prefixes() {
        let f = formatter(false);
        assert_eq!(f.format_error("boom").unwrap(), "❌ boom");
        assert_eq!(f.format_success("done").unwrap(), "✅ done");
        assert!(f.format_warning("careful").unwrap().ends_with("careful"));
    }

    #[test]
    fn test_ratio_coloring_thresholds() {
        let f = formatter(true);
        assert_eq!(f.ratio_colored(Some(0.5)), "50.00%".color(Color::Red));
        assert_eq!(f.ratio_colored(Some(0.1)), "10.00%".color(Color::Yellow));
        assert_eq!(f.ratio_colored(Some(0.01)), "1.00%".color(Color::Green));
        assert_eq!(f.ratio_colored(None), "n/a".color(Color::BrightBlack));
    }
}
