//! Output formatting and display system
//!
//! Formatters turn measurement progress and phase summaries into terminal
//! text, either plain or with ANSI colors.

mod colored;
mod formatter;

pub use self::colored::{ColorScheme, ColoredFormatter};
pub use formatter::{
    format_bytes, format_duration, format_rate, format_ratio, FormattingOptions, OutputFormatter,
    PlainFormatter,
};

/// Output formatting factory for creating appropriate formatters
pub struct OutputFormatterFactory;

impl OutputFormatterFactory {
    /// Create a formatter based on color support and preferences
    pub fn create_formatter(enable_color: bool, verbose: bool) -> Box<dyn OutputFormatter> {
        let options = FormattingOptions {
            enable_color,
            verbose_mode: verbose,
        };

        if enable_color {
            Box::new(ColoredFormatter::new(options))
        } else {
            Box::new(PlainFormatter::new(options))
        }
    }

    /// Create a formatter from the application configuration
    pub fn from_config(config: &crate::models::Config) -> Box<dyn OutputFormatter> {
        Self::create_formatter(config.enable_color, config.verbose)
    }

    /// Create a plain text formatter for scripts/logs
    pub fn create_plain_formatter() -> Box<dyn OutputFormatter> {
        Self::create_formatter(false, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_picks_formatter() {
        let plain = OutputFormatterFactory::create_plain_formatter();
        assert_eq!(plain.format_error("x").unwrap(), "ERROR: x");

        let colored = OutputFormatterFactory::create_formatter(true, false);
        assert!(colored.format_error("x").unwrap().starts_with("❌"));

        let mut config = crate::models::Config::default();
        config.enable_color = false;
        let from_config = OutputFormatterFactory::from_config(&config);
        assert_eq!(from_config.format_warning("w").unwrap(), "WARNING: w");
    }
}
