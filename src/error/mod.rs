//! Error handling for the throughput measurement client

use crate::types::Direction;
use thiserror::Error;

/// Custom error types for the throughput client
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppError {
    /// Invalid stream count, duration, congestion control, byte limit, ...
    #[error("Configuration error: {0}")]
    Config(String),

    /// No endpoint could be resolved for the session
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// Socket-level failure on a single measurement stream
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed control message received on a measurement stream
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(String),

    /// Parsing errors (URLs, JSON, etc.)
    #[error("Parsing error: {0}")]
    Parse(String),

    /// HTTP request errors (Locate service)
    #[error("HTTP request error: {0}")]
    Http(String),

    /// Operations the engine deliberately does not support
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new discovery error
    pub fn discovery<S: Into<String>>(message: S) -> Self {
        Self::Discovery(message.into())
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Create a new protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol(message.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout(message.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io(message.into())
    }

    /// Create a new parsing error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse(message.into())
    }

    /// Create a new HTTP request error
    pub fn http<S: Into<String>>(message: S) -> Self {
        Self::Http(message.into())
    }

    /// Create a new unsupported-operation error
    pub fn unsupported<S: Into<String>>(message: S) -> Self {
        Self::Unsupported(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Get error category for logging and reporting
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG",
            Self::Discovery(_) => "DISCOVERY",
            Self::Transport(_) => "TRANSPORT",
            Self::Protocol(_) => "PROTOCOL",
            Self::Timeout(_) => "TIMEOUT",
            Self::Validation(_) => "VALIDATION",
            Self::Io(_) => "IO",
            Self::Parse(_) => "PARSE",
            Self::Http(_) => "HTTP",
            Self::Unsupported(_) => "UNSUPPORTED",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Errors scoped to one measurement stream. They are reported through the
    /// phase error callback and never abort sibling streams.
    pub fn is_stream_local(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Protocol(_))
    }

    /// Check if a whole-session retry could succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Http(_) | Self::Timeout(_) | Self::Discovery(_) => true,
            Self::Config(_) | Self::Validation(_) | Self::Parse(_) | Self::Unsupported(_) => false,
            Self::Protocol(_) | Self::Io(_) | Self::Internal(_) => false,
        }
    }

    /// Get user-friendly error message with suggestions
    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::Config(msg) => {
                format!("Configuration problem: {}\n\nSuggestion: Check your .env file or command line arguments (streams 1-4, duration 1-20000ms, cc bbr|cubic).", msg)
            }
            Self::Discovery(msg) => {
                format!("Could not find a measurement server: {}\n\nSuggestion: Try again later or pass an explicit server with --server.", msg)
            }
            Self::Transport(msg) => {
                format!("Measurement stream failed: {}\n\nSuggestion: Check your internet connection and firewall settings.", msg)
            }
            Self::Protocol(msg) => {
                format!("Unexpected message from the server: {}\n\nSuggestion: The server may speak a different protocol version.", msg)
            }
            Self::Timeout(msg) => {
                format!("Operation timed out: {}\n\nSuggestion: Check your network connection or try a closer server.", msg)
            }
            Self::Validation(msg) => {
                format!("Invalid input: {}\n\nSuggestion: Check the format of your server address and metadata.", msg)
            }
            Self::Io(msg) => {
                format!("File operation failed: {}\n\nSuggestion: Check file permissions and disk space.", msg)
            }
            Self::Parse(msg) => {
                format!("Failed to parse data: {}\n\nSuggestion: Check the format of your input data or configuration files.", msg)
            }
            Self::Http(msg) => {
                format!("HTTP request failed: {}\n\nSuggestion: The discovery service may be unavailable. Try an explicit --server.", msg)
            }
            Self::Unsupported(msg) => {
                format!("Unsupported operation: {}", msg)
            }
            Self::Internal(msg) => {
                format!("Internal error: {}\n\nThis is likely a bug. Please report this issue with the error details.", msg)
            }
        }
    }

    /// Get exit code for this error type
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Validation(_) | Self::Parse(_) => 1,
            Self::Transport(_) | Self::Discovery(_) | Self::Http(_) => 2,
            Self::Timeout(_) => 3,
            Self::Protocol(_) => 4,
            Self::Io(_) => 5,
            Self::Unsupported(_) => 6,
            Self::Internal(_) => 99,
        }
    }

    /// Format error for console display with color coding
    pub fn format_for_console(&self, use_color: bool) -> String {
        let category = self.category();
        let message = self.to_string();

        if use_color {
            use colored::Colorize;
            match self {
                Self::Config(_) | Self::Validation(_) | Self::Parse(_) => {
                    format!("[{}] {}", category.red().bold(), message.red())
                }
                Self::Transport(_) | Self::Discovery(_) | Self::Http(_) => {
                    format!("[{}] {}", category.yellow().bold(), message.yellow())
                }
                Self::Timeout(_) => {
                    format!("[{}] {}", category.blue().bold(), message.blue())
                }
                Self::Protocol(_) => {
                    format!("[{}] {}", category.magenta().bold(), message.magenta())
                }
                Self::Io(_) | Self::Unsupported(_) => {
                    format!("[{}] {}", category.cyan().bold(), message.cyan())
                }
                Self::Internal(_) => {
                    format!("[{}] {}", category.bright_red().bold(), message.bright_red())
                }
            }
        } else {
            format!("[{}] {}", category, message)
        }
    }
}

/// An error raised by one measurement stream, as delivered to the phase
/// error callback.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamError {
    /// Stream index within its phase
    pub stream: usize,
    /// Phase the stream belonged to
    pub direction: Direction,
    /// Underlying error
    pub error: AppError,
    /// Whether the stream terminated because of this error
    pub terminal: bool,
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} stream #{}: {}", self.direction, self.stream, self.error)
    }
}

impl std::error::Error for StreamError {}

impl From<StreamError> for AppError {
    fn from(error: StreamError) -> Self {
        error.error
    }
}

// Standard library error conversions
impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<url::ParseError> for AppError {
    fn from(error: url::ParseError) -> Self {
        Self::parse(format!("URL parse error: {}", error))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::parse(format!("JSON parse error: {}", error))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::timeout(error.to_string())
        } else if error.is_decode() {
            Self::discovery(format!("Invalid discovery response: {}", error))
        } else {
            Self::http(error.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match error {
            WsError::Url(e) => Self::config(format!("Invalid measurement URL: {}", e)),
            WsError::Protocol(e) => Self::transport(format!("WebSocket protocol violation: {}", e)),
            other => Self::transport(other.to_string()),
        }
    }
}

impl From<dotenv::Error> for AppError {
    fn from(error: dotenv::Error) -> Self {
        Self::config(format!("Environment file error: {}", error))
    }
}

impl From<std::num::ParseIntError> for AppError {
    fn from(error: std::num::ParseIntError) -> Self {
        Self::parse(format!("Integer parse error: {}", error))
    }
}

// Anyhow integration
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::internal(error.to_string())
    }
}

/// Custom Result type for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Error context trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error, keeping its category
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;

    /// Add static context to an error
    fn context(self, message: &'static str) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<AppError>,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let original = e.into();
            let context = f();
            let wrap = |m: String| format!("{}: {}", context, m);
            match original {
                AppError::Config(m) => AppError::Config(wrap(m)),
                AppError::Discovery(m) => AppError::Discovery(wrap(m)),
                AppError::Transport(m) => AppError::Transport(wrap(m)),
                AppError::Protocol(m) => AppError::Protocol(wrap(m)),
                AppError::Timeout(m) => AppError::Timeout(wrap(m)),
                AppError::Validation(m) => AppError::Validation(wrap(m)),
                AppError::Io(m) => AppError::Io(wrap(m)),
                AppError::Parse(m) => AppError::Parse(wrap(m)),
                AppError::Http(m) => AppError::Http(wrap(m)),
                AppError::Unsupported(m) => AppError::Unsupported(wrap(m)),
                AppError::Internal(m) => AppError::Internal(wrap(m)),
            }
        })
    }

    fn context(self, message: &'static str) -> Result<T> {
        self.with_context(|| message.to_string())
    }
}

/// Error reporter for structured error logging and user feedback
pub struct ErrorReporter {
    pub use_color: bool,
    pub verbose: bool,
}

impl ErrorReporter {
    /// Create a new error reporter
    pub fn new(use_color: bool, verbose: bool) -> Self {
        Self { use_color, verbose }
    }

    /// Report an error to the user
    pub fn report_error(&self, error: &AppError) {
        eprintln!("{}", error.format_for_console(self.use_color));

        if self.verbose {
            eprintln!();
            eprintln!("{}", error.user_friendly_message());

            if error.is_recoverable() {
                eprintln!();
                if self.use_color {
                    use colored::Colorize;
                    eprintln!("{}", "This error might be temporary. You can try running the test again.".green());
                } else {
                    eprintln!("This error might be temporary. You can try running the test again.");
                }
            }
        }
    }

    /// Get formatted error summary, grouped by category
    pub fn format_error_summary(&self, errors: &[AppError]) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        let mut summary = format!("Found {} error(s):", errors.len());

        let mut groups: std::collections::BTreeMap<&'static str, Vec<&AppError>> = std::collections::BTreeMap::new();
        for error in errors {
            groups.entry(error.category()).or_default().push(error);
        }

        for (category, group) in groups {
            summary.push_str(&format!("\n  {}: {} error(s)", category, group.len()));
            if self.verbose {
                for error in group {
                    summary.push_str(&format!("\n    - {}", error));
                }
            }
        }

        summary
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}
