//! Environment variable handling and .env file management

use crate::error::{AppError, ErrorContext, Result};
use crate::types::{CongestionControl, Scheme};
use std::path::Path;

/// Environment variable configuration manager
pub struct EnvManager;

impl EnvManager {
    /// Load the given env file if it exists
    pub fn load_env_file(path: &Path, debug: bool) -> Result<()> {
        if path.exists() {
            dotenv::from_path(path).map_err(|e| {
                AppError::config(format!("Failed to load {}: {}", path.display(), e))
            })?;

            if debug {
                eprintln!("Loaded configuration from {}", path.display());
            }
        } else if debug {
            eprintln!("No {} file found, using defaults and CLI arguments", path.display());
        }

        Ok(())
    }

    /// Create example .env file content
    pub fn create_example_env_content() -> String {
        r#"# MSAK Throughput Client Configuration
#
# Values specified here are used as defaults and can be overridden by
# command-line arguments.

# Measurement server as host[:port]. Leave unset to use the Locate service.
# MSAK_SERVER=localhost:8080

# Number of parallel streams per phase (1-4)
# MSAK_STREAMS=2

# Duration of each phase in milliseconds
# MSAK_DURATION_MS=5000

# Congestion control algorithm requested from the server (bbr, cubic)
# MSAK_CC=bbr

# WebSocket scheme (ws, wss)
# MSAK_SCHEME=wss

# Per-stream byte limit, 0 for unlimited
# MSAK_BYTE_LIMIT=0

# Locate service endpoint
# MSAK_LOCATE_URL=https://locate.measurementlab.net/v2/nearest/msak/throughput1

# Client name reported to the server
# MSAK_CLIENT_NAME=msak-client-rs

# Enable colored output (true/false)
# ENABLE_COLOR=true

# Testing against a local development server:
# MSAK_SERVER=127.0.0.1:8080
# MSAK_SCHEME=ws
"#
        .to_string()
    }

    /// Save example .env file to disk
    pub fn save_example_env_file(path: &Path) -> Result<()> {
        std::fs::write(path, Self::create_example_env_content())
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Validate environment variable format before parsing
    pub fn validate_env_var(key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            "MSAK_SERVER" => {
                if !value.is_empty() {
                    crate::models::config::validate_server(value)
                        .map_err(|e| AppError::config(format!("Invalid MSAK_SERVER: {}", e)))?;
                }
            }
            "MSAK_STREAMS" => {
                let streams: usize = value
                    .parse()
                    .map_err(|e| AppError::config(format!("Invalid MSAK_STREAMS value '{}': {}", value, e)))?;
                let (min, max) = (crate::defaults::MIN_STREAMS, crate::defaults::MAX_STREAMS);
                if !(min..=max).contains(&streams) {
                    return Err(AppError::config(format!(
                        "MSAK_STREAMS must be between {} and {}, got: {}",
                        min, max, streams
                    )));
                }
            }
            "MSAK_DURATION_MS" => {
                let duration: u64 = value
                    .parse()
                    .map_err(|e| AppError::config(format!("Invalid MSAK_DURATION_MS value '{}': {}", value, e)))?;
                if duration == 0 || duration > crate::defaults::MAX_DURATION_MS {
                    return Err(AppError::config(format!(
                        "MSAK_DURATION_MS must be between 1 and {}, got: {}",
                        crate::defaults::MAX_DURATION_MS,
                        duration
                    )));
                }
            }
            "MSAK_CC" => {
                value.parse::<CongestionControl>()?;
            }
            "MSAK_SCHEME" => {
                value.parse::<Scheme>()?;
            }
            "MSAK_BYTE_LIMIT" => {
                value
                    .parse::<u64>()
                    .map_err(|e| AppError::config(format!("Invalid MSAK_BYTE_LIMIT value '{}': {}", value, e)))?;
            }
            "MSAK_LOCATE_URL" => {
                let parsed = url::Url::parse(value)
                    .map_err(|e| AppError::config(format!("Invalid MSAK_LOCATE_URL '{}': {}", value, e)))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(AppError::config(format!("Locate URL must use http or https: {}", value)));
                }
            }
            "MSAK_CLIENT_NAME" => {
                if value.is_empty() {
                    return Err(AppError::config("MSAK_CLIENT_NAME cannot be empty"));
                }
            }
            "ENABLE_COLOR" => {
                value
                    .parse::<bool>()
                    .map_err(|e| AppError::config(format!("Invalid ENABLE_COLOR value '{}': {}", value, e)))?;
            }
            _ => {}
        }

        Ok(())
    }

    /// Get list of all supported environment variables with descriptions
    pub fn get_supported_env_vars() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            ("MSAK_SERVER", "Measurement server as host[:port]", "localhost:8080"),
            ("MSAK_STREAMS", "Parallel streams per phase (1-4)", "2"),
            ("MSAK_DURATION_MS", "Phase duration in milliseconds", "5000"),
            ("MSAK_CC", "Congestion control algorithm", "bbr"),
            ("MSAK_SCHEME", "WebSocket scheme", "wss"),
            ("MSAK_BYTE_LIMIT", "Per-stream byte limit, 0 for unlimited", "0"),
            ("MSAK_LOCATE_URL", "Locate service endpoint", "https://locate.measurementlab.net/v2/nearest/msak/throughput1"),
            ("MSAK_CLIENT_NAME", "Client name reported to the server", "msak-client-rs"),
            ("ENABLE_COLOR", "Enable colored output", "true"),
        ]
    }

    /// Display environment variable help
    pub fn display_env_help() -> String {
        let mut help = String::new();
        help.push_str("Supported Environment Variables:\n\n");

        for (var, description, example) in Self::get_supported_env_vars() {
            help.push_str(&format!("  {:<18} {}\n", var, description));
            help.push_str(&format!("  {:<18} Example: {}\n\n", "", example));
        }

        help.push_str("Configuration Priority (highest to lowest):\n");
        help.push_str("  1. Command-line arguments\n");
        help.push_str("  2. Environment variables\n");
        help.push_str("  3. .env file values\n");
        help.push_str("  4. Default values\n");

        help
    }

    /// Validate the contents of an env file without loading it
    pub fn check_env_file(path: &Path) -> Result<Option<Vec<String>>> {
        if !path.exists() {
            return Ok(None);
        }

        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;

        let warnings = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let (key, value) = line.split_once('=')?;
                Self::validate_env_var(key.trim(), value)
                    .err()
                    .map(|e| format!("Line '{}': {}", line, e))
            })
            .collect();

        Ok(Some(warnings))
    }
}
