//! Application configuration data model and validation

use crate::models::TestConfig;
use crate::types::{AppError, CongestionControl, PhaseSelection, Result, Scheme};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Name identifying this client to the server
    #[serde(default = "default_client_name")]
    pub client_name: String,

    /// Version of this client
    #[serde(default = "default_client_version")]
    pub client_version: String,

    /// Explicit measurement server (`host[:port]`); Locate is used when unset
    #[serde(default)]
    pub server: Option<String>,

    /// Locate service endpoint used for server discovery
    #[serde(default = "default_locate_url")]
    pub locate_url: String,

    /// Parallel streams per phase
    #[serde(default = "default_streams")]
    pub streams: usize,

    /// Phase duration in milliseconds
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,

    #[serde(default)]
    pub cc: CongestionControl,

    #[serde(default)]
    pub scheme: Scheme,

    /// Per-stream byte limit, 0 for unlimited
    #[serde(default)]
    pub byte_limit: u64,

    /// Free-form metadata forwarded to the server
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,

    #[serde(default)]
    pub phases: PhaseSelection,

    /// Enable colored terminal output
    #[serde(default = "default_enable_color")]
    pub enable_color: bool,

    /// Enable verbose output
    #[serde(default)]
    pub verbose: bool,

    /// Enable debug output
    #[serde(default)]
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            client_version: default_client_version(),
            server: None,
            locate_url: default_locate_url(),
            streams: default_streams(),
            duration_ms: default_duration_ms(),
            cc: CongestionControl::default(),
            scheme: Scheme::default(),
            byte_limit: 0,
            metadata: BTreeMap::new(),
            phases: PhaseSelection::default(),
            enable_color: default_enable_color(),
            verbose: false,
            debug: false,
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration and return the first problem found
    pub fn validate(&self) -> Result<()> {
        if self.client_name.trim().is_empty() {
            return Err(AppError::config("Client name cannot be empty"));
        }

        if self.client_version.trim().is_empty() {
            return Err(AppError::config("Client version cannot be empty"));
        }

        if let Some(server) = &self.server {
            validate_server(server)?;
        }

        match url::Url::parse(&self.locate_url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            Ok(_) => {
                return Err(AppError::config(format!(
                    "Locate URL must use http or https: {}",
                    self.locate_url
                )))
            }
            Err(e) => {
                return Err(AppError::config(format!("Invalid locate URL '{}': {}", self.locate_url, e)));
            }
        }

        // Stream count, duration and metadata keys are checked by TestConfig
        self.test_config().map(|_| ())
    }

    /// Build the validated per-test parameters
    pub fn test_config(&self) -> Result<TestConfig> {
        TestConfig::new(
            self.streams,
            self.duration_ms,
            self.cc,
            self.scheme,
            self.byte_limit,
            self.metadata.clone(),
        )
    }

    /// Merge environment variables into this configuration
    pub fn merge_from_env(&mut self) -> Result<()> {
        if let Ok(server) = std::env::var("MSAK_SERVER") {
            let server = server.trim();
            self.server = (!server.is_empty()).then(|| server.to_string());
        }

        if let Ok(streams) = std::env::var("MSAK_STREAMS") {
            self.streams = streams
                .trim()
                .parse()
                .map_err(|e| AppError::config(format!("Invalid MSAK_STREAMS value '{}': {}", streams, e)))?;
        }

        if let Ok(duration) = std::env::var("MSAK_DURATION_MS") {
            self.duration_ms = duration
                .trim()
                .parse()
                .map_err(|e| AppError::config(format!("Invalid MSAK_DURATION_MS value '{}': {}", duration, e)))?;
        }

        if let Ok(cc) = std::env::var("MSAK_CC") {
            self.cc = cc.parse()?;
        }

        if let Ok(scheme) = std::env::var("MSAK_SCHEME") {
            self.scheme = scheme.parse()?;
        }

        if let Ok(limit) = std::env::var("MSAK_BYTE_LIMIT") {
            self.byte_limit = limit
                .trim()
                .parse()
                .map_err(|e| AppError::config(format!("Invalid MSAK_BYTE_LIMIT value '{}': {}", limit, e)))?;
        }

        if let Ok(locate_url) = std::env::var("MSAK_LOCATE_URL") {
            self.locate_url = locate_url.trim().to_string();
        }

        if let Ok(client_name) = std::env::var("MSAK_CLIENT_NAME") {
            self.client_name = client_name.trim().to_string();
        }

        if let Ok(enable_color) = std::env::var("ENABLE_COLOR") {
            self.enable_color = enable_color
                .trim()
                .parse()
                .map_err(|e| AppError::config(format!("Invalid ENABLE_COLOR value '{}': {}", enable_color, e)))?;
        }

        Ok(())
    }
}

/// A server is a bare authority: host with optional port, no scheme or path
pub(crate) fn validate_server(server: &str) -> Result<()> {
    if server.trim().is_empty() {
        return Err(AppError::validation("Server address cannot be empty"));
    }

    if server.contains("://") || server.contains('/') {
        return Err(AppError::validation(format!(
            "Server must be given as host[:port] without scheme or path, got '{}'",
            server
        )));
    }

    url::Url::parse(&format!("ws://{}/", server))
        .map_err(|e| AppError::validation(format!("Invalid server address '{}': {}", server, e)))?;

    Ok(())
}

// Default value functions for serde
fn default_client_name() -> String {
    crate::defaults::DEFAULT_CLIENT_NAME.to_string()
}

fn default_client_version() -> String {
    crate::VERSION.to_string()
}

fn default_locate_url() -> String {
    format!(
        "{}{}",
        crate::defaults::LOCATE_BASE_URL,
        crate::defaults::LOCATE_RESOURCE_PATH
    )
}

fn default_streams() -> usize {
    crate::defaults::DEFAULT_STREAMS
}

fn default_duration_ms() -> u64 {
    crate::defaults::DEFAULT_DURATION_MS
}

fn default_enable_color() -> bool {
    crate::defaults::DEFAULT_ENABLE_COLOR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.locate_url,
            "https://locate.measurementlab.net/v2/nearest/msak/throughput1"
        );
    }

    #[test]
    fn test_empty_client_name_invalid() {
        let mut config = Config::default();
        config.client_name = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_server_address_validation() {
        let mut config = Config::default();
        config.server = Some("localhost:8080".to_string());
        assert!(config.validate().is_ok());

        config.server = Some("wss://example.com".to_string());
        assert_eq!(config.validate().unwrap_err().category(), "VALIDATION");

        config.server = Some("example.com/path".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_http_locate_url_invalid() {
        let mut config = Config::default();
        config.locate_url = "ftp://locate.example".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_stream_count_checked_through_test_config() {
        let mut config = Config::default();
        config.streams = 5;
        assert_eq!(config.validate().unwrap_err().category(), "CONFIG");
    }

    #[test]
    fn test_test_config_carries_fields() {
        let mut config = Config::default();
        config.streams = 3;
        config.duration_ms = 2500;
        config.cc = CongestionControl::Cubic;
        config.byte_limit = 1_000;
        config.metadata.insert("site".to_string(), "lab".to_string());

        let test = config.test_config().unwrap();
        assert_eq!(test.streams(), 3);
        assert_eq!(test.duration_ms(), 2500);
        assert_eq!(test.cc(), CongestionControl::Cubic);
        assert_eq!(test.byte_limit(), Some(1_000));
        assert_eq!(test.metadata().len(), 1);
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: Config = serde_json::from_str(r#"{"streams": 4, "cc": "cubic"}"#).unwrap();
        assert_eq!(config.streams, 4);
        assert_eq!(config.cc, CongestionControl::Cubic);
        assert_eq!(config.duration_ms, 5000);
        assert!(config.enable_color);
    }
}
