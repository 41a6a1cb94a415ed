//! Type definitions and aliases

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Re-export commonly used types
pub use crate::error::{AppError, Result};

/// Direction of a test phase, and the role of each stream within it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The server sends bulk data, the client counts it
    Download,
    /// The client sends bulk data using adaptive message sizing
    Upload,
}

impl Direction {
    /// URL path of the measurement endpoint for this direction
    pub fn path(&self) -> &'static str {
        match self {
            Direction::Download => crate::defaults::DOWNLOAD_PATH,
            Direction::Upload => crate::defaults::UPLOAD_PATH,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Download => "download",
            Direction::Upload => "upload",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Congestion control algorithm requested from the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CongestionControl {
    #[default]
    Bbr,
    Cubic,
}

impl CongestionControl {
    pub const SUPPORTED: &'static [&'static str] = &["bbr", "cubic"];

    pub fn as_str(&self) -> &'static str {
        match self {
            CongestionControl::Bbr => "bbr",
            CongestionControl::Cubic => "cubic",
        }
    }
}

impl FromStr for CongestionControl {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bbr" => Ok(CongestionControl::Bbr),
            "cubic" => Ok(CongestionControl::Cubic),
            other => Err(AppError::config(format!(
                "Unsupported congestion control '{}', supported algorithms are {}",
                other,
                Self::SUPPORTED.join(", ")
            ))),
        }
    }
}

impl fmt::Display for CongestionControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// WebSocket scheme used for the measurement sockets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Ws,
    #[default]
    Wss,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Ws => "ws",
            Scheme::Wss => "wss",
        }
    }
}

impl FromStr for Scheme {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ws" => Ok(Scheme::Ws),
            "wss" => Ok(Scheme::Wss),
            other => Err(AppError::config(format!("Scheme must be 'ws' or 'wss', got '{}'", other))),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Origin of a measurement sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleSource {
    /// Counted locally by the stream engine
    Client,
    /// Reported by the peer in a control message
    Server,
}

impl fmt::Display for SampleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleSource::Client => f.write_str("client"),
            SampleSource::Server => f.write_str("server"),
        }
    }
}

/// Which phases a session runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseSelection {
    #[default]
    Both,
    DownloadOnly,
    UploadOnly,
}

impl PhaseSelection {
    /// Phases in the order they run
    pub fn directions(&self) -> &'static [Direction] {
        match self {
            PhaseSelection::Both => &[Direction::Download, Direction::Upload],
            PhaseSelection::DownloadOnly => &[Direction::Download],
            PhaseSelection::UploadOnly => &[Direction::Upload],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_congestion_control_parsing() {
        assert_eq!("bbr".parse::<CongestionControl>().unwrap(), CongestionControl::Bbr);
        assert_eq!(" CUBIC ".parse::<CongestionControl>().unwrap(), CongestionControl::Cubic);
        let err = "reno".parse::<CongestionControl>().unwrap_err();
        assert_eq!(err.category(), "CONFIG");
        assert!(err.to_string().contains("bbr, cubic"));
    }

    #[test]
    fn test_scheme_parsing() {
        assert_eq!("ws".parse::<Scheme>().unwrap(), Scheme::Ws);
        assert_eq!("WSS".parse::<Scheme>().unwrap(), Scheme::Wss);
        assert!("https".parse::<Scheme>().is_err());
    }

    #[test]
    fn test_direction_paths() {
        assert_eq!(Direction::Download.path(), "/throughput/v1/download");
        assert_eq!(Direction::Upload.path(), "/throughput/v1/upload");
        assert_eq!(Direction::Upload.to_string(), "upload");
    }

    #[test]
    fn test_phase_selection_order() {
        assert_eq!(PhaseSelection::Both.directions(), &[Direction::Download, Direction::Upload]);
        assert_eq!(PhaseSelection::UploadOnly.directions(), &[Direction::Upload]);
    }
}
