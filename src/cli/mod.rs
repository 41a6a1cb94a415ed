//! Command-line interface

use crate::types::PhaseSelection;
use clap::{ArgAction, Parser};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// MSAK throughput client - measures download and upload goodput over
/// parallel WebSocket streams
#[derive(Parser, Debug, Clone)]
#[command(name = "msak")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Measurement server as host[:port]; the Locate service is used when omitted
    #[arg(long, value_name = "HOST[:PORT]")]
    pub server: Option<String>,

    /// Number of parallel streams per phase (1-4)
    #[arg(short, long)]
    pub streams: Option<usize>,

    /// Duration of each phase in milliseconds
    #[arg(short, long, value_name = "MS", value_parser = parse_duration_ms)]
    pub duration: Option<u64>,

    /// Congestion control algorithm requested from the server (bbr, cubic)
    #[arg(long)]
    pub cc: Option<String>,

    /// WebSocket scheme (ws, wss)
    #[arg(long)]
    pub scheme: Option<String>,

    /// Per-stream byte limit, 0 for unlimited
    #[arg(long = "bytes", value_name = "BYTES")]
    pub byte_limit: Option<u64>,

    /// Extra metadata sent to the server (can be used multiple times)
    #[arg(long, value_name = "KEY=VALUE", action = ArgAction::Append)]
    pub metadata: Vec<String>,

    /// Client name reported to the server
    #[arg(long)]
    pub client_name: Option<String>,

    /// Client version reported to the server
    #[arg(long)]
    pub client_version: Option<String>,

    /// Locate service URL used for server discovery
    #[arg(long)]
    pub locate_url: Option<String>,

    /// Run only the download phase
    #[arg(long)]
    pub download_only: bool,

    /// Run only the upload phase
    #[arg(long)]
    pub upload_only: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Print every measurement
    #[arg(long)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,

    /// List the supported environment variables and exit
    #[arg(long)]
    pub env_help: bool,

    /// Write an example .env file to PATH and exit
    #[arg(long, value_name = "PATH")]
    pub init_env: Option<PathBuf>,
}

impl Cli {
    /// Validate CLI arguments for conflicts and malformed values
    pub fn validate(&self) -> Result<(), String> {
        if self.download_only && self.upload_only {
            return Err("Cannot specify both --download-only and --upload-only".to_string());
        }

        if let Some(server) = &self.server {
            if server.contains("://") {
                return Err(format!(
                    "--server takes host[:port] without a scheme, use --scheme instead: {}",
                    server
                ));
            }
        }

        self.metadata_pairs().map(|_| ())
    }

    /// Parse the repeated `--metadata KEY=VALUE` arguments
    pub fn metadata_pairs(&self) -> Result<BTreeMap<String, String>, String> {
        let mut pairs = BTreeMap::new();
        for raw in &self.metadata {
            let (key, value) = raw
                .split_once('=')
                .ok_or_else(|| format!("Invalid metadata '{}', expected KEY=VALUE", raw))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(format!("Invalid metadata '{}': key cannot be empty", raw));
            }
            pairs.insert(key.to_string(), value.to_string());
        }
        Ok(pairs)
    }

    /// Phase selection requested by the flags, if any
    pub fn phases(&self) -> Option<PhaseSelection> {
        match (self.download_only, self.upload_only) {
            (true, false) => Some(PhaseSelection::DownloadOnly),
            (false, true) => Some(PhaseSelection::UploadOnly),
            _ => None,
        }
    }

    /// Check if colors should be enabled
    pub fn use_colors(&self) -> bool {
        !self.no_color && supports_color()
    }
}

fn parse_duration_ms(s: &str) -> Result<u64, String> {
    if s.starts_with('+') || s.starts_with("0x") || s.starts_with("0X") {
        return Err(format!("Invalid duration: {}", s));
    }

    let ms = s.parse::<u64>().map_err(|_| format!("Invalid duration: {}", s))?;
    if ms == 0 {
        Err("Duration must be greater than 0".to_string())
    } else {
        Ok(ms)
    }
}

/// Check if the terminal supports color output
fn supports_color() -> bool {
    if let Ok(term) = std::env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    if std::env::var("FORCE_COLOR").is_ok() {
        return true;
    }

    cfg!(unix)
}
