//! MSAK throughput client
//!
//! Measures download and upload goodput against an MSAK throughput1 server.
//! Each test phase runs several WebSocket streams in parallel; every stream
//! reports client-side and server-side counters which are aggregated into a
//! phase-wide goodput, retransmission ratio and minimum RTT.

pub mod aggregate;
pub mod app;
pub mod cli;
pub mod codec;
pub mod config;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod models;
pub mod output;
pub mod session;
pub mod socket;
pub mod stream;
pub mod types;

// Re-export commonly used types
pub use error::{AppError, Result, StreamError};
pub use models::{Config, TestConfig, Measurement, StreamSnapshot, SessionResult};
pub use discovery::{EndpointPair, LocateClient, ServerDiscovery, StaticServer};
pub use session::{Callbacks, PhaseSummary, Session, SessionSummary};
pub use socket::ws::WsConnector;
pub use types::{CongestionControl, Direction, Scheme, SampleSource};

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Protocol constants and default configuration values
pub mod defaults {
    use std::time::Duration;

    /// Library identity sent to the server as metadata
    pub const LIBRARY_NAME: &str = "msak-client";
    pub const LIBRARY_VERSION: &str = env!("CARGO_PKG_VERSION");

    /// Value of the Sec-WebSocket-Protocol header
    pub const SUBPROTOCOL: &str = "net.measurementlab.throughput.v1";

    pub const DOWNLOAD_PATH: &str = "/throughput/v1/download";
    pub const UPLOAD_PATH: &str = "/throughput/v1/upload";

    pub const LOCATE_BASE_URL: &str = "https://locate.measurementlab.net/v2/nearest/";
    pub const LOCATE_RESOURCE_PATH: &str = "msak/throughput1";

    pub const DEFAULT_STREAMS: usize = 2;
    pub const MIN_STREAMS: usize = 1;
    pub const MAX_STREAMS: usize = 4;

    pub const DEFAULT_DURATION_MS: u64 = 5_000;
    pub const MAX_DURATION_MS: u64 = 20_000;

    /// Extra time a stream waits for the peer to close before forcing it
    pub const SAFETY_MARGIN: Duration = Duration::from_millis(1_000);

    /// Client measurement cadence on download streams
    pub const DOWNLOAD_MEASUREMENT_INTERVAL: Duration = Duration::from_millis(100);
    /// Client measurement cadence on upload streams
    pub const UPLOAD_MEASUREMENT_INTERVAL: Duration = Duration::from_millis(250);

    /// Initial upload message size (8 KiB)
    pub const INITIAL_MESSAGE_SIZE: usize = 1 << 13;
    /// Maximum upload message size (8 MiB)
    pub const MAX_MESSAGE_SIZE: usize = 1 << 23;
    /// The message size doubles once this many messages' worth of bytes went out
    pub const SCALING_FRACTION: u64 = 16;
    /// Number of messages kept queued ahead of the transport
    pub const SEND_BUFFER_MESSAGES: usize = 7;

    pub const DEFAULT_CLIENT_NAME: &str = "msak-client-rs";
    pub const LOCATE_TIMEOUT: Duration = Duration::from_secs(10);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    pub const DEFAULT_ENABLE_COLOR: bool = true;
}
