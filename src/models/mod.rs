//! Data models and structures for the throughput client

pub mod config;
pub mod measurement;
pub mod test_config;

// Re-export main model types
pub use config::Config;
pub use measurement::{ByteCounters, Measurement, Sample, ServerInfo, SessionResult, StreamSnapshot, TcpInfo, BbrInfo};
pub use test_config::{TestConfig, TestConfigBuilder};
