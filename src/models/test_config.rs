//! Validated, immutable parameters of one throughput test

use crate::defaults::{DEFAULT_DURATION_MS, DEFAULT_STREAMS, MAX_DURATION_MS, MAX_STREAMS, MIN_STREAMS, SAFETY_MARGIN};
use crate::error::{AppError, Result};
use crate::types::{CongestionControl, Scheme};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Parameters shared by every stream of a test. Construction validates all
/// fields, so a `TestConfig` that exists is always usable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestConfig {
    streams: usize,
    duration_ms: u64,
    cc: CongestionControl,
    scheme: Scheme,
    byte_limit: u64,
    metadata: BTreeMap<String, String>,
}

impl TestConfig {
    pub fn new(
        streams: usize,
        duration_ms: u64,
        cc: CongestionControl,
        scheme: Scheme,
        byte_limit: u64,
        metadata: BTreeMap<String, String>,
    ) -> Result<Self> {
        if !(MIN_STREAMS..=MAX_STREAMS).contains(&streams) {
            return Err(AppError::config(format!(
                "number of streams must be between {} and {}, got {}",
                MIN_STREAMS, MAX_STREAMS, streams
            )));
        }

        if duration_ms == 0 || duration_ms > MAX_DURATION_MS {
            return Err(AppError::config(format!(
                "duration must be between 1 and {} ms, got {}",
                MAX_DURATION_MS, duration_ms
            )));
        }

        if let Some(key) = metadata.keys().find(|k| k.trim().is_empty()) {
            return Err(AppError::config(format!("metadata key cannot be empty ('{}')", key)));
        }

        Ok(Self {
            streams,
            duration_ms,
            cc,
            scheme,
            byte_limit,
            metadata,
        })
    }

    pub fn builder() -> TestConfigBuilder {
        TestConfigBuilder::default()
    }

    pub fn streams(&self) -> usize {
        self.streams
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// Time after which a stream is force-closed if the peer has not closed it
    pub fn safety_timeout(&self) -> Duration {
        self.duration() + SAFETY_MARGIN
    }

    pub fn cc(&self) -> CongestionControl {
        self.cc
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Byte limit per stream, `None` when unlimited
    pub fn byte_limit(&self) -> Option<u64> {
        (self.byte_limit > 0).then_some(self.byte_limit)
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            streams: DEFAULT_STREAMS,
            duration_ms: DEFAULT_DURATION_MS,
            cc: CongestionControl::default(),
            scheme: Scheme::default(),
            byte_limit: 0,
            metadata: BTreeMap::new(),
        }
    }
}

/// Builder starting from the default test parameters
#[derive(Debug, Clone)]
pub struct TestConfigBuilder {
    streams: usize,
    duration_ms: u64,
    cc: CongestionControl,
    scheme: Scheme,
    byte_limit: u64,
    metadata: BTreeMap<String, String>,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        let defaults = TestConfig::default();
        Self {
            streams: defaults.streams,
            duration_ms: defaults.duration_ms,
            cc: defaults.cc,
            scheme: defaults.scheme,
            byte_limit: defaults.byte_limit,
            metadata: defaults.metadata,
        }
    }
}

impl TestConfigBuilder {
    pub fn streams(mut self, streams: usize) -> Self {
        self.streams = streams;
        self
    }

    pub fn duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn cc(mut self, cc: CongestionControl) -> Self {
        self.cc = cc;
        self
    }

    pub fn scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn byte_limit(mut self, byte_limit: u64) -> Self {
        self.byte_limit = byte_limit;
        self
    }

    pub fn metadata<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<TestConfig> {
        TestConfig::new(
            self.streams,
            self.duration_ms,
            self.cc,
            self.scheme,
            self.byte_limit,
            self.metadata,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TestConfig::builder().build().unwrap();
        assert_eq!(config.streams(), 2);
        assert_eq!(config.duration_ms(), 5000);
        assert_eq!(config.cc(), CongestionControl::Bbr);
        assert_eq!(config.scheme(), Scheme::Wss);
        assert_eq!(config.byte_limit(), None);
        assert_eq!(config.safety_timeout(), Duration::from_millis(6000));
    }

    #[test]
    fn test_stream_count_bounds() {
        assert!(TestConfig::builder().streams(0).build().is_err());
        assert!(TestConfig::builder().streams(1).build().is_ok());
        assert!(TestConfig::builder().streams(4).build().is_ok());
        let err = TestConfig::builder().streams(5).build().unwrap_err();
        assert_eq!(err.category(), "CONFIG");
    }

    #[test]
    fn test_duration_bounds() {
        assert!(TestConfig::builder().duration_ms(0).build().is_err());
        assert!(TestConfig::builder().duration_ms(1).build().is_ok());
        assert!(TestConfig::builder().duration_ms(20_000).build().is_ok());
        assert!(TestConfig::builder().duration_ms(20_001).build().is_err());
    }

    #[test]
    fn test_byte_limit() {
        let config = TestConfig::builder().byte_limit(1_000_000).build().unwrap();
        assert_eq!(config.byte_limit(), Some(1_000_000));
    }

    #[test]
    fn test_empty_metadata_key_rejected() {
        assert!(TestConfig::builder().metadata(" ", "x").build().is_err());
        let config = TestConfig::builder().metadata("site", "home").build().unwrap();
        assert_eq!(config.metadata().get("site").map(String::as_str), Some("home"));
    }

    proptest! {
        #[test]
        fn construction_accepts_exactly_the_valid_ranges(streams in 0usize..10, duration in 0u64..40_000) {
            let result = TestConfig::builder().streams(streams).duration_ms(duration).build();
            let valid = (1..=4).contains(&streams) && duration > 0 && duration <= 20_000;
            prop_assert_eq!(result.is_ok(), valid);
        }
    }
}
