//! Wire codec for the throughput1 sub-protocol
//!
//! Text frames carry JSON control messages (one [`Measurement`] each),
//! binary frames carry bulk payload and are only ever counted.

use crate::error::{AppError, Result};
use crate::models::Measurement;
use bytes::Bytes;

/// One WebSocket data frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Control message
    Text(String),
    /// Bulk payload
    Binary(Bytes),
}

impl Frame {
    /// Payload length in bytes, the unit every byte counter uses
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_control(&self) -> bool {
        matches!(self, Frame::Text(_))
    }
}

/// Serialize a measurement into a control message
pub fn encode_measurement(measurement: &Measurement) -> Result<String> {
    serde_json::to_string(measurement)
        .map_err(|e| AppError::internal(format!("Failed to encode measurement: {}", e)))
}

/// Build the text frame carrying a measurement
pub fn measurement_frame(measurement: &Measurement) -> Result<Frame> {
    encode_measurement(measurement).map(Frame::Text)
}

/// Parse an inbound control message. Unknown fields are ignored; anything
/// that is not a measurement object is a protocol error.
pub fn decode_measurement(text: &str) -> Result<Measurement> {
    serde_json::from_str(text).map_err(|e| {
        AppError::protocol(format!(
            "malformed control message ({}): {}",
            e,
            truncate_for_log(text, 64)
        ))
    })
}

fn truncate_for_log(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ByteCounters, TcpInfo};
    use std::time::Duration;

    #[test]
    fn test_encode_uses_wire_field_names() {
        let measurement = Measurement::client(1234, 5678, Duration::from_millis(250));
        let text = encode_measurement(&measurement).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["Application"]["BytesSent"], 1234);
        assert_eq!(value["Application"]["BytesReceived"], 5678);
        assert_eq!(value["ElapsedTime"], 250_000);
        assert!(value.get("TCPInfo").is_none());
        assert!(value.get("Network").is_none());
    }

    #[test]
    fn test_decode_server_measurement() {
        let text = r#"{
            "Application": {"BytesSent": 0, "BytesReceived": 1048576},
            "Network": {"BytesSent": 100, "BytesReceived": 1100000},
            "ElapsedTime": 1500000,
            "CC": "bbr",
            "TCPInfo": {"MinRTT": 9000, "RTT": 12000, "BytesRetrans": 10, "BytesSent": 1000, "State": 1},
            "BBRInfo": {"BW": 125000000, "MinRTT": 9000, "PacingGain": 256, "CwndGain": 512}
        }"#;
        let m = decode_measurement(text).unwrap();
        assert_eq!(m.application, ByteCounters { bytes_sent: 0, bytes_received: 1_048_576 });
        assert_eq!(m.elapsed(), Duration::from_millis(1500));
        let tcp = m.tcp_info.unwrap();
        assert_eq!(tcp.min_rtt, Some(9000));
        assert_eq!(tcp.bytes_retrans, Some(10));
        assert_eq!(tcp.bytes_sent, Some(1000));
        assert_eq!(m.bbr_info.unwrap().bw, 125_000_000);
    }

    #[test]
    fn test_decode_fractional_elapsed_time() {
        let m = decode_measurement(r#"{"Application":{"BytesSent":5,"BytesReceived":0},"ElapsedTime":1234.6}"#).unwrap();
        assert_eq!(m.elapsed_time, 1235);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        for text in ["", "not json", "[1,2,3]", r#"{"ElapsedTime": 1}"#, r#"{"Application":{},"ElapsedTime":-5}"#] {
            let err = decode_measurement(text).unwrap_err();
            assert_eq!(err.category(), "PROTOCOL", "input {:?}", text);
            assert!(err.is_stream_local());
        }
    }

    #[test]
    fn test_decoded_transport_stats_survive_reencode() {
        let original = Measurement {
            application: ByteCounters { bytes_sent: 1, bytes_received: 2 },
            elapsed_time: 3,
            tcp_info: Some(TcpInfo { min_rtt: Some(4), bytes_retrans: Some(5), bytes_sent: Some(6), ..Default::default() }),
            ..Default::default()
        };
        let decoded = decode_measurement(&encode_measurement(&original).unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_frame_len() {
        assert_eq!(Frame::Text("abc".into()).len(), 3);
        assert_eq!(Frame::Binary(Bytes::from_static(&[0u8; 16])).len(), 16);
        assert!(Frame::Text(String::new()).is_empty());
        assert!(Frame::Text("x".into()).is_control());
    }

    #[test]
    fn test_long_payload_truncated_in_error() {
        let junk = "x".repeat(500);
        let err = decode_measurement(&junk).unwrap_err();
        assert!(err.to_string().len() < 300);
    }
}
