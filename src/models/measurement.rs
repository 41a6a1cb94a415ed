//! Measurement records exchanged on the wire, per-stream snapshots and
//! aggregate results

use crate::types::{Direction, SampleSource};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Application or network level byte counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ByteCounters {
    #[serde(default)]
    pub bytes_sent: u64,
    #[serde(default)]
    pub bytes_received: u64,
}

/// Kernel TCP statistics as reported by the server. Only the fields the
/// client uses are modelled; everything else in the record is ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TcpInfo {
    /// Minimum RTT in microseconds
    #[serde(rename = "MinRTT", default, skip_serializing_if = "Option::is_none")]
    pub min_rtt: Option<u64>,
    /// Smoothed RTT in microseconds
    #[serde(rename = "RTT", default, skip_serializing_if = "Option::is_none")]
    pub rtt: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_retrans: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_sent: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_acked: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_received: Option<u64>,
}

/// BBR congestion control state, present when the server runs BBR
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BbrInfo {
    /// Bottleneck bandwidth estimate in bytes per second
    #[serde(rename = "BW", default)]
    pub bw: i64,
    #[serde(rename = "MinRTT", default)]
    pub min_rtt: u32,
    #[serde(default)]
    pub pacing_gain: u32,
    #[serde(default)]
    pub cwnd_gain: u32,
}

/// One control message: cumulative counters of one stream at one point in
/// time. `elapsed_time` is in microseconds since that stream connected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Measurement {
    pub application: ByteCounters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<ByteCounters>,
    #[serde(default, deserialize_with = "micros_from_number")]
    pub elapsed_time: u64,
    #[serde(rename = "TCPInfo", default, skip_serializing_if = "Option::is_none")]
    pub tcp_info: Option<TcpInfo>,
    #[serde(rename = "BBRInfo", default, skip_serializing_if = "Option::is_none")]
    pub bbr_info: Option<BbrInfo>,
}

impl Measurement {
    /// Client-side measurement with application counters only
    pub fn client(bytes_sent: u64, bytes_received: u64, elapsed: Duration) -> Self {
        Self {
            application: ByteCounters { bytes_sent, bytes_received },
            elapsed_time: elapsed.as_micros().min(u64::MAX as u128) as u64,
            ..Default::default()
        }
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.elapsed_time)
    }
}

// Some peers emit fractional microseconds; accept any JSON number.
fn micros_from_number<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if value.is_finite() && value >= 0.0 {
        Ok(value.round() as u64)
    } else {
        Err(serde::de::Error::custom(format!("invalid ElapsedTime {}", value)))
    }
}

/// A measurement tagged with where it came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub source: SampleSource,
    pub measurement: Measurement,
}

/// Latest transport statistics a server reported for one stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ServerInfo {
    pub min_rtt: Option<Duration>,
    pub bytes_retrans: Option<u64>,
    pub bytes_sent: Option<u64>,
    /// Application bytes the server has received (upload goodput basis)
    pub application_bytes_received: u64,
}

impl ServerInfo {
    /// Fold a server measurement into the last known statistics. Fields the
    /// new record leaves out keep their previous values.
    pub fn merge(previous: Option<ServerInfo>, measurement: &Measurement) -> ServerInfo {
        let mut info = previous.unwrap_or_default();
        if let Some(tcp) = measurement.tcp_info {
            if let Some(min_rtt) = tcp.min_rtt {
                info.min_rtt = Some(Duration::from_micros(min_rtt));
            }
            if tcp.bytes_retrans.is_some() {
                info.bytes_retrans = tcp.bytes_retrans;
            }
            if tcp.bytes_sent.is_some() {
                info.bytes_sent = tcp.bytes_sent;
            }
        }
        info.application_bytes_received = info
            .application_bytes_received
            .max(measurement.application.bytes_received);
        info
    }
}

/// Immutable copy of one stream's state, the only view of a stream other
/// components ever see
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSnapshot {
    pub id: usize,
    pub direction: Direction,
    /// Application bytes sent, control messages included
    pub bytes_sent: u64,
    /// Bulk payload bytes sent
    pub data_bytes_sent: u64,
    pub bytes_received: u64,
    pub server: Option<ServerInfo>,
    /// Local time the stream's socket opened
    pub connected_at: Option<Instant>,
    pub terminal: bool,
}

impl StreamSnapshot {
    pub fn new(id: usize, direction: Direction) -> Self {
        Self {
            id,
            direction,
            bytes_sent: 0,
            data_bytes_sent: 0,
            bytes_received: 0,
            server: None,
            connected_at: None,
            terminal: false,
        }
    }

    /// Application bytes that count toward goodput for this stream's
    /// direction. Uploads without a server report fall back to the bulk
    /// payload sent, leaving out control messages.
    pub fn goodput_bytes(&self) -> u64 {
        match self.direction {
            Direction::Download => self.bytes_received,
            Direction::Upload => match self.server {
                Some(info) if info.application_bytes_received > 0 => info.application_bytes_received,
                _ => self.data_bytes_sent,
            },
        }
    }
}

/// Aggregate view of one phase
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionResult {
    pub direction: Direction,
    pub elapsed_seconds: f64,
    pub goodput_bps: f64,
    /// `None` until at least one stream reported transport statistics
    pub retransmission_ratio: Option<f64>,
    pub min_rtt: Option<Duration>,
    /// Streams that contributed at least one measurement
    pub streams_reporting: usize,
}

impl SessionResult {
    pub fn empty(direction: Direction) -> Self {
        Self {
            direction,
            elapsed_seconds: 0.0,
            goodput_bps: 0.0,
            retransmission_ratio: None,
            min_rtt: None,
            streams_reporting: 0,
        }
    }

    pub fn goodput_mbps(&self) -> f64 {
        self.goodput_bps / 1_000_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_info_merge_keeps_missing_fields() {
        let first = Measurement {
            application: ByteCounters { bytes_sent: 0, bytes_received: 500 },
            tcp_info: Some(TcpInfo {
                min_rtt: Some(12_000),
                bytes_retrans: Some(3),
                bytes_sent: Some(900),
                ..Default::default()
            }),
            ..Default::default()
        };
        let info = ServerInfo::merge(None, &first);
        assert_eq!(info.min_rtt, Some(Duration::from_millis(12)));

        let second = Measurement {
            application: ByteCounters { bytes_sent: 0, bytes_received: 800 },
            tcp_info: Some(TcpInfo { bytes_sent: Some(1200), ..Default::default() }),
            ..Default::default()
        };
        let info = ServerInfo::merge(Some(info), &second);
        assert_eq!(info.min_rtt, Some(Duration::from_millis(12)));
        assert_eq!(info.bytes_retrans, Some(3));
        assert_eq!(info.bytes_sent, Some(1200));
        assert_eq!(info.application_bytes_received, 800);
    }

    #[test]
    fn test_goodput_bytes_by_direction() {
        let mut download = StreamSnapshot::new(0, Direction::Download);
        download.bytes_received = 4096;
        download.bytes_sent = 100;
        assert_eq!(download.goodput_bytes(), 4096);

        let mut upload = StreamSnapshot::new(1, Direction::Upload);
        upload.bytes_sent = 10_350;
        upload.data_bytes_sent = 10_000;
        assert_eq!(upload.goodput_bytes(), 10_000);

        upload.server = Some(ServerInfo { application_bytes_received: 7_500, ..Default::default() });
        assert_eq!(upload.goodput_bytes(), 7_500);
    }

    #[test]
    fn test_client_measurement_elapsed() {
        let m = Measurement::client(10, 20, Duration::from_millis(1500));
        assert_eq!(m.elapsed_time, 1_500_000);
        assert_eq!(m.elapsed(), Duration::from_millis(1500));
        assert!(m.tcp_info.is_none());
    }
}
