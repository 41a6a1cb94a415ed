//! Combines per-stream snapshots into phase-wide figures

use crate::models::{SessionResult, StreamSnapshot};
use crate::types::Direction;
use std::time::Duration;

/// Compute aggregate goodput, retransmission ratio and minimum RTT.
///
/// Goodput uses the application bytes of every snapshot over the common
/// phase elapsed time. Transport figures only consider streams whose server
/// reported them; with no contributors they stay `None`.
pub fn aggregate<'a, I>(direction: Direction, snapshots: I, elapsed: Duration) -> SessionResult
where
    I: IntoIterator<Item = &'a StreamSnapshot>,
{
    let mut total_bytes = 0u64;
    let mut retrans = 0u64;
    let mut transport_sent = 0u64;
    let mut reporters = 0usize;
    let mut min_rtt: Option<Duration> = None;
    let mut streams_reporting = 0usize;

    for snapshot in snapshots {
        streams_reporting += 1;
        total_bytes += snapshot.goodput_bytes();

        if let Some(server) = snapshot.server {
            if let (Some(r), Some(s)) = (server.bytes_retrans, server.bytes_sent) {
                retrans += r;
                transport_sent += s;
                reporters += 1;
            }
            if let Some(rtt) = server.min_rtt {
                min_rtt = Some(min_rtt.map_or(rtt, |current| current.min(rtt)));
            }
        }
    }

    let elapsed_seconds = elapsed.as_secs_f64();
    let goodput_bps = if elapsed_seconds > 0.0 {
        8.0 * total_bytes as f64 / elapsed_seconds
    } else {
        0.0
    };
    let retransmission_ratio = (reporters > 0 && transport_sent > 0).then(|| retrans as f64 / transport_sent as f64);

    SessionResult {
        direction,
        elapsed_seconds,
        goodput_bps,
        retransmission_ratio,
        min_rtt,
        streams_reporting,
    }
}

/// Goodput of a single stream over the phase elapsed time
pub fn stream_goodput(snapshot: &StreamSnapshot, elapsed: Duration) -> f64 {
    let seconds = elapsed.as_secs_f64();
    if seconds > 0.0 {
        8.0 * snapshot.goodput_bytes() as f64 / seconds
    } else {
        0.0
    }
}

/// Latest snapshot of every stream in one phase. Owned by the phase event
/// loop, which is its only writer.
#[derive(Debug, Clone)]
pub struct Aggregator {
    direction: Direction,
    snapshots: Vec<Option<StreamSnapshot>>,
}

impl Aggregator {
    pub fn new(direction: Direction, streams: usize) -> Self {
        Self {
            direction,
            snapshots: vec![None; streams],
        }
    }

    /// Replace the stored snapshot of one stream. Snapshots for unknown
    /// streams are ignored.
    pub fn update(&mut self, snapshot: StreamSnapshot) {
        if let Some(slot) = self.snapshots.get_mut(snapshot.id) {
            *slot = Some(snapshot);
        }
    }

    /// Drop a stream from the aggregate and hand back its last snapshot
    pub fn remove(&mut self, stream: usize) -> Option<StreamSnapshot> {
        self.snapshots.get_mut(stream).and_then(Option::take)
    }

    pub fn snapshot(&self, stream: usize) -> Option<&StreamSnapshot> {
        self.snapshots.get(stream).and_then(Option::as_ref)
    }

    pub fn result(&self, elapsed: Duration) -> SessionResult {
        aggregate(self.direction, self.snapshots.iter().flatten(), elapsed)
    }
}
