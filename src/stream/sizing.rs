//! Adaptive upload message sizing
//!
//! Upload frames start small so slow links are not flooded, and double each
//! time the bytes already sent reach [`SCALING_FRACTION`] times the current
//! size, up to [`MAX_MESSAGE_SIZE`]. With a byte limit the frame that would
//! overshoot is truncated so the total lands exactly on the limit.

use crate::defaults::{INITIAL_MESSAGE_SIZE, MAX_MESSAGE_SIZE, SCALING_FRACTION, SEND_BUFFER_MESSAGES};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSizer {
    size: usize,
    sent: u64,
    limit: Option<u64>,
}

impl MessageSizer {
    pub fn new(limit: Option<u64>) -> Self {
        Self {
            size: INITIAL_MESSAGE_SIZE,
            sent: 0,
            limit: limit.filter(|&l| l > 0),
        }
    }

    /// Current message size
    pub fn size(&self) -> usize {
        self.size
    }

    /// Cumulative bytes sent, control messages included
    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn limit_reached(&self) -> bool {
        matches!(self.limit, Some(limit) if self.sent >= limit)
    }

    /// Size of the next data frame, `None` once the byte limit is reached
    pub fn next_frame_size(&self) -> Option<usize> {
        match self.limit {
            Some(limit) if self.sent >= limit => None,
            Some(limit) => Some(self.size.min((limit - self.sent) as usize)),
            None => Some(self.size),
        }
    }

    /// Whether `len` more bytes can go out without passing the byte limit
    pub fn fits(&self, len: usize) -> bool {
        match self.limit {
            Some(limit) => self.sent + len as u64 <= limit,
            None => true,
        }
    }

    /// Queued bytes below which another frame may be sent
    pub fn buffer_threshold(&self) -> usize {
        self.size * SEND_BUFFER_MESSAGES
    }

    /// Account for bytes handed to the socket. Returns the new message size
    /// when it doubled.
    pub fn record_sent(&mut self, bytes: usize) -> Option<usize> {
        self.sent += bytes as u64;
        if self.size < MAX_MESSAGE_SIZE && self.sent >= self.size as u64 * SCALING_FRACTION {
            self.size = (self.size * 2).min(MAX_MESSAGE_SIZE);
            Some(self.size)
        } else {
            None
        }
    }
}
