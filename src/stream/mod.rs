//! Stream engine: drives one direction of the test over one socket
//!
//! ```text
//! Init -> Connecting -> Open -> Running -> Closing -> Closed
//!             \           \        \
//!              +-----------+--------+----> Errored
//! ```
//!
//! The engine owns its counters; the session only ever sees snapshots
//! carried by [`StreamEvent`]s. Events of one stream are ordered
//! `Connect, Measurement*, (Error | Close)`; non-terminal protocol errors may
//! be interleaved with measurements.

pub mod sizing;

use crate::codec::{decode_measurement, encode_measurement, Frame};
use crate::defaults::{DOWNLOAD_MEASUREMENT_INTERVAL, UPLOAD_MEASUREMENT_INTERVAL};
use crate::error::{AppError, Result};
use crate::logging::StreamLogger;
use crate::models::{Measurement, Sample, ServerInfo, StreamSnapshot, TestConfig};
use crate::session::clock::PhaseClock;
use crate::socket::{Connector, FrameReceiver, FrameSender};
use crate::types::{Direction, SampleSource};
use bytes::Bytes;
use sizing::MessageSizer;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, Sleep};
use url::Url;

/// Lifecycle of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Init,
    Connecting,
    Open,
    Running,
    Closing,
    Closed,
    Errored,
}

impl StreamState {
    pub fn can_transition_to(self, next: StreamState) -> bool {
        use StreamState::*;
        matches!(
            (self, next),
            (Init, Connecting)
                | (Connecting, Open)
                | (Open, Running)
                | (Running, Closing)
                | (Closing, Closed)
                | (Connecting, Errored)
                | (Open, Errored)
                | (Running, Errored)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, StreamState::Closed | StreamState::Errored)
    }
}

/// Everything a stream reports to its session
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Connect {
        stream: usize,
        at: Instant,
    },
    Measurement {
        stream: usize,
        sample: Sample,
        snapshot: StreamSnapshot,
    },
    Error {
        stream: usize,
        error: AppError,
        terminal: bool,
        snapshot: StreamSnapshot,
    },
    Close {
        stream: usize,
        /// Closed by the safety timer rather than by the peer
        forced: bool,
        snapshot: StreamSnapshot,
    },
}

impl StreamEvent {
    pub fn stream(&self) -> usize {
        match self {
            StreamEvent::Connect { stream, .. }
            | StreamEvent::Measurement { stream, .. }
            | StreamEvent::Error { stream, .. }
            | StreamEvent::Close { stream, .. } => *stream,
        }
    }
}

/// How the running part of a stream ended
enum Ending {
    PeerClosed,
    Forced,
    Failed(AppError),
}

/// One measurement stream
pub struct StreamEngine<C: Connector> {
    connector: Arc<C>,
    url: Url,
    config: Arc<TestConfig>,
    clock: Arc<PhaseClock>,
    events: mpsc::UnboundedSender<StreamEvent>,
    logger: StreamLogger,
    state: StreamState,
    stats: StreamSnapshot,
}

impl<C: Connector> StreamEngine<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: usize,
        direction: Direction,
        connector: Arc<C>,
        url: Url,
        config: Arc<TestConfig>,
        clock: Arc<PhaseClock>,
        events: mpsc::UnboundedSender<StreamEvent>,
        logger: StreamLogger,
    ) -> Self {
        Self {
            connector,
            url,
            config,
            clock,
            events,
            logger,
            state: StreamState::Init,
            stats: StreamSnapshot::new(id, direction),
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Run the stream to completion and return its terminal state
    pub async fn run(mut self) -> StreamState {
        let safety = tokio::time::sleep(self.config.safety_timeout());
        tokio::pin!(safety);

        self.transition(StreamState::Connecting);
        self.logger.log_connecting(self.url.as_str()).await;

        let connected = tokio::select! {
            result = self.connector.connect(&self.url) => result,
            _ = &mut safety => Err(AppError::timeout(format!(
                "no connection within {} ms",
                self.config.safety_timeout().as_millis()
            ))),
        };
        let (sender, receiver) = match connected {
            Ok(halves) => halves,
            Err(error) => return self.fail(error).await,
        };

        let connected_at = Instant::now();
        self.stats.connected_at = Some(connected_at);
        let phase_start = self.clock.mark_connected(connected_at);
        self.transition(StreamState::Open);
        self.emit(StreamEvent::Connect {
            stream: self.stats.id,
            at: connected_at,
        });
        self.logger.log_connected(phase_start == connected_at).await;

        self.transition(StreamState::Running);
        let ending = match self.stats.direction {
            Direction::Download => self.download(sender, receiver, safety.as_mut()).await,
            Direction::Upload => self.upload(sender, receiver, phase_start, safety.as_mut()).await,
        };

        match ending {
            Ending::Failed(error) => self.fail(error).await,
            Ending::PeerClosed => self.finish(false).await,
            Ending::Forced => self.finish(true).await,
        }
    }

    async fn download<S, R>(&mut self, mut sender: S, mut receiver: R, mut safety: Pin<&mut Sleep>) -> Ending
    where
        S: FrameSender,
        R: FrameReceiver,
    {
        let mut ticker = tokio::time::interval_at(
            Instant::now() + DOWNLOAD_MEASUREMENT_INTERVAL,
            DOWNLOAD_MEASUREMENT_INTERVAL,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = &mut safety => {
                    sender.close();
                    return Ending::Forced;
                }
                frame = receiver.recv() => match frame {
                    None => return Ending::PeerClosed,
                    Some(Err(error)) => return Ending::Failed(error),
                    Some(Ok(frame)) => self.on_frame(frame).await,
                },
                _ = ticker.tick() => {
                    if sender.is_closing() {
                        continue;
                    }
                    let measurement = self.client_measurement();
                    let sent = send_measurement(&mut sender, &measurement);
                    self.account_control(sent).await;
                    self.emit_sample(SampleSource::Client, measurement);
                }
            }
        }
    }

    async fn upload<S, R>(
        &mut self,
        mut sender: S,
        mut receiver: R,
        phase_start: Instant,
        mut safety: Pin<&mut Sleep>,
    ) -> Ending
    where
        S: FrameSender,
        R: FrameReceiver,
    {
        let deadline = phase_start + self.config.duration();
        let mut sizer = MessageSizer::new(self.config.byte_limit());
        let mut payload = Bytes::from(vec![0u8; sizer.size()]);
        let mut next_measurement = Instant::now() + UPLOAD_MEASUREMENT_INTERVAL;
        let mut stopped = false;

        loop {
            if !stopped {
                if Instant::now() >= deadline {
                    sender.close();
                    stopped = true;
                } else if sender.is_closing() {
                    stopped = true;
                }
            }

            if !stopped {
                let now = Instant::now();
                if now >= next_measurement {
                    let measurement = self.client_measurement();
                    match encode_measurement(&measurement) {
                        // Keep the total under the byte limit
                        Ok(text) if !sizer.fits(text.len()) => {}
                        encoded => {
                            let sent = encoded.and_then(|text| {
                                let len = text.len();
                                sender.send(Frame::Text(text)).map(|_| len)
                            });
                            if let Some(len) = self.account_control(sent).await {
                                self.record_upload(&mut sizer, len).await;
                            }
                        }
                    }
                    self.emit_sample(SampleSource::Client, measurement);
                    next_measurement = now + UPLOAD_MEASUREMENT_INTERVAL;
                }

                if let Some(len) = sizer.next_frame_size() {
                    if sender.buffered_amount() < sizer.buffer_threshold() {
                        if payload.len() < len {
                            payload = Bytes::from(vec![0u8; sizer.size()]);
                        }
                        match sender.send(Frame::Binary(payload.slice(..len))) {
                            Ok(()) => {
                                self.stats.bytes_sent += len as u64;
                                self.stats.data_bytes_sent += len as u64;
                                self.record_upload(&mut sizer, len).await;
                            }
                            Err(error) => self.logger.log_send_failed("data", &error).await,
                        }
                    }
                }
            }

            let can_send = !stopped && sizer.next_frame_size().is_some();
            let threshold = sizer.buffer_threshold();
            let gauge = sender.gauge().clone();
            let wake_at = next_measurement.min(deadline);

            tokio::select! {
                biased;
                _ = &mut safety => {
                    sender.close();
                    return Ending::Forced;
                }
                frame = receiver.recv() => match frame {
                    None => return Ending::PeerClosed,
                    Some(Err(error)) => return Ending::Failed(error),
                    Some(Ok(frame)) => self.on_frame(frame).await,
                },
                _ = gauge.wait_below(threshold), if can_send => {}
                _ = tokio::time::sleep_until(wake_at), if !stopped => {}
            }

            tokio::task::yield_now().await;
        }
    }

    /// Count a control message that went out, or log why it did not
    async fn account_control(&mut self, sent: Result<usize>) -> Option<usize> {
        match sent {
            Ok(len) => {
                self.stats.bytes_sent += len as u64;
                Some(len)
            }
            Err(error) => {
                self.logger.log_send_failed("measurement", &error).await;
                None
            }
        }
    }

    async fn record_upload(&mut self, sizer: &mut MessageSizer, len: usize) {
        if let Some(size) = sizer.record_sent(len) {
            self.logger.log_message_size(size, sizer.sent()).await;
        }
    }

    /// Handle one inbound data frame. Control messages are decoded exactly
    /// once; bulk payload is only counted.
    async fn on_frame(&mut self, frame: Frame) {
        match frame {
            Frame::Binary(data) => {
                self.stats.bytes_received += data.len() as u64;
            }
            Frame::Text(text) => match decode_measurement(&text) {
                Ok(measurement) => {
                    self.stats.server = Some(ServerInfo::merge(self.stats.server, &measurement));
                    self.emit_sample(SampleSource::Server, measurement);
                }
                Err(error) => {
                    self.logger.log_error(&error, false).await;
                    self.emit(StreamEvent::Error {
                        stream: self.stats.id,
                        error,
                        terminal: false,
                        snapshot: self.stats.clone(),
                    });
                }
            },
        }
    }

    fn client_measurement(&self) -> Measurement {
        let elapsed = self
            .stats
            .connected_at
            .map(|at| at.elapsed())
            .unwrap_or_default();
        Measurement::client(self.stats.bytes_sent, self.stats.bytes_received, elapsed)
    }

    async fn finish(mut self, forced: bool) -> StreamState {
        self.transition(StreamState::Closing);
        let measurement = self.client_measurement();
        self.emit_sample(SampleSource::Client, measurement);

        self.stats.terminal = true;
        self.transition(StreamState::Closed);
        self.logger
            .log_closed(forced, self.stats.bytes_sent, self.stats.bytes_received)
            .await;
        self.emit(StreamEvent::Close {
            stream: self.stats.id,
            forced,
            snapshot: self.stats.clone(),
        });
        self.state
    }

    async fn fail(mut self, error: AppError) -> StreamState {
        self.stats.terminal = true;
        self.transition(StreamState::Errored);
        self.logger.log_error(&error, true).await;
        self.emit(StreamEvent::Error {
            stream: self.stats.id,
            error,
            terminal: true,
            snapshot: self.stats.clone(),
        });
        self.state
    }

    fn emit_sample(&self, source: SampleSource, measurement: Measurement) {
        self.emit(StreamEvent::Measurement {
            stream: self.stats.id,
            sample: Sample { source, measurement },
            snapshot: self.stats.clone(),
        });
    }

    fn emit(&self, event: StreamEvent) {
        // A session that stopped listening no longer needs the event
        let _ = self.events.send(event);
    }

    fn transition(&mut self, next: StreamState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid stream transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
    }
}

fn send_measurement<S: FrameSender>(sender: &mut S, measurement: &Measurement) -> Result<usize> {
    let text = encode_measurement(measurement)?;
    let len = text.len();
    sender.send(Frame::Text(text))?;
    Ok(len)
}
