//! Session orchestrator: runs the download and upload phases
//!
//! Each phase spawns one task per stream. Tasks report to a single event
//! loop over an unbounded channel; the loop owns the aggregator and is the
//! only place phase state changes. A phase ends when every stream task has
//! ended, i.e. when the last event sender is dropped.

pub mod callbacks;
pub mod clock;

pub use callbacks::{Callbacks, ConnectInfo, MeasurementUpdate};
pub use clock::PhaseClock;

use crate::aggregate::{stream_goodput, Aggregator};
use crate::discovery::{EndpointPair, ServerDiscovery};
use crate::error::{AppError, Result, StreamError};
use crate::logging::{Logger, PhaseLogger, StreamLogger};
use crate::models::{SessionResult, StreamSnapshot, TestConfig};
use crate::socket::Connector;
use crate::stream::{StreamEngine, StreamEvent};
use crate::types::{Direction, PhaseSelection};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use url::Url;

/// Outcome of one phase
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseSummary {
    pub direction: Direction,
    /// Aggregate at the end of the phase
    pub result: SessionResult,
    pub streams: usize,
    pub streams_closed: usize,
    pub streams_errored: usize,
    /// Streams closed by their safety timer
    pub forced_closures: usize,
    /// Every error reported during the phase, in arrival order
    pub errors: Vec<StreamError>,
    /// Last snapshot of each stream counted in `result`
    pub snapshots: Vec<StreamSnapshot>,
    /// Last snapshot of each stream that failed; not counted in `result`
    pub failed: Vec<StreamSnapshot>,
    /// Wall time from the first spawn to the last stream ending
    pub wall_time: Duration,
}

impl PhaseSummary {
    pub fn all_failed(&self) -> bool {
        self.streams_closed == 0
    }
}

/// Results of a whole session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub endpoints: EndpointPair,
    pub download: Option<PhaseSummary>,
    pub upload: Option<PhaseSummary>,
}

impl SessionSummary {
    pub fn phases(&self) -> impl Iterator<Item = &PhaseSummary> {
        self.download.iter().chain(self.upload.iter())
    }
}

/// Drives measurement phases over connections made by `C`
pub struct Session<C: Connector> {
    connector: Arc<C>,
    config: Arc<TestConfig>,
    logger: Logger,
}

impl<C: Connector> Session<C> {
    pub fn new(connector: C, config: TestConfig) -> Self {
        let mut logger = Logger::new("SESSION".to_string());
        logger.set_level(crate::logging::LogLevel::Warn);
        Self {
            connector: Arc::new(connector),
            config: Arc::new(config),
            logger,
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    /// Resolve endpoints once, then run the selected phases in order
    /// (download before upload). Discovery failure ends the session before
    /// any phase starts.
    pub async fn run(
        &self,
        discovery: &dyn ServerDiscovery,
        phases: PhaseSelection,
        callbacks: &mut Callbacks,
    ) -> Result<SessionSummary> {
        let phase_logger = PhaseLogger::new(&self.logger);
        let endpoints = discovery.next_endpoints().await?;
        phase_logger
            .log_discovery(discovery.name(), endpoints.download.as_str())
            .await;

        let mut summary = SessionSummary {
            endpoints: endpoints.clone(),
            download: None,
            upload: None,
        };

        for &direction in phases.directions() {
            let phase = self.run_phase(direction, endpoints.url(direction), callbacks).await?;
            match direction {
                Direction::Download => summary.download = Some(phase),
                Direction::Upload => summary.upload = Some(phase),
            }
        }

        Ok(summary)
    }

    /// Run one phase: `streams` concurrent engines against `url`, joined
    /// before returning. Stream errors never cancel sibling streams.
    pub async fn run_phase(
        &self,
        direction: Direction,
        url: &Url,
        callbacks: &mut Callbacks,
    ) -> Result<PhaseSummary> {
        let streams = self.config.streams();
        let phase_logger = PhaseLogger::new(&self.logger);
        phase_logger.log_phase_start(direction, streams, url.as_str()).await;

        // Fresh per-phase state
        let clock = Arc::new(PhaseClock::new());
        let mut aggregator = Aggregator::new(direction, streams);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let spawned_at = Instant::now();

        let handles: Vec<_> = (0..streams)
            .map(|id| {
                let engine = StreamEngine::new(
                    id,
                    direction,
                    Arc::clone(&self.connector),
                    url.clone(),
                    Arc::clone(&self.config),
                    Arc::clone(&clock),
                    tx.clone(),
                    StreamLogger::new(&self.logger, direction, id),
                );
                tokio::spawn(engine.run())
            })
            .collect();
        drop(tx);

        let mut errors = Vec::new();
        let mut failed = Vec::new();
        let mut closed = 0usize;
        let mut errored = 0usize;
        let mut forced_closures = 0usize;

        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Connect { stream, at } => {
                    callbacks.connect(&ConnectInfo {
                        direction,
                        stream,
                        elapsed: clock.elapsed_at(at),
                    });
                }
                StreamEvent::Measurement { stream, sample, snapshot } => {
                    let elapsed = clock.elapsed();
                    let stream_goodput_bps = stream_goodput(&snapshot, elapsed);
                    aggregator.update(snapshot);
                    callbacks.measurement(&MeasurementUpdate {
                        direction,
                        stream,
                        sample,
                        elapsed,
                        stream_goodput_bps,
                    });
                    callbacks.result(&aggregator.result(elapsed));
                }
                StreamEvent::Error { stream, error, terminal, snapshot } => {
                    // A failed stream leaves the aggregate
                    if terminal {
                        errored += 1;
                        aggregator.remove(stream);
                        failed.push(snapshot);
                    } else {
                        aggregator.update(snapshot);
                    }
                    let error = StreamError { stream, direction, error, terminal };
                    callbacks.error(&error);
                    errors.push(error);
                }
                StreamEvent::Close { forced, snapshot, .. } => {
                    aggregator.update(snapshot);
                    closed += 1;
                    if forced {
                        forced_closures += 1;
                    }
                }
            }
        }

        // Every sender is gone, so every engine has returned or panicked
        for (stream, joined) in futures::future::join_all(handles).await.into_iter().enumerate() {
            if let Err(e) = joined {
                errored += 1;
                failed.extend(aggregator.remove(stream));
                let error = StreamError {
                    stream,
                    direction,
                    error: AppError::internal(format!("stream task failed: {}", e)),
                    terminal: true,
                };
                callbacks.error(&error);
                errors.push(error);
            }
        }

        let result = aggregator.result(clock.elapsed());
        let wall_time = spawned_at.elapsed();
        let summary = PhaseSummary {
            direction,
            result,
            streams,
            streams_closed: closed,
            streams_errored: errored,
            forced_closures,
            snapshots: (0..streams).filter_map(|id| aggregator.snapshot(id).cloned()).collect(),
            failed,
            errors,
            wall_time,
        };

        phase_logger
            .log_phase_complete(&summary.result, summary.streams_errored, wall_time)
            .await;
        callbacks.complete(&summary);

        if !callbacks.handles_errors() {
            if let Some(first) = summary.errors.first() {
                return Err(first.error.clone());
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Frame;
    use crate::discovery::{QueryParams, StaticServer};
    use crate::socket::memory::{MemoryConnector, MemoryPeer};
    use crate::types::Scheme;
    use bytes::Bytes;
    use std::sync::Mutex;

    fn url(direction: Direction) -> Url {
        Url::parse(&format!("ws://memory{}", direction.path())).unwrap()
    }

    fn session(streams: usize, duration_ms: u64) -> (Session<MemoryConnector>, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (connector, accepted) = MemoryConnector::new();
        let config = TestConfig::builder()
            .streams(streams)
            .duration_ms(duration_ms)
            .build()
            .unwrap();
        (Session::new(connector, config), accepted)
    }

    /// Serve every accepted peer: optionally push `payload` bytes, keep
    /// reading, and close after `close_after` (never when `None`)
    fn serve(mut accepted: mpsc::UnboundedReceiver<MemoryPeer>, payload: usize, close_after: Option<Duration>) {
        tokio::spawn(async move {
            while let Some(mut peer) = accepted.recv().await {
                tokio::spawn(async move {
                    if payload > 0 && peer.url.path().ends_with("download") {
                        peer.send(Frame::Binary(Bytes::from(vec![0u8; payload])));
                    }
                    let deadline = tokio::time::sleep(close_after.unwrap_or(Duration::from_secs(3600)));
                    tokio::pin!(deadline);
                    loop {
                        tokio::select! {
                            _ = &mut deadline, if close_after.is_some() => break,
                            frame = peer.recv() => {
                                if frame.is_none() {
                                    break;
                                }
                                tokio::time::sleep(Duration::from_micros(100)).await;
                            }
                        }
                    }
                    peer.close();
                });
            }
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_phase_aggregates_all_streams() {
        let (session, accepted) = session(2, 5000);
        serve(accepted, 1_000_000, Some(Duration::from_secs(1)));

        let connects = Arc::new(Mutex::new(Vec::new()));
        let results = Arc::new(Mutex::new(0usize));
        let mut callbacks = Callbacks::new()
            .on_connect({
                let connects = Arc::clone(&connects);
                move |c| connects.lock().unwrap().push((c.stream, c.elapsed))
            })
            .on_result({
                let results = Arc::clone(&results);
                move |_| *results.lock().unwrap() += 1
            });

        let summary = session
            .run_phase(Direction::Download, &url(Direction::Download), &mut callbacks)
            .await
            .unwrap();

        assert_eq!(summary.streams_closed, 2);
        assert_eq!(summary.streams_errored, 0);
        assert_eq!(summary.forced_closures, 0);
        assert!(summary.errors.is_empty());
        assert_eq!(summary.snapshots.len(), 2);
        assert!(summary.snapshots.iter().all(|s| s.bytes_received == 1_000_000 && s.terminal));

        let result = &summary.result;
        assert!(result.elapsed_seconds >= 1.0);
        assert!((result.goodput_bps - 16_000_000.0 / result.elapsed_seconds).abs() < 1e-6);
        assert_eq!(result.streams_reporting, 2);

        let connects = connects.lock().unwrap();
        assert_eq!(connects.len(), 2);
        assert!(connects.iter().any(|(_, elapsed)| elapsed.is_zero()));
        assert!(*results.lock().unwrap() > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_failure_reports_only_failed_stream() {
        let (session, mut accepted) = session(3, 2000);
        let errors = Arc::new(Mutex::new(Vec::new()));
        let completes = Arc::new(Mutex::new(0usize));
        let mut callbacks = Callbacks::new()
            .on_error({
                let errors = Arc::clone(&errors);
                move |e| errors.lock().unwrap().push((e.stream, e.terminal))
            })
            .on_complete({
                let completes = Arc::clone(&completes);
                move |_| *completes.lock().unwrap() += 1
            });

        let download_url = url(Direction::Download);
        let phase = session.run_phase(Direction::Download, &download_url, &mut callbacks);
        let server = async {
            let mut peers = Vec::new();
            for _ in 0..3 {
                peers.push(accepted.recv().await.unwrap());
            }
            for peer in &peers {
                peer.send(Frame::Binary(Bytes::from(vec![0u8; 50_000])));
            }
            tokio::time::sleep(Duration::from_millis(300)).await;
            // Fail whichever connection belongs to one stream, close the rest later
            peers[1].fail("connection reset by peer");
            tokio::time::sleep(Duration::from_millis(700)).await;
            for peer in peers.iter_mut() {
                peer.close();
            }
            peers
        };

        let (summary, _peers) = tokio::join!(phase, server);
        let summary = summary.unwrap();

        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].1);
        assert_eq!(summary.streams_errored, 1);
        assert_eq!(summary.streams_closed, 2);
        assert_eq!(*completes.lock().unwrap(), 1);

        // Only the surviving streams make up the aggregate
        assert_eq!(summary.snapshots.len(), 2);
        assert_eq!(summary.snapshots.iter().map(|s| s.bytes_received).sum::<u64>(), 100_000);
        assert_eq!(summary.result.streams_reporting, 2);
        let counted = summary.result.goodput_bps * summary.result.elapsed_seconds / 8.0;
        assert!((counted - 100_000.0).abs() < 1e-3, "aggregate counted {} bytes", counted);

        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].bytes_received, 50_000);
        assert!(summary.snapshots.iter().all(|s| s.id != summary.failed[0].id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_server_forced_closed_with_single_completion() {
        let (session, accepted) = session(2, 5000);
        serve(accepted, 0, None);

        let completes = Arc::new(Mutex::new(Vec::new()));
        let mut callbacks = Callbacks::new().on_complete({
            let completes = Arc::clone(&completes);
            move |s: &PhaseSummary| completes.lock().unwrap().push(s.streams_closed)
        });

        let started = Instant::now();
        let summary = session
            .run_phase(Direction::Download, &url(Direction::Download), &mut callbacks)
            .await
            .unwrap();

        assert!(started.elapsed() <= Duration::from_millis(6010));
        assert_eq!(summary.streams_closed, 2);
        assert_eq!(summary.forced_closures, 2);
        assert!(summary.errors.is_empty());
        assert_eq!(*completes.lock().unwrap(), vec![2]);
        assert_eq!(summary.result.goodput_bps, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unhandled_error_fails_phase_after_siblings_finish() {
        let (session, mut accepted) = session(2, 1000);
        let completes = Arc::new(Mutex::new(0usize));
        let mut callbacks = Callbacks::new().on_complete({
            let completes = Arc::clone(&completes);
            move |_| *completes.lock().unwrap() += 1
        });

        let download_url = url(Direction::Download);
        let phase = session.run_phase(Direction::Download, &download_url, &mut callbacks);
        let server = async {
            let mut first = accepted.recv().await.unwrap();
            let mut second = accepted.recv().await.unwrap();
            first.fail("boom");
            tokio::time::sleep(Duration::from_millis(500)).await;
            second.close();
        };

        let (result, _) = tokio::join!(phase, server);
        let error = result.unwrap_err();
        assert_eq!(error.category(), "TRANSPORT");
        assert_eq!(*completes.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failures_are_stream_errors() {
        let (connector, accepted) = MemoryConnector::new();
        connector.refuse_next(1);
        let config = TestConfig::builder().streams(2).duration_ms(500).build().unwrap();
        let session = Session::new(connector, config);
        serve(accepted, 10_000, Some(Duration::from_millis(500)));

        let mut callbacks = Callbacks::new().on_error(|_| {});
        let summary = session
            .run_phase(Direction::Download, &url(Direction::Download), &mut callbacks)
            .await
            .unwrap();
        assert_eq!(summary.streams_errored, 1);
        assert_eq!(summary.streams_closed, 1);
        assert!(!summary.all_failed());
        assert_eq!(summary.failed.len(), 1);
        assert!(summary.failed[0].connected_at.is_none());
        assert_eq!(summary.snapshots.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_executes_download_then_upload() {
        let (connector, accepted) = MemoryConnector::new();
        let config = TestConfig::builder().streams(1).duration_ms(300).build().unwrap();
        let params = QueryParams::new("test", "0.0.1", &config);
        let session = Session::new(connector, config);
        serve(accepted, 20_000, Some(Duration::from_millis(400)));

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut callbacks = Callbacks::new().on_complete({
            let order = Arc::clone(&order);
            move |s: &PhaseSummary| order.lock().unwrap().push(s.direction)
        });

        let discovery = StaticServer::for_server(Scheme::Ws, "memory", &params).unwrap();
        let summary = session.run(&discovery, PhaseSelection::Both, &mut callbacks).await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec![Direction::Download, Direction::Upload]);
        let download = summary.download.unwrap();
        let upload = summary.upload.as_ref().unwrap();
        assert_eq!(download.snapshots[0].bytes_received, 20_000);
        assert!(upload.snapshots[0].bytes_sent > 0);
        assert!(upload.result.goodput_bps > 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_only_selection() {
        let (connector, accepted) = MemoryConnector::new();
        let config = TestConfig::builder().streams(2).duration_ms(200).build().unwrap();
        let params = QueryParams::new("test", "0.0.1", &config);
        let session = Session::new(connector, config);
        serve(accepted, 0, None);

        let discovery = StaticServer::for_server(Scheme::Ws, "memory", &params).unwrap();
        let summary = session
            .run(&discovery, PhaseSelection::UploadOnly, &mut Callbacks::new())
            .await
            .unwrap();
        assert!(summary.download.is_none());
        let upload = summary.upload.as_ref().unwrap();
        assert_eq!(upload.streams_closed, 2);
        assert_eq!(upload.forced_closures, 0);
        assert_eq!(summary.phases().count(), 1);
    }
}
