//! Caller hooks invoked from the phase event loop

use crate::error::StreamError;
use crate::models::{Sample, SessionResult};
use crate::session::PhaseSummary;
use crate::types::Direction;
use std::time::Duration;

/// A stream of a phase opened its socket
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectInfo {
    pub direction: Direction,
    pub stream: usize,
    /// Time since the phase start; zero for the stream that set it
    pub elapsed: Duration,
}

/// A client or server sample of one stream
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementUpdate {
    pub direction: Direction,
    pub stream: usize,
    pub sample: Sample,
    /// Time since the phase start
    pub elapsed: Duration,
    /// This stream's goodput over the phase so far
    pub stream_goodput_bps: f64,
}

type Hook<T> = Option<Box<dyn FnMut(&T) + Send>>;

/// Optional callbacks for every phase of a session. Unset callbacks do
/// nothing, except `on_error`: without it the first stream error fails the
/// phase once all of its streams have finished.
#[derive(Default)]
pub struct Callbacks {
    on_connect: Hook<ConnectInfo>,
    on_measurement: Hook<MeasurementUpdate>,
    on_result: Hook<SessionResult>,
    on_error: Hook<StreamError>,
    on_complete: Hook<PhaseSummary>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connect<F>(mut self, f: F) -> Self
    where
        F: FnMut(&ConnectInfo) + Send + 'static,
    {
        self.on_connect = Some(Box::new(f));
        self
    }

    pub fn on_measurement<F>(mut self, f: F) -> Self
    where
        F: FnMut(&MeasurementUpdate) + Send + 'static,
    {
        self.on_measurement = Some(Box::new(f));
        self
    }

    /// Called with the recomputed aggregate after every measurement
    pub fn on_result<F>(mut self, f: F) -> Self
    where
        F: FnMut(&SessionResult) + Send + 'static,
    {
        self.on_result = Some(Box::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: FnMut(&StreamError) + Send + 'static,
    {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Called once per phase, after every stream has finished
    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: FnMut(&PhaseSummary) + Send + 'static,
    {
        self.on_complete = Some(Box::new(f));
        self
    }

    pub fn handles_errors(&self) -> bool {
        self.on_error.is_some()
    }

    pub(crate) fn connect(&mut self, info: &ConnectInfo) {
        if let Some(f) = self.on_connect.as_mut() {
            f(info);
        }
    }

    pub(crate) fn measurement(&mut self, update: &MeasurementUpdate) {
        if let Some(f) = self.on_measurement.as_mut() {
            f(update);
        }
    }

    pub(crate) fn result(&mut self, result: &SessionResult) {
        if let Some(f) = self.on_result.as_mut() {
            f(result);
        }
    }

    pub(crate) fn error(&mut self, error: &StreamError) {
        if let Some(f) = self.on_error.as_mut() {
            f(error);
        }
    }

    pub(crate) fn complete(&mut self, summary: &PhaseSummary) {
        if let Some(f) = self.on_complete.as_mut() {
            f(summary);
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_measurement", &self.on_measurement.is_some())
            .field("on_result", &self.on_result.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}
