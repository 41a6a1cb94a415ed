//! Transport seam between the stream engine and a message-oriented duplex
//! socket
//!
//! A connection is split into a [`FrameSender`] and a [`FrameReceiver`] so the
//! engine can wait for inbound frames and for send-buffer space at the same
//! time. Sends never block: frames are queued and the queued byte count is
//! tracked by a [`BufferGauge`], the equivalent of a browser socket's
//! `bufferedAmount`.

pub mod memory;
pub mod ws;

use crate::codec::Frame;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use url::Url;

/// Opens measurement sockets
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Sender: FrameSender;
    type Receiver: FrameReceiver;

    /// Open a socket speaking the throughput1 sub-protocol
    async fn connect(&self, url: &Url) -> Result<(Self::Sender, Self::Receiver)>;
}

/// Write half of a socket
pub trait FrameSender: Send + 'static {
    /// Queue a frame for transmission
    fn send(&mut self, frame: Frame) -> Result<()>;

    /// Bytes queued but not yet handed to the transport
    fn gauge(&self) -> &BufferGauge;

    /// The socket is closing or closed; no further frames will go out
    fn is_closing(&self) -> bool;

    /// Start the close handshake. Queued frames are flushed first.
    fn close(&mut self);

    fn buffered_amount(&self) -> usize {
        self.gauge().get()
    }
}

/// Read half of a socket
#[async_trait]
pub trait FrameReceiver: Send + 'static {
    /// Next data frame; `None` once the socket is closed. Cancel safe.
    async fn recv(&mut self) -> Option<Result<Frame>>;
}

/// Outbound queue item shared by the transports
#[derive(Debug)]
pub(crate) enum Outbound {
    Frame(Frame),
    Close,
}

/// Count of bytes queued on a socket, shared between the sender and the
/// task that drains the queue
#[derive(Debug, Clone, Default)]
pub struct BufferGauge {
    inner: Arc<GaugeInner>,
}

#[derive(Debug, Default)]
struct GaugeInner {
    queued: AtomicUsize,
    drained: Notify,
}

impl BufferGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.inner.queued.load(Ordering::Acquire)
    }

    pub fn add(&self, bytes: usize) {
        self.inner.queued.fetch_add(bytes, Ordering::AcqRel);
    }

    pub fn release(&self, bytes: usize) {
        let _ = self
            .inner
            .queued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |queued| {
                Some(queued.saturating_sub(bytes))
            });
        self.inner.drained.notify_waiters();
    }

    /// Resolve once fewer than `limit` bytes are queued
    pub async fn wait_below(&self, limit: usize) {
        loop {
            let notified = self.inner.drained.notified();
            tokio::pin!(notified);
            // Register before checking so a release in between is not missed
            notified.as_mut().enable();
            if self.get() < limit {
                return;
            }
            notified.await;
        }
    }
}

/// Closing flag shared by both halves of a socket and its writer
#[derive(Debug, Clone, Default)]
pub(crate) struct CloseFlag(Arc<AtomicBool>);

impl CloseFlag {
    pub(crate) fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub(crate) fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
