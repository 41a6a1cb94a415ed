//! In-process transport: every connection is handed to the caller as a
//! [`MemoryPeer`] playing the server side. Used to drive the stream engine
//! and the session without a network.

use super::{BufferGauge, CloseFlag, Connector, FrameReceiver, FrameSender, Outbound};
use crate::codec::{encode_measurement, Frame};
use crate::error::{AppError, Result};
use crate::models::Measurement;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use url::Url;

/// Connector whose connections terminate in [`MemoryPeer`]s
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    refusals: Arc<AtomicUsize>,
}

impl MemoryConnector {
    /// Returns the connector and the queue of accepted peers
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (peers, accepted) = mpsc::unbounded_channel();
        (
            Self {
                peers,
                refusals: Arc::new(AtomicUsize::new(0)),
            },
            accepted,
        )
    }

    /// Refuse the next `count` connection attempts
    pub fn refuse_next(&self, count: usize) {
        self.refusals.fetch_add(count, Ordering::AcqRel);
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Sender = MemorySender;
    type Receiver = MemoryReceiver;

    async fn connect(&self, url: &Url) -> Result<(MemorySender, MemoryReceiver)> {
        let refused = self
            .refusals
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(AppError::transport(format!("connection to {} refused", url)));
        }

        let (client_tx, peer_rx) = mpsc::unbounded_channel();
        let (peer_tx, client_rx) = mpsc::unbounded_channel();
        let gauge = BufferGauge::new();
        let closing = CloseFlag::default();

        let peer = MemoryPeer {
            url: url.clone(),
            inbound: peer_rx,
            outbound: Some(peer_tx),
            gauge: gauge.clone(),
        };
        self.peers
            .send(peer)
            .map_err(|_| AppError::transport("no peer is accepting connections"))?;

        Ok((
            MemorySender {
                tx: client_tx,
                gauge,
                closing: closing.clone(),
            },
            MemoryReceiver { rx: client_rx, closing },
        ))
    }
}

/// Server side of an in-process connection
#[derive(Debug)]
pub struct MemoryPeer {
    /// URL the client connected to
    pub url: Url,
    inbound: mpsc::UnboundedReceiver<Outbound>,
    outbound: Option<mpsc::UnboundedSender<Result<Frame>>>,
    gauge: BufferGauge,
}

impl MemoryPeer {
    /// Next frame from the client; `None` once the client closed or dropped
    /// its end. Reading a frame drains it from the client's send buffer.
    pub async fn recv(&mut self) -> Option<Frame> {
        match self.inbound.recv().await? {
            Outbound::Frame(frame) => {
                self.gauge.release(frame.len());
                Some(frame)
            }
            Outbound::Close => None,
        }
    }

    pub fn send(&self, frame: Frame) -> bool {
        match &self.outbound {
            Some(tx) => tx.send(Ok(frame)).is_ok(),
            None => false,
        }
    }

    pub fn send_measurement(&self, measurement: &Measurement) -> bool {
        match encode_measurement(measurement) {
            Ok(text) => self.send(Frame::Text(text)),
            Err(_) => false,
        }
    }

    /// Deliver a transport failure to the client and drop the connection
    pub fn fail(&mut self, message: &str) {
        if let Some(tx) = self.outbound.take() {
            let _ = tx.send(Err(AppError::transport(message.to_string())));
        }
    }

    /// Close the connection from the server side
    pub fn close(&mut self) {
        self.outbound = None;
    }

    /// Bytes the client has queued that this peer has not read yet
    pub fn pending_bytes(&self) -> usize {
        self.gauge.get()
    }
}

/// Client write half of an in-process connection
#[derive(Debug)]
pub struct MemorySender {
    tx: mpsc::UnboundedSender<Outbound>,
    gauge: BufferGauge,
    closing: CloseFlag,
}

impl FrameSender for MemorySender {
    fn send(&mut self, frame: Frame) -> Result<()> {
        if self.closing.is_set() {
            return Err(AppError::transport("socket is closing"));
        }
        let len = frame.len();
        self.gauge.add(len);
        self.tx.send(Outbound::Frame(frame)).map_err(|_| {
            self.gauge.release(len);
            AppError::transport("peer has gone away")
        })
    }

    fn gauge(&self) -> &BufferGauge {
        &self.gauge
    }

    fn is_closing(&self) -> bool {
        self.closing.is_set()
    }

    fn close(&mut self) {
        if !self.closing.is_set() {
            let _ = self.tx.send(Outbound::Close);
        }
        self.closing.set();
    }
}

/// Client read half of an in-process connection
#[derive(Debug)]
pub struct MemoryReceiver {
    rx: mpsc::UnboundedReceiver<Result<Frame>>,
    closing: CloseFlag,
}

#[async_trait]
impl FrameReceiver for MemoryReceiver {
    async fn recv(&mut self) -> Option<Result<Frame>> {
        let next = self.rx.recv().await;
        if !matches!(next, Some(Ok(_))) {
            self.closing.set();
        }
        next
    }
}
