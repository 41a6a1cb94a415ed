//! WebSocket transport built on tokio-tungstenite

use super::{BufferGauge, CloseFlag, Connector, FrameReceiver, FrameSender, Outbound};
use crate::codec::Frame;
use crate::defaults::{CONNECT_TIMEOUT, SUBPROTOCOL};
use crate::error::{AppError, ErrorContext, Result};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to throughput1 servers over `ws://` or `wss://`
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for WsConnector {
    type Sender = WsSender;
    type Receiver = WsReceiver;

    async fn connect(&self, url: &Url) -> Result<(WsSender, WsReceiver)> {
        let mut request = url.as_str().into_client_request()?;
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(SUBPROTOCOL));

        let host = url.host_str().unwrap_or("server");
        let (socket, _response) = tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(request))
            .await
            .map_err(|_| {
                AppError::transport(format!(
                    "connection to {} timed out after {}s",
                    host,
                    self.connect_timeout.as_secs()
                ))
            })?
            .with_context(|| format!("connecting to {}", host))?;

        let (sink, stream) = socket.split();
        let gauge = BufferGauge::new();
        let closing = CloseFlag::default();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(write_loop(sink, rx, gauge.clone(), closing.clone()));

        Ok((
            WsSender { tx, gauge, closing: closing.clone() },
            WsReceiver { stream, closing },
        ))
    }
}

/// Drains the outbound queue into the socket, releasing queued bytes as each
/// frame is written
async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    gauge: BufferGauge,
    closing: CloseFlag,
) {
    while let Some(item) = rx.recv().await {
        match item {
            Outbound::Frame(frame) => {
                let len = frame.len();
                let message = match frame {
                    Frame::Text(text) => Message::text(text),
                    Frame::Binary(data) => Message::binary(data),
                };
                let result = sink.send(message).await;
                gauge.release(len);
                if result.is_err() {
                    closing.set();
                    break;
                }
            }
            Outbound::Close => {
                closing.set();
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }

    // Whatever is still queued will never be written
    rx.close();
    while let Ok(item) = rx.try_recv() {
        if let Outbound::Frame(frame) = item {
            gauge.release(frame.len());
        }
    }
}

/// Write half of a WebSocket connection
#[derive(Debug)]
pub struct WsSender {
    tx: mpsc::UnboundedSender<Outbound>,
    gauge: BufferGauge,
    closing: CloseFlag,
}

impl FrameSender for WsSender {
    fn send(&mut self, frame: Frame) -> Result<()> {
        if self.closing.is_set() {
            return Err(AppError::transport("socket is closing"));
        }
        let len = frame.len();
        self.gauge.add(len);
        self.tx.send(Outbound::Frame(frame)).map_err(|_| {
            self.gauge.release(len);
            AppError::transport("socket writer has stopped")
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

/// Read half of a WebSocket connection
pub struct WsReceiver {
    stream: SplitStream<WsStream>,
    closing: CloseFlag,
}

#[async_trait]
impl FrameReceiver for WsReceiver {
    async fn recv(&mut self) -> Option<Result<Frame>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(Frame::Text(text.as_str().to_owned()))),
                Ok(Message::Binary(data)) => return Some(Ok(Frame::Binary(data))),
                Ok(Message::Close(_)) => {
                    // The reply is sent by tungstenite; keep reading until the
                    // stream reports the connection as closed
                    self.closing.set();
                }
                Ok(_) => {}
                Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => {
                    self.closing.set();
                    return None;
                }
                Err(e) => {
                    self.closing.set();
                    return Some(Err(e.into()));
                }
            }
        }
    }
}
