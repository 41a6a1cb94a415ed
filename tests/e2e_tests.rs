//! End-to-end tests against a loopback throughput1 server
//!
//! The server below speaks just enough of the protocol for the client:
//! it negotiates the subprotocol, streams bulk data on download, counts
//! bulk data on upload and reports TCP-style counters as JSON.

use futures::{SinkExt, StreamExt};
use msak_client::{
    app::App,
    defaults::SUBPROTOCOL,
    discovery::QueryParams,
    models::{Config, TestConfig},
    session::{Callbacks, Session},
    types::{Direction, PhaseSelection, Scheme},
    StaticServer, WsConnector,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CHUNK: usize = 64 * 1024;
const CHUNKS: usize = 10;
const MIN_RTT_US: u64 = 5_000;

#[derive(Clone, Copy)]
enum Behavior {
    /// Stream bulk data on download, count it on upload
    Normal,
    /// Accept the connection, then never send anything or close
    Silent,
    /// Complete the handshake without selecting a subprotocol
    NoSubprotocol,
}

/// Bytes of bulk data received by the server on upload streams
#[derive(Clone, Default)]
struct ServerStats {
    upload_bytes: Arc<AtomicU64>,
}

async fn start_server(behavior: Behavior) -> (SocketAddr, ServerStats) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let stats = ServerStats::default();
    let shared = stats.clone();

    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            tokio::spawn(handle(tcp, behavior, shared.clone()));
        }
    });

    (addr, stats)
}

fn server_measurement(app_sent: u64, app_received: u64, elapsed: Duration) -> Message {
    let tcp_sent = app_sent.max(app_received) + 1_000;
    Message::text(
        json!({
            "Application": { "BytesSent": app_sent, "BytesReceived": app_received },
            "Network": { "BytesSent": tcp_sent, "BytesReceived": app_received },
            "ElapsedTime": elapsed.as_micros() as u64,
            "TCPInfo": {
                "MinRTT": MIN_RTT_US,
                "RTT": MIN_RTT_US * 2,
                "BytesRetrans": tcp_sent / 100,
                "BytesSent": tcp_sent,
                "BytesAcked": tcp_sent
            }
        })
        .to_string(),
    )
}

async fn handle(tcp: TcpStream, behavior: Behavior, stats: ServerStats) {
    let mut path = String::new();
    let accepted = tokio_tungstenite::accept_hdr_async(tcp, |req: &Request, mut resp: Response| {
        path = req.uri().path().to_string();
        if !matches!(behavior, Behavior::NoSubprotocol) {
            resp.headers_mut()
                .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(SUBPROTOCOL));
        }
        Ok(resp)
    })
    .await;
    let Ok(ws) = accepted else { return };
    let (mut tx, mut rx) = ws.split();

    match behavior {
        Behavior::NoSubprotocol => {}
        Behavior::Silent => while let Some(Ok(_)) = rx.next().await {},
        Behavior::Normal if path.ends_with("/download") => {
            let reader = tokio::spawn(async move { while let Some(Ok(_)) = rx.next().await {} });
            let started = tokio::time::Instant::now();
            for _ in 0..CHUNKS {
                if tx.send(Message::binary(vec![0u8; CHUNK])).await.is_err() {
                    return;
                }
            }
            let _ = tx
                .send(server_measurement((CHUNK * CHUNKS) as u64, 0, started.elapsed()))
                .await;
            tokio::time::sleep(Duration::from_millis(200)).await;
            let _ = tx.send(Message::Close(None)).await;
            let _ = reader.await;
        }
        Behavior::Normal => {
            let received = Arc::new(AtomicU64::new(0));
            let counter = Arc::clone(&received);
            let global = stats.upload_bytes.clone();
            let mut reader = tokio::spawn(async move {
                while let Some(Ok(message)) = rx.next().await {
                    if let Message::Binary(data) = message {
                        counter.fetch_add(data.len() as u64, Ordering::Relaxed);
                        global.fetch_add(data.len() as u64, Ordering::Relaxed);
                    }
                }
            });
            let started = tokio::time::Instant::now();
            let mut ticker = tokio::time::interval(Duration::from_millis(100));
            loop {
                tokio::select! {
                    _ = &mut reader => break,
                    _ = ticker.tick() => {
                        let bytes = received.load(Ordering::Relaxed);
                        if tx.send(server_measurement(0, bytes, started.elapsed())).await.is_err() {
                            let _ = (&mut reader).await;
                            break;
                        }
                    }
                }
            }
        }
    }
}

fn test_config(streams: usize, duration_ms: u64) -> TestConfig {
    TestConfig::builder()
        .streams(streams)
        .duration_ms(duration_ms)
        .scheme(Scheme::Ws)
        .build()
        .unwrap()
}

fn static_server(addr: SocketAddr, test: &TestConfig) -> StaticServer {
    let params = QueryParams::new("msak-e2e", "0.0.1", test);
    StaticServer::for_server(Scheme::Ws, &addr.to_string(), &params).unwrap()
}

#[tokio::test]
async fn test_download_and_upload_against_loopback_server() {
    let (addr, stats) = start_server(Behavior::Normal).await;
    let test = test_config(2, 1000);
    let server = static_server(addr, &test);
    let session = Session::new(WsConnector::new(), test);

    let completed = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(Mutex::new(Vec::new()));
    let mut callbacks = Callbacks::new()
        .on_complete({
            let completed = Arc::clone(&completed);
            move |summary| completed.lock().unwrap().push(summary.direction)
        })
        .on_error({
            let errors = Arc::clone(&errors);
            move |error| errors.lock().unwrap().push(error.to_string())
        });

    let summary = session
        .run(&server, PhaseSelection::Both, &mut callbacks)
        .await
        .unwrap();

    assert!(errors.lock().unwrap().is_empty(), "{:?}", errors.lock().unwrap());
    assert_eq!(*completed.lock().unwrap(), vec![Direction::Download, Direction::Upload]);

    let download = summary.download.expect("download phase");
    assert_eq!(download.streams_closed, 2);
    assert_eq!(download.streams_errored, 0);
    for snapshot in &download.snapshots {
        assert_eq!(snapshot.bytes_received, (CHUNK * CHUNKS) as u64);
    }
    assert!(download.result.goodput_bps > 0.0);
    assert_eq!(download.result.min_rtt, Some(Duration::from_micros(MIN_RTT_US)));
    assert!(download.result.retransmission_ratio.unwrap() > 0.0);

    let upload = summary.upload.expect("upload phase");
    assert_eq!(upload.streams_closed, 2);
    assert_eq!(upload.streams_errored, 0);
    assert!(upload.result.goodput_bps > 0.0);
    assert!(upload.result.elapsed_seconds >= 1.0);

    let client_sent: u64 = upload.snapshots.iter().map(|s| s.bytes_sent).sum();
    let server_received = stats.upload_bytes.load(Ordering::Relaxed);
    assert!(server_received > 0);
    assert!(server_received <= client_sent);
}

#[tokio::test]
async fn test_silent_server_streams_are_forced_closed() {
    let (addr, _) = start_server(Behavior::Silent).await;
    let test = test_config(2, 500);
    let server = static_server(addr, &test);
    let session = Session::new(WsConnector::new(), test);

    let started = std::time::Instant::now();
    let summary = session
        .run(&server, PhaseSelection::DownloadOnly, &mut Callbacks::new())
        .await
        .unwrap();

    let download = summary.download.unwrap();
    assert_eq!(download.forced_closures, 2);
    assert_eq!(download.streams_closed, 2);
    assert!(download.errors.is_empty());
    // duration plus the one second safety margin
    assert!(started.elapsed() >= Duration::from_millis(1500));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_missing_subprotocol_fails_streams() {
    let (addr, _) = start_server(Behavior::NoSubprotocol).await;
    let test = test_config(1, 500);
    let server = static_server(addr, &test);
    let session = Session::new(WsConnector::new(), test);

    let err = session
        .run(&server, PhaseSelection::DownloadOnly, &mut Callbacks::new())
        .await
        .unwrap_err();
    assert_eq!(err.category(), "TRANSPORT");
}

#[tokio::test]
async fn test_refused_connection_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let test = test_config(2, 500);
    let server = static_server(addr, &test);
    let session = Session::new(WsConnector::new(), test);

    let errors = Arc::new(Mutex::new(0usize));
    let mut callbacks = Callbacks::new().on_error({
        let errors = Arc::clone(&errors);
        move |_| *errors.lock().unwrap() += 1
    });
    let summary = session
        .run(&server, PhaseSelection::UploadOnly, &mut callbacks)
        .await
        .unwrap();

    let upload = summary.upload.unwrap();
    assert!(upload.all_failed());
    assert_eq!(upload.streams_errored, 2);
    assert_eq!(*errors.lock().unwrap(), 2);
    assert!(upload.errors.iter().all(|e| e.error.category() == "TRANSPORT" && e.terminal));
}

#[tokio::test]
async fn test_app_discovers_server_through_locate() {
    let (addr, _) = start_server(Behavior::Normal).await;
    let locate = MockServer::start().await;
    let body = json!({
        "results": [{
            "machine": "loopback",
            "urls": {
                "ws:///throughput/v1/download": format!("ws://{}/throughput/v1/download?access_token=d", addr),
                "ws:///throughput/v1/upload": format!("ws://{}/throughput/v1/upload?access_token=u", addr)
            }
        }]
    });
    Mock::given(method("GET"))
        .and(path("/v2/nearest/msak/throughput1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(&locate)
        .await;

    let config = Config {
        locate_url: format!("{}/v2/nearest/msak/throughput1", locate.uri()),
        scheme: Scheme::Ws,
        streams: 1,
        duration_ms: 500,
        phases: PhaseSelection::DownloadOnly,
        enable_color: false,
        ..Config::default()
    };
    let summary = App::new(config).run().await.unwrap();

    assert!(summary.endpoints.download.as_str().contains("access_token=d"));
    assert!(summary.endpoints.download.as_str().contains("streams=1"));
    let download = summary.download.unwrap();
    assert_eq!(download.snapshots[0].bytes_received, (CHUNK * CHUNKS) as u64);
}
