//! Relay server
//!
//! Binds the HTTP listener, starts the supervisor and routes:
//!
//! ```text
//! GET /        ──► same as /stream
//! GET /stream  ──► WebSocket, one binary message per JPEG frame
//! GET /signal  ──► WebSocket, JSON signaling messages both ways
//! GET /health  ──► JSON status
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::broadcast::BroadcastHub;
use crate::error::Result;
use crate::server::config::ServerConfig;
use crate::server::connection::{serve_peer, serve_viewer};
use crate::signaling::SignalingRelay;
use crate::stats::{RelayStats, StatsSnapshot};
use crate::supervisor::{ProcessState, Supervisor, SupervisorConfig};

/// Shared state handed to every request handler
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub hub: Arc<BroadcastHub>,
    pub relay: Arc<SignalingRelay>,
    pub stats: Arc<RelayStats>,
    pub process: watch::Receiver<ProcessState>,
    pub shutdown: watch::Receiver<bool>,
}

/// Body of `GET /health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// "ok" while frames are flowing, "degraded" otherwise
    pub status: &'static str,
    /// Transcoder state
    pub transcoder: &'static str,
    pub viewers: usize,
    pub peers: usize,
    pub stats: StatsSnapshot,
}

/// Build the HTTP router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(stream_handler))
        .route("/stream", get(stream_handler))
        .route("/signal", get(signal_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn stream_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| serve_viewer(socket, peer, state))
}

async fn signal_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| serve_peer(socket, peer, state))
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthReport> {
    let process = *state.process.borrow();

    Json(HealthReport {
        status: match process {
            ProcessState::Running { .. } => "ok",
            _ => "degraded",
        },
        transcoder: process.name(),
        viewers: state.hub.viewer_count().await,
        peers: state.relay.peer_count().await,
        stats: state.stats.snapshot(),
    })
}

/// Camera relay server
pub struct RelayServer {
    config: ServerConfig,
    supervisor: SupervisorConfig,
    hub: Arc<BroadcastHub>,
    relay: Arc<SignalingRelay>,
    stats: Arc<RelayStats>,
}

impl RelayServer {
    /// Create a new server
    pub fn new(config: ServerConfig, supervisor: SupervisorConfig) -> Self {
        Self {
            config,
            supervisor,
            hub: Arc::new(BroadcastHub::new()),
            relay: Arc::new(SignalingRelay::new()),
            stats: Arc::new(RelayStats::new()),
        }
    }

    /// Get a reference to the broadcast hub
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Get a reference to the signaling relay
    pub fn relay(&self) -> &Arc<SignalingRelay> {
        &self.relay
    }

    /// Get a reference to the shared counters
    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.stats
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run the server until the process is killed
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already-bound listener
    ///
    /// On shutdown the transcoder is killed, every viewer and peer is
    /// disconnected, and the listener is closed.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Self {
            config,
            supervisor,
            hub,
            relay,
            stats,
        } = self;

        tracing::info!(addr = %listener.local_addr()?, "Relay listening");

        let supervisor = Supervisor::new(supervisor, Arc::clone(&hub), Arc::clone(&stats)).start();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = AppState {
            config: config.clone(),
            hub: Arc::clone(&hub),
            relay: Arc::clone(&relay),
            stats: Arc::clone(&stats),
            process: supervisor.subscribe_state(),
            shutdown: shutdown_rx,
        };
        let stats_task = spawn_stats_task(config.stats_interval, state.clone());

        let signal = async move {
            shutdown.await;
            tracing::info!("Shutdown signal received");
            shutdown_tx.send_replace(true);
        };

        let result = axum::serve(
            listener,
            router(state).into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await;

        supervisor.shutdown().await;
        stats_task.abort();

        let viewers = hub.close_all().await;
        let peers = relay.close_all().await;
        tracing::info!(viewers, peers, "Relay stopped");

        result?;
        Ok(())
    }
}

/// Periodically log relay counters
fn spawn_stats_task(interval: Duration, state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let process = *state.process.borrow();
            let viewers = state.hub.viewer_count().await;
            let peers = state.relay.peer_count().await;
            let snap = state.stats.snapshot();
            tracing::info!(
                transcoder = %process,
                viewers,
                peers,
                frames = snap.frames_published,
                skipped = snap.frames_skipped,
                restarts = snap.restarts,
                bitrate = snap.bitrate(),
                "Relay stats"
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use futures::{SinkExt, StreamExt};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    use crate::broadcast::Frame;
    use crate::signaling::SignalMessage;
    use crate::supervisor::TranscoderCommand;

    use super::*;

    fn test_server() -> RelayServer {
        let supervisor = SupervisorConfig::new(
            TranscoderCommand::new("rtsp://127.0.0.1:1/none").program("/nonexistent/camrelay-ffmpeg"),
        );
        RelayServer::new(ServerConfig::default(), supervisor)
    }

    async fn get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_health_and_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let server = tokio::spawn(test_server().serve(listener, async {
            let _ = stop_rx.await;
        }));

        let response = get(addr, "/health").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains(r#""status":"degraded""#));
        assert!(response.contains(r#""viewers":0"#));

        stop_tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), server).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let server = tokio::spawn(test_server().serve(listener, async {
            let _ = stop_rx.await;
        }));

        let response = get(addr, "/nope").await;
        assert!(response.starts_with("HTTP/1.1 404"));

        stop_tx.send(()).unwrap();
        let _ = server.await;
    }

    #[tokio::test]
    async fn test_stream_requires_upgrade() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let server = tokio::spawn(test_server().serve(listener, async {
            let _ = stop_rx.await;
        }));

        // Plain GET without the WebSocket handshake headers is rejected
        let response = get(addr, "/stream").await;
        assert!(!response.starts_with("HTTP/1.1 101"));
        assert!(!response.starts_with("HTTP/1.1 200"));

        stop_tx.send(()).unwrap();
        let _ = server.await;
    }

    /// Server bound to a loopback port, stopped by `stop`
    struct TestRelay {
        addr: SocketAddr,
        hub: Arc<BroadcastHub>,
        relay: Arc<SignalingRelay>,
        stats: Arc<RelayStats>,
        stop: tokio::sync::oneshot::Sender<()>,
        task: JoinHandle<Result<()>>,
    }

    impl TestRelay {
        async fn start() -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let server = test_server();
            let hub = Arc::clone(server.hub());
            let relay = Arc::clone(server.relay());
            let stats = Arc::clone(server.stats());
            let (stop, stop_rx) = tokio::sync::oneshot::channel::<()>();

            let task = tokio::spawn(server.serve(listener, async {
                let _ = stop_rx.await;
            }));

            Self {
                addr,
                hub,
                relay,
                stats,
                stop,
                task,
            }
        }

        async fn connect(&self, path: &str) -> WsClient {
            let url = format!("ws://{}{}", self.addr, path);
            let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
            ws
        }

        async fn shutdown(self) {
            self.stop.send(()).unwrap();
            let result = tokio::time::timeout(Duration::from_secs(5), self.task).await;
            assert!(matches!(result, Ok(Ok(Ok(())))));
        }
    }

    type WsClient =
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<TcpStream>>;

    async fn eventually<F, Fut>(check: F)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = bool>,
    {
        let waited = tokio::time::timeout(Duration::from_secs(5), async {
            while !check().await {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(waited.is_ok());
    }

    async fn next_message(ws: &mut WsClient) -> WsMessage {
        tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_viewer_gets_one_binary_message_per_frame() {
        let relay = TestRelay::start().await;
        let mut viewer = relay.connect("/stream").await;
        let hub = &relay.hub;
        eventually(move || async move { hub.viewer_count().await == 1 }).await;

        relay
            .hub
            .publish(Frame::new(1, Bytes::from_static(b"\xff\xd8\x01\xff\xd9")))
            .await;
        relay
            .hub
            .publish(Frame::new(2, Bytes::from_static(b"\xff\xd8\x02\x02\xff\xd9")))
            .await;

        match next_message(&mut viewer).await {
            WsMessage::Binary(data) => assert_eq!(&data[..], b"\xff\xd8\x01\xff\xd9"),
            other => panic!("expected binary frame, got {other:?}"),
        }
        match next_message(&mut viewer).await {
            WsMessage::Binary(data) => assert_eq!(&data[..], b"\xff\xd8\x02\x02\xff\xd9"),
            other => panic!("expected binary frame, got {other:?}"),
        }

        relay.shutdown().await;
    }

    #[tokio::test]
    async fn test_root_path_serves_frames() {
        let relay = TestRelay::start().await;
        let mut viewer = relay.connect("/").await;
        let hub = &relay.hub;
        eventually(move || async move { hub.viewer_count().await == 1 }).await;

        relay
            .hub
            .publish(Frame::new(1, Bytes::from_static(b"\xff\xd8\xff\xd9")))
            .await;

        assert_eq!(
            next_message(&mut viewer).await,
            WsMessage::Binary(Bytes::from_static(b"\xff\xd8\xff\xd9"))
        );

        relay.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_sends_close_to_viewers() {
        let relay = TestRelay::start().await;
        let mut viewer = relay.connect("/stream").await;
        let hub = Arc::clone(&relay.hub);
        let viewers = &hub;
        eventually(move || async move { viewers.viewer_count().await == 1 }).await;

        relay.shutdown().await;

        assert!(matches!(next_message(&mut viewer).await, WsMessage::Close(_)));
        assert_eq!(hub.viewer_count().await, 0);
    }

    #[tokio::test]
    async fn test_signal_reaches_other_peers_only() {
        let relay = TestRelay::start().await;
        let mut a = relay.connect("/signal").await;
        let mut b = relay.connect("/signal").await;
        let peers = &relay.relay;
        eventually(move || async move { peers.peer_count().await == 2 }).await;

        a.send(WsMessage::text("not json")).await.unwrap();
        a.send(WsMessage::text(
            r#"{"type":"offer","payload":{"type":"offer","sdp":"v=0"}}"#,
        ))
        .await
        .unwrap();

        let text = match next_message(&mut b).await {
            WsMessage::Text(text) => text,
            other => panic!("expected text message, got {other:?}"),
        };
        let received: SignalMessage = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(
            received,
            SignalMessage::offer(serde_json::json!({"type": "offer", "sdp": "v=0"}))
        );

        // Nothing is echoed back to the sender
        let echoed = tokio::time::timeout(Duration::from_millis(200), a.next()).await;
        assert!(echoed.is_err());

        let snap = relay.stats.snapshot();
        assert_eq!(snap.signals_malformed, 1);
        assert_eq!(snap.signals_relayed, 1);

        relay.shutdown().await;
    }

    #[test]
    fn test_accessors() {
        let server = test_server();

        assert_eq!(server.bind_addr().port(), 9999);
        assert_eq!(Arc::strong_count(server.hub()), 1);
        assert_eq!(Arc::strong_count(server.relay()), 1);
        assert_eq!(server.stats().snapshot().frames_published, 0);
    }
}
