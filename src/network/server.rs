//! WebSocket stream server
//!
//! Serves the frame stream on `/` and the JSON status API alongside it:
//!
//! | Path | Description |
//! |------|-------------|
//! | `/` | WebSocket upgrade; one binary message per Opus frame |
//! | `/status` | Server mode, active sessions, uptime and stream format |
//! | `/sessions` | Per-session peer, connect time and counters |

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use futures_util::stream::{SplitSink, StreamExt};
use futures_util::SinkExt;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::Instrument;

use crate::audio::{AudioFormat, FrameSource};
use crate::codec::OpusEncoder;
use crate::config::{AppConfig, OpusConfig, Pacing, StatusConfig};
use crate::error::{Error, Result, TransportError};
use crate::network::handlers;
use crate::network::{EncodedFrame, FrameSink};
use crate::session::{SessionRegistry, StreamOptions, StreamSession};

/// Close code sent with every server-initiated close
const CLOSE_NORMAL: u16 = 1000;

/// Reason sent when the source cannot be loaded for a connection
const CLOSE_REASON_NOT_LOADED: &str = "Audio not loaded";

/// How long a failed send waits for the reader to confirm the peer left
const PEER_CLOSE_GRACE: Duration = Duration::from_millis(50);

/// How long shutdown waits for open stream sessions to send their close frame
const SESSION_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared state passed to all request handlers
pub struct ServerState {
    pub format: AudioFormat,
    pub source_path: PathBuf,
    pub codec: OpusConfig,
    pub pacing: Pacing,
    pub status: StatusConfig,
    pub registry: SessionRegistry,
    pub started: Instant,
    /// Flips to `true` when the server is stopping
    pub shutdown: watch::Receiver<bool>,
}

impl ServerState {
    pub fn from_config(config: &AppConfig, shutdown: watch::Receiver<bool>) -> Result<Self> {
        Ok(Self {
            format: config.audio_format()?,
            source_path: config.server.source_path.clone(),
            codec: config.codec.clone(),
            pacing: config.server.pacing,
            status: config.status.clone(),
            registry: SessionRegistry::new(),
            started: Instant::now(),
            shutdown,
        })
    }

    fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            frame_duration: self.format.frame_duration(),
            pacing: self.pacing,
            sent_every: self.status.sent_every,
            compression_every: self.status.compression_every,
        }
    }
}

/// Bound, not yet serving, stream server
pub struct StreamServer {
    listener: TcpListener,
    state: Arc<ServerState>,
    stop: watch::Sender<bool>,
}

impl StreamServer {
    /// Bind the listen address from `config`
    pub async fn bind(config: &AppConfig) -> Result<Self> {
        let (stop, shutdown) = watch::channel(false);
        let state = ServerState::from_config(config, shutdown)?;
        let addr = &config.server.bind_address;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::BindFailed {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            listener,
            state: Arc::new(state),
            stop,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Registry of live sessions, shared with the status API
    pub fn registry(&self) -> SessionRegistry {
        self.state.registry.clone()
    }

    pub fn router(state: Arc<ServerState>) -> Router {
        Router::new()
            .route("/", get(handle_websocket))
            .route("/status", get(handlers::get_status))
            .route("/sessions", get(handlers::get_sessions))
            .fallback(handlers::not_found)
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Accept connections until `shutdown` resolves
    ///
    /// Upgraded stream sessions are told to stop and get a bounded window to
    /// send their close frame before this returns.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        let Self {
            listener,
            state,
            stop,
        } = self;
        let registry = state.registry.clone();
        let app = Self::router(state);
        tracing::info!("Stream server listening on ws://{}", addr);

        let stop = Arc::new(stop);
        let notify = stop.clone();
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.await;
            notify.send_replace(true);
        })
        .await
        .map_err(Error::Io)?;

        // Every live session holds a receiver through the shared state
        if tokio::time::timeout(SESSION_DRAIN_TIMEOUT, stop.closed())
            .await
            .is_err()
        {
            tracing::warn!("{} sessions still open at shutdown", registry.len());
        }

        tracing::info!("Stream server stopped");
        Ok(())
    }
}

/// Handles WebSocket upgrade requests to `/`
async fn handle_websocket(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<Arc<ServerState>>,
) -> Response {
    let span = tracing::info_span!("session", %peer);
    ws.on_upgrade(move |socket| serve_connection(socket, peer, state).instrument(span))
}

/// Run one stream session on an upgraded socket
async fn serve_connection(mut socket: WebSocket, peer: SocketAddr, state: Arc<ServerState>) {
    tracing::info!("Client connected");

    let path = state.source_path.clone();
    let format = state.format;
    let loaded = tokio::task::spawn_blocking(move || FrameSource::load(&path, &format)).await;

    let source = match loaded {
        Ok(Ok(source)) => source,
        Ok(Err(e)) => {
            tracing::error!("Failed to load {}: {}", state.source_path.display(), e);
            close_with_reason(&mut socket, CLOSE_REASON_NOT_LOADED).await;
            return;
        }
        Err(e) => {
            tracing::error!("Source load task failed: {}", e);
            close_with_reason(&mut socket, CLOSE_REASON_NOT_LOADED).await;
            return;
        }
    };

    let encoder = match OpusEncoder::new(&format, &state.codec) {
        Ok(encoder) => encoder,
        Err(e) => {
            tracing::error!("Failed to create encoder: {}", e);
            close_with_reason(&mut socket, "").await;
            return;
        }
    };

    let tracker = state.registry.register(peer.to_string());
    tracing::info!(session = %tracker.id(), "Streaming {} frames per loop", source.frames_per_loop());

    let sink = WsFrameSink::new(socket);
    let report = StreamSession::new(source, encoder, sink, state.stream_options())
        .with_tracker(tracker)
        .with_shutdown(state.shutdown.clone())
        .run()
        .await;

    match &report.error {
        Some(e) => tracing::error!(
            "Session failed after {} frames: {}",
            report.frames_sent,
            e
        ),
        None => tracing::info!(
            "Client disconnected after {} frames ({:.1}x compression)",
            report.frames_sent,
            report.stats.ratio()
        ),
    }
}

async fn close_with_reason(socket: &mut WebSocket, reason: &'static str) {
    let frame = CloseFrame {
        code: CLOSE_NORMAL,
        reason: reason.into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

/// Server side of a WebSocket connection
///
/// A background reader drains incoming messages so pings are answered and a
/// peer close is noticed while the session is between sends.
pub struct WsFrameSink {
    sink: SplitSink<WebSocket, Message>,
    peer_closed: watch::Receiver<bool>,
    reader: JoinHandle<()>,
}

impl WsFrameSink {
    pub fn new(socket: WebSocket) -> Self {
        let (sink, mut stream) = socket.split();
        let (closed_tx, peer_closed) = watch::channel(false);

        let reader = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {} // Ignore other messages
                }
            }
            let _ = closed_tx.send(true);
        });

        Self {
            sink,
            peer_closed,
            reader,
        }
    }

    fn is_peer_closed(&self) -> bool {
        *self.peer_closed.borrow()
    }
}

impl FrameSink for WsFrameSink {
    async fn send_frame(&mut self, frame: EncodedFrame) -> std::result::Result<(), TransportError> {
        if self.is_peer_closed() {
            return Err(TransportError::ConnectionClosed);
        }

        match self.sink.send(Message::Binary(frame.to_vec())).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // The reader usually sees the disconnect right after the write fails
                let mut peer_closed = self.peer_closed.clone();
                let confirmed =
                    tokio::time::timeout(PEER_CLOSE_GRACE, peer_closed.wait_for(|closed| *closed))
                        .await
                        .is_ok();
                if confirmed {
                    Err(TransportError::ConnectionClosed)
                } else {
                    Err(TransportError::SendFailed(e.to_string()))
                }
            }
        }
    }

    async fn closed(&mut self) {
        // An error means the reader is gone, which also means the peer is
        let _ = self.peer_closed.wait_for(|closed| *closed).await;
    }

    async fn close(&mut self) {
        let frame = CloseFrame {
            code: CLOSE_NORMAL,
            reason: "".into(),
        };
        let _ = self.sink.send(Message::Close(Some(frame))).await;
        let _ = self.sink.close().await;
    }
}

impl Drop for WsFrameSink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
