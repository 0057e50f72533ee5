//! WebSocket stream session.
//!
//! [`connect`] opens the channel and spawns one actor task that owns the
//! [`Reconciler`] for the lifetime of the connection:
//!
//! 1. **Inbound** – every text frame is decoded and applied strictly in
//!    arrival order; each visible change is published on a
//!    [`tokio::sync::watch`] channel (single writer, many readers).
//!
//! 2. **Outbound** – control frames queued by the [`CommandEmitter`] are
//!    written to the socket by the same task, so no lock guards the sink.
//!
//! When the channel closes (either side, or a transport error) the actor
//! stops applying events, drops its reconciler and reports a
//! [`SessionSummary`].  The last published snapshot stays readable.  A
//! reconnect is simply another [`connect`] call and starts from an empty
//! [`StreamState`] with a new session id.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use futures_util::{SinkExt, StreamExt};
use railviz_types::{ChannelStatus, ControlIntent, FrameIndex, StreamError};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};
use uuid::Uuid;

use crate::decoder;
use crate::emitter::{CommandEmitter, ControlChannel, EmitOutcome};
use crate::reconciler::{ConsistencyMode, Reconciler, ReconcilerStats, StreamState};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default stream endpoint of the sensor pipeline.
pub const DEFAULT_STREAM_URL: &str = "ws://localhost:8000";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Parameters for one stream connection.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub url: String,
    pub consistency: ConsistencyMode,
}

impl SessionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            consistency: ConsistencyMode::Weak,
        }
    }

    /// Override the consistency mode (builder-style).
    pub fn with_consistency(mut self, consistency: ConsistencyMode) -> Self {
        self.consistency = consistency;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_STREAM_URL)
    }
}

// ---------------------------------------------------------------------------
// Shared channel status
// ---------------------------------------------------------------------------

/// Lock-free cell holding the [`ChannelStatus`] shared between the actor and
/// every handle.
#[derive(Debug, Clone)]
pub struct StatusCell(Arc<AtomicU8>);

impl StatusCell {
    pub fn new(status: ChannelStatus) -> Self {
        Self(Arc::new(AtomicU8::new(status as u8)))
    }

    pub fn get(&self) -> ChannelStatus {
        ChannelStatus::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn set(&self, status: ChannelStatus) {
        self.0.store(status as u8, Ordering::SeqCst);
    }
}

#[derive(Debug)]
enum Outbound {
    Text(String),
    Close,
}

/// [`ControlChannel`] backed by the session actor's outbound queue.
#[derive(Debug, Clone)]
pub struct WsControlChannel {
    status: StatusCell,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ControlChannel for WsControlChannel {
    fn status(&self) -> ChannelStatus {
        self.status.get()
    }

    fn send_text(&self, text: &str) -> Result<(), StreamError> {
        self.tx
            .send(Outbound::Text(text.to_string()))
            .map_err(|_| StreamError::ChannelClosed)
    }
}

// ---------------------------------------------------------------------------
// Handle & summary
// ---------------------------------------------------------------------------

/// Client-side handle to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    session_id: Uuid,
    snapshots: watch::Receiver<StreamState>,
    emitter: CommandEmitter<WsControlChannel>,
}

impl SessionHandle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn status(&self) -> ChannelStatus {
        self.emitter.channel().status()
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> StreamState {
        self.snapshots.borrow().clone()
    }

    /// A fresh receiver for snapshot change notifications.
    pub fn subscribe(&self) -> watch::Receiver<StreamState> {
        self.snapshots.clone()
    }

    /// Emit a control intent; dropped unless the channel is open.
    pub fn emit(&self, intent: ControlIntent) -> EmitOutcome {
        self.emitter.emit(intent)
    }

    /// Ask the actor to close the channel.  Idempotent.
    pub fn close(&self) {
        let channel = self.emitter.channel();
        if channel.status.get() == ChannelStatus::Open {
            channel.status.set(ChannelStatus::Closing);
        }
        let _ = channel.tx.send(Outbound::Close);
    }
}

/// Totals reported when a session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: Uuid,
    /// Inbound text frames received.
    pub messages: u64,
    /// Inbound frames that failed to decode.
    pub dropped: u64,
    pub final_frame: FrameIndex,
    pub stats: ReconcilerStats,
}

// ---------------------------------------------------------------------------
// connect
// ---------------------------------------------------------------------------

/// Open the stream channel at `config.url` and start its actor.
///
/// # Errors
///
/// Returns [`StreamError::Transport`] when the WebSocket handshake fails.
/// Once connected, failures are reported through the returned task's
/// result instead.
#[instrument(skip_all, fields(url = %config.url))]
pub async fn connect(
    config: SessionConfig,
) -> Result<(SessionHandle, JoinHandle<Result<SessionSummary, StreamError>>), StreamError> {
    let status = StatusCell::new(ChannelStatus::Connecting);

    let (ws, _response) = connect_async(config.url.as_str()).await.map_err(|e| {
        status.set(ChannelStatus::Closed);
        StreamError::Transport(format!("connect to {}: {e}", config.url))
    })?;
    status.set(ChannelStatus::Open);

    let session_id = Uuid::new_v4();
    let reconciler = Reconciler::new(session_id, config.consistency);
    info!(%session_id, mode = ?reconciler.mode(), "stream channel open");

    let (snap_tx, snap_rx) = watch::channel(reconciler.snapshot());
    let (out_tx, out_rx) = mpsc::unbounded_channel();

    let handle = SessionHandle {
        session_id,
        snapshots: snap_rx,
        emitter: CommandEmitter::new(WsControlChannel {
            status: status.clone(),
            tx: out_tx,
        }),
    };

    let actor = Actor {
        reconciler,
        snapshots: snap_tx,
        outbound: out_rx,
        status,
        messages: 0,
        dropped: 0,
    };
    let span = info_span!("session", %session_id, url = %config.url);
    let task = tokio::spawn(actor.run(ws).instrument(span));

    Ok((handle, task))
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct Actor {
    reconciler: Reconciler,
    snapshots: watch::Sender<StreamState>,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    status: StatusCell,
    messages: u64,
    dropped: u64,
}

impl Actor {
    async fn run(mut self, ws: WsStream) -> Result<SessionSummary, StreamError> {
        let (mut ws_tx, mut ws_rx) = ws.split();
        let mut result = Ok(());

        loop {
            tokio::select! {
                // ── Inbound: stream → reconciler ────────────────────────────
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()),
                        Some(Ok(Message::Binary(bytes))) => {
                            self.messages += 1;
                            self.dropped += 1;
                            warn!(bytes = bytes.len(), "dropping binary frame; stream is text-only");
                        }
                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "peer closed stream channel");
                            break;
                        }
                        None => break,
                        Some(Err(e)) => {
                            error!(error = %e, "stream transport error");
                            result = Err(StreamError::Transport(e.to_string()));
                            break;
                        }
                        Some(Ok(_)) => {}
                    }
                }
                // ── Outbound: emitter → stream ──────────────────────────────
                out = self.outbound.recv() => {
                    match out {
                        Some(Outbound::Text(text)) => {
                            if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                                error!(error = %e, "failed to write control frame");
                                result = Err(StreamError::Transport(e.to_string()));
                                break;
                            }
                        }
                        Some(Outbound::Close) | None => {
                            self.status.set(ChannelStatus::Closing);
                            if let Err(e) = ws_tx.send(Message::Close(None)).await {
                                debug!(error = %e, "close frame not delivered");
                            }
                            break;
                        }
                    }
                }
            }
        }

        self.status.set(ChannelStatus::Closed);
        let summary = SessionSummary {
            session_id: self.reconciler.snapshot().session_id(),
            messages: self.messages,
            dropped: self.dropped,
            final_frame: self.reconciler.snapshot().frame(),
            stats: self.reconciler.stats(),
        };
        info!(
            session_id = %summary.session_id,
            messages = summary.messages,
            dropped = summary.dropped,
            final_frame = summary.final_frame,
            "stream channel closed"
        );
        result.map(|()| summary)
    }

    fn handle_text(&mut self, text: &str) {
        self.messages += 1;
        let Some(event) = decoder::decode_or_report(text) else {
            self.dropped += 1;
            return;
        };
        if self.reconciler.apply(event) {
            self.snapshots.send_replace(self.reconciler.snapshot());
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::time::timeout;
    use tokio_tungstenite::accept_async;

    const WAIT: Duration = Duration::from_secs(5);

    /// How the loopback producer finishes after sending its script.
    #[derive(Clone, Copy)]
    enum Ending {
        /// Keep reading client frames, forwarding text to the test.
        HoldOpen,
        /// Send a close frame.
        Close,
        /// Drop the TCP stream without a closing handshake.
        Abort,
    }

    /// Loopback producer: sends `script`, then finishes as `ending` says.
    async fn spawn_producer(
        script: Vec<&'static str>,
        ending: Ending,
    ) -> (String, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = accept_async(stream).await.unwrap();
            let (mut sink, mut source) = ws.split();
            for msg in script {
                sink.send(Message::Text(msg.to_string().into())).await.unwrap();
            }
            match ending {
                Ending::HoldOpen => {}
                Ending::Close => {
                    let _ = sink.close().await;
                    return;
                }
                Ending::Abort => {
                    drop(sink);
                    drop(source);
                    return;
                }
            }
            while let Some(Ok(msg)) = source.next().await {
                match msg {
                    Message::Text(text) => {
                        let _ = tx.send(text.as_str().to_string());
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        });

        (format!("ws://{addr}"), rx)
    }

    #[tokio::test]
    async fn session_reconciles_stream_and_emits_toggle() {
        let (url, mut received) = spawn_producer(
            vec![
                r#"{"type":"point","data":[{"x":1,"y":1,"z":1},{"x":2,"y":2,"z":2}]}"#,
                r#"{"type":"detections","data":[{"id":1,"position":{"x":0,"y":0,"z":3},"velocity":{"vx":1,"vy":0,"vz":0}}]}"#,
                r#"{"type":"lidar_meta","data":{}}"#,
                r#"{"type":"frame","frame":5}"#,
                r#"{"type":"frame","frame":7}"#,
            ],
            Ending::HoldOpen,
        )
        .await;

        let (handle, task) = connect(SessionConfig::new(url)).await.unwrap();
        assert_eq!(handle.status(), ChannelStatus::Open);

        let mut rx = handle.subscribe();
        let snap = timeout(WAIT, rx.wait_for(|s| s.frame() == 7))
            .await
            .expect("frame 7 in time")
            .expect("session alive")
            .clone();
        assert_eq!(snap.points().len(), 2);
        assert_eq!(snap.detections().len(), 1);
        assert_eq!(snap.session_id(), handle.session_id());

        assert_eq!(handle.emit(ControlIntent::TogglePlayback), EmitOutcome::Sent);
        let token = timeout(WAIT, received.recv()).await.unwrap().unwrap();
        assert_eq!(token, "toggle_pause");

        handle.close();
        let summary = timeout(WAIT, task).await.unwrap().unwrap().unwrap();
        assert_eq!(summary.messages, 5);
        assert_eq!(summary.dropped, 1);
        assert_eq!(summary.final_frame, 7);
        assert_eq!(handle.status(), ChannelStatus::Closed);
    }

    #[tokio::test]
    async fn peer_close_ends_session_and_drops_later_intents() {
        let (url, _received) = spawn_producer(
            vec![r#"{"type":"image1","data":"aGk="}"#, r#"{"type":"frame","frame":1}"#],
            Ending::Close,
        )
        .await;

        let (handle, task) = connect(SessionConfig::new(url)).await.unwrap();
        let summary = timeout(WAIT, task).await.unwrap().unwrap().unwrap();
        assert_eq!(summary.final_frame, 1);

        assert_eq!(handle.status(), ChannelStatus::Closed);
        assert_eq!(handle.emit(ControlIntent::TogglePlayback), EmitOutcome::Dropped);

        // The last snapshot survives the channel.
        let snap = handle.snapshot();
        assert_eq!(snap.frame(), 1);
        assert_eq!(snap.image1().unwrap().encoded(), "aGk=");
    }

    #[tokio::test]
    async fn transport_error_ends_session_and_keeps_last_snapshot() {
        let (url, _received) = spawn_producer(
            vec![
                r#"{"type":"point","data":[{"x":1,"y":1,"z":1}]}"#,
                r#"{"type":"frame","frame":3}"#,
            ],
            Ending::Abort,
        )
        .await;

        let (handle, task) = connect(SessionConfig::new(url)).await.unwrap();
        let result = timeout(WAIT, task).await.unwrap().unwrap();
        assert!(matches!(result, Err(StreamError::Transport(_))), "got {result:?}");

        assert_eq!(handle.status(), ChannelStatus::Closed);
        assert_eq!(handle.emit(ControlIntent::TogglePlayback), EmitOutcome::Dropped);
        let snap = handle.snapshot();
        assert_eq!(snap.frame(), 3);
        assert_eq!(snap.points().len(), 1);
    }

    #[tokio::test]
    async fn strict_session_publishes_only_complete_frames() {
        let (url, _received) = spawn_producer(
            vec![
                r#"{"type":"point","data":[{"x":1,"y":1,"z":1}]}"#,
                r#"{"type":"frame","frame":1}"#,
                r#"{"type":"point","data":[{"x":1,"y":1,"z":1},{"x":2,"y":2,"z":2}]}"#,
                r#"{"type":"detections","data":[]}"#,
                r#"{"type":"frame","frame":2}"#,
            ],
            Ending::Close,
        )
        .await;

        let required = [
            railviz_types::StreamCategory::Points,
            railviz_types::StreamCategory::Detections,
        ]
        .into_iter()
        .collect();
        let config =
            SessionConfig::new(url).with_consistency(ConsistencyMode::Strict { required });
        let (handle, task) = connect(config).await.unwrap();
        let summary = timeout(WAIT, task).await.unwrap().unwrap().unwrap();

        assert_eq!(summary.stats.discarded_frames, 1);
        assert_eq!(summary.stats.committed_frames, 1);
        let snap = handle.snapshot();
        assert_eq!(snap.frame(), 2);
        assert_eq!(snap.points().len(), 2);
    }

    #[tokio::test]
    async fn connect_failure_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = connect(SessionConfig::new(format!("ws://{addr}")))
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::Transport(_)));
    }

    /// Records the name of every span opened while it is the default.
    struct SpanNames(Arc<std::sync::Mutex<Vec<String>>>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for SpanNames {
        fn on_new_span(
            &self,
            attrs: &tracing::span::Attributes<'_>,
            _id: &tracing::span::Id,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            self.0.lock().unwrap().push(attrs.metadata().name().to_string());
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn connect_and_actor_run_inside_spans() {
        use tracing_subscriber::layer::SubscriberExt;

        let names = Arc::new(std::sync::Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(SpanNames(names.clone()));
        let _guard = tracing::subscriber::set_default(subscriber);

        let (url, _received) =
            spawn_producer(vec![r#"{"type":"frame","frame":1}"#], Ending::Close).await;
        let (_handle, task) = connect(SessionConfig::new(url)).await.unwrap();
        timeout(WAIT, task).await.unwrap().unwrap().unwrap();

        let names = names.lock().unwrap();
        assert!(names.iter().any(|n| n == "connect"), "spans: {names:?}");
        assert!(names.iter().any(|n| n == "session"), "spans: {names:?}");
    }

    #[test]
    fn status_cell_is_shared_between_clones() {
        let a = StatusCell::new(ChannelStatus::Connecting);
        let b = a.clone();
        a.set(ChannelStatus::Open);
        assert_eq!(b.get(), ChannelStatus::Open);
    }

    #[test]
    fn default_config_points_at_local_producer() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.url, DEFAULT_STREAM_URL);
        assert_eq!(cfg.consistency, ConsistencyMode::Weak);
    }
}
