//! STOMP over WebSocket Client
//!
//! Implements the [`SessionConnector`] port.
//!
//! # Session lifecycle
//!
//! 1. Open the WebSocket and send `CONNECT` with the client heart-beat.
//! 2. Wait for `CONNECTED` (or fail on `ERROR`), all within the connect
//!    timeout, and negotiate heart-beat intervals.
//! 3. Spawn the session task. It owns the socket, writes queued frames and
//!    heart-beats, and delivers `MESSAGE` frames to the session handler.
//! 4. The task ends on `Session::disconnect` (after sending `DISCONNECT`,
//!    no callback) or on failure (one callback: `ERROR` frames and
//!    undecodable input are protocol errors, everything else is a
//!    transport error).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::http::Uri;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::codec::StompCodec;
use super::frame::{StompCommand, StompFrame};
use super::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatState, HeartbeatTasks};
use crate::application::ports::{
    InboundFrame, Session, SessionConnector, SessionError, SessionHandler, TaskScheduler,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Frames queued per session before `subscribe` waits.
const OUTBOUND_CAPACITY: usize = 32;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the STOMP client.
#[derive(Debug, Clone)]
pub struct StompClientConfig {
    /// Heart-beat intervals advertised in `CONNECT`.
    pub heartbeat: HeartbeatConfig,
    /// Upper bound on WebSocket connect plus `CONNECT` / `CONNECTED`.
    pub connect_timeout: Duration,
    /// Value of the `host` header; defaults to the URL's host.
    pub virtual_host: Option<String>,
}

impl Default for StompClientConfig {
    fn default() -> Self {
        Self {
            heartbeat: HeartbeatConfig::default(),
            connect_timeout: Duration::from_secs(10),
            virtual_host: None,
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// STOMP client opening one session per [`SessionConnector::connect`] call.
///
/// Heart-beat tasks are scheduled on the scheduler passed at construction,
/// normally a [`HeartbeatScheduler`](crate::infrastructure::scheduler::HeartbeatScheduler).
pub struct StompClient {
    config: StompClientConfig,
    codec: StompCodec,
    scheduler: Arc<dyn TaskScheduler>,
}

impl std::fmt::Debug for StompClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StompClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StompClient {
    /// Create a new client.
    #[must_use]
    pub fn new(config: StompClientConfig, scheduler: Arc<dyn TaskScheduler>) -> Self {
        Self {
            config,
            codec: StompCodec::new(),
            scheduler,
        }
    }

    fn host_for(&self, url: &str) -> String {
        if let Some(host) = &self.config.virtual_host {
            return host.clone();
        }
        url.parse::<Uri>()
            .ok()
            .and_then(|uri| uri.host().map(str::to_string))
            .unwrap_or_default()
    }

    /// Open the socket and complete the `CONNECT` / `CONNECTED` exchange.
    async fn handshake(&self, url: &str) -> Result<(WsStream, StompFrame), SessionError> {
        let (mut ws, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| SessionError::Handshake(e.to_string()))?;

        let connect = StompFrame::connect(&self.host_for(url), self.config.heartbeat.header_value());
        let encoded = self
            .codec
            .encode(&connect)
            .map_err(|e| SessionError::Handshake(e.to_string()))?;
        ws.send(Message::Text(encoded.into()))
            .await
            .map_err(|e| SessionError::Handshake(format!("failed to send CONNECT: {e}")))?;

        loop {
            let payload = match ws.next().await {
                Some(Ok(Message::Text(text))) => text.as_bytes().to_vec(),
                Some(Ok(Message::Binary(data))) => data.to_vec(),
                Some(Ok(Message::Close(_))) | None => {
                    return Err(SessionError::Handshake(
                        "connection closed before CONNECTED".to_string(),
                    ));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(SessionError::Handshake(e.to_string())),
            };

            let frames = self
                .codec
                .decode(&payload)
                .map_err(|e| SessionError::Handshake(e.to_string()))?;
            let Some(frame) = frames.into_iter().next() else {
                continue;
            };

            return match frame.command {
                StompCommand::Connected => Ok((ws, frame)),
                StompCommand::Error => Err(SessionError::Handshake(frame.error_summary())),
                other => Err(SessionError::Handshake(format!(
                    "expected CONNECTED, got {other}"
                ))),
            };
        }
    }
}

#[async_trait]
impl SessionConnector for StompClient {
    async fn connect(
        &self,
        url: &str,
        handler: Arc<dyn SessionHandler>,
    ) -> Result<Arc<dyn Session>, SessionError> {
        let timeout = self.config.connect_timeout;
        let (mut ws, connected) = tokio::time::timeout(timeout, self.handshake(url))
            .await
            .map_err(|_| {
                SessionError::Handshake(format!(
                    "no CONNECTED frame within {}s",
                    timeout.as_secs()
                ))
            })??;

        let negotiated = self
            .config
            .heartbeat
            .negotiate(connected.get("heart-beat"));

        let (heartbeat_tx, heartbeat_rx) = mpsc::channel(8);
        let heartbeat_state = Arc::new(HeartbeatState::new());
        let heartbeat_tasks = match HeartbeatTasks::start(
            self.scheduler.as_ref(),
            negotiated,
            Arc::clone(&heartbeat_state),
            heartbeat_tx.clone(),
        ) {
            Ok(tasks) => tasks,
            Err(e) => {
                let _ = ws.close(None).await;
                return Err(SessionError::Handshake(e.to_string()));
            }
        };

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let session = Arc::new(StompSession::new(
            outbound_tx,
            connected.get("session").map(str::to_string),
        ));

        tracing::info!(
            session = %session.id(),
            server_session = session.server_session().unwrap_or("-"),
            version = connected.get("version").unwrap_or("1.0"),
            send_heartbeat_ms = negotiated.send.map_or(0, |d| d.as_millis()),
            receive_heartbeat_ms = negotiated.receive.map_or(0, |d| d.as_millis()),
            "STOMP session established"
        );

        let (write, read) = ws.split();
        let task = SessionTask {
            codec: self.codec,
            session: Arc::clone(&session),
            handler,
            write,
            read,
            outbound_rx,
            heartbeat_rx,
            _heartbeat_tx: heartbeat_tx,
            heartbeat_state,
            _heartbeat_tasks: heartbeat_tasks,
        };
        tokio::spawn(task.run());

        Ok(session)
    }
}

// =============================================================================
// Session
// =============================================================================

enum Outbound {
    Frame(StompFrame),
    Disconnect,
}

/// Handle to a live STOMP session.
#[derive(Debug)]
pub struct StompSession {
    id: uuid::Uuid,
    server_session: Option<String>,
    outbound: mpsc::Sender<Outbound>,
    connected: AtomicBool,
    cancel: CancellationToken,
    next_subscription: AtomicU64,
}

impl std::fmt::Debug for Outbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Frame(frame) => write!(f, "Frame({})", frame.command),
            Self::Disconnect => f.write_str("Disconnect"),
        }
    }
}

impl StompSession {
    fn new(outbound: mpsc::Sender<Outbound>, server_session: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            server_session,
            outbound,
            connected: AtomicBool::new(true),
            cancel: CancellationToken::new(),
            next_subscription: AtomicU64::new(0),
        }
    }

    /// Client-side session id.
    #[must_use]
    pub const fn id(&self) -> uuid::Uuid {
        self.id
    }

    /// Session id reported by the server in `CONNECTED`, if any.
    #[must_use]
    pub fn server_session(&self) -> Option<&str> {
        self.server_session.as_deref()
    }

    fn closed() -> SessionError {
        SessionError::Transport("session is closed".to_string())
    }
}

#[async_trait]
impl Session for StompSession {
    async fn subscribe(&self, destination: &str) -> Result<String, SessionError> {
        if !self.is_connected() {
            return Err(Self::closed());
        }

        let id = format!(
            "sub-{}",
            self.next_subscription.fetch_add(1, Ordering::SeqCst)
        );
        self.outbound
            .send(Outbound::Frame(StompFrame::subscribe(&id, destination)))
            .await
            .map_err(|_| Self::closed())?;
        Ok(id)
    }

    async fn disconnect(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(session = %self.id, "Disconnecting STOMP session");
        if self.outbound.try_send(Outbound::Disconnect).is_err() {
            self.cancel.cancel();
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.cancel.is_cancelled()
    }
}

// =============================================================================
// Session Task
// =============================================================================

struct SessionTask {
    codec: StompCodec,
    session: Arc<StompSession>,
    handler: Arc<dyn SessionHandler>,
    write: WsSink,
    read: WsSource,
    outbound_rx: mpsc::Receiver<Outbound>,
    heartbeat_rx: mpsc::Receiver<HeartbeatEvent>,
    // Keeps `heartbeat_rx` open when heart-beating is off.
    _heartbeat_tx: mpsc::Sender<HeartbeatEvent>,
    heartbeat_state: Arc<HeartbeatState>,
    _heartbeat_tasks: HeartbeatTasks,
}

impl SessionTask {
    async fn run(mut self) {
        let result = self.process().await;
        self.session.connected.store(false, Ordering::SeqCst);
        self.session.cancel.cancel();

        match result {
            Ok(()) => {
                tracing::debug!(session = %self.session.id, "STOMP session closed");
            }
            Err(error @ SessionError::Protocol(_)) => self.handler.handle_exception(error),
            Err(error) => self.handler.handle_transport_error(error),
        }
    }

    async fn process(&mut self) -> Result<(), SessionError> {
        loop {
            tokio::select! {
                () = self.session.cancel.cancelled() => {
                    let _ = self.write.close().await;
                    return Ok(());
                }
                Some(outbound) = self.outbound_rx.recv() => match outbound {
                    Outbound::Frame(frame) => self.send_frame(&frame).await?,
                    Outbound::Disconnect => {
                        let _ = self.send_frame(&StompFrame::disconnect()).await;
                        let _ = self.write.close().await;
                        return Ok(());
                    }
                },
                Some(event) = self.heartbeat_rx.recv() => match event {
                    HeartbeatEvent::SendHeartbeat => {
                        self.write
                            .send(Message::Text(self.codec.heartbeat().to_string().into()))
                            .await
                            .map_err(|e| SessionError::Transport(e.to_string()))?;
                    }
                    HeartbeatEvent::Timeout => {
                        return Err(SessionError::Transport(
                            "no data received within the heart-beat window".to_string(),
                        ));
                    }
                },
                msg = self.read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        self.heartbeat_state.record_read();
                        self.handle_payload(text.as_bytes())?;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        self.heartbeat_state.record_read();
                        self.handle_payload(&data)?;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let message = match frame.map(|f| f.reason.to_string()) {
                            Some(reason) if !reason.is_empty() => {
                                format!("server closed the connection: {reason}")
                            }
                            _ => "server closed the connection".to_string(),
                        };
                        return Err(SessionError::Transport(message));
                    }
                    Some(Ok(_)) => self.heartbeat_state.record_read(),
                    Some(Err(e)) => return Err(SessionError::Transport(e.to_string())),
                    None => {
                        return Err(SessionError::Transport("connection closed".to_string()));
                    }
                },
            }
        }
    }

    async fn send_frame(&mut self, frame: &StompFrame) -> Result<(), SessionError> {
        let encoded = self
            .codec
            .encode(frame)
            .map_err(|e| SessionError::Protocol(e.to_string()))?;
        self.write
            .send(Message::Text(encoded.into()))
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))
    }

    fn handle_payload(&self, payload: &[u8]) -> Result<(), SessionError> {
        let frames = self
            .codec
            .decode(payload)
            .map_err(|e| SessionError::Protocol(e.to_string()))?;

        for frame in frames {
            match frame.command {
                StompCommand::Message => self.handler.handle_frame(&to_inbound(frame)),
                StompCommand::Error => return Err(SessionError::Protocol(frame.error_summary())),
                StompCommand::Receipt => {
                    tracing::debug!(receipt = frame.get("receipt-id"), "Receipt received");
                }
                other => {
                    tracing::debug!(command = %other, "Ignoring unexpected frame");
                }
            }
        }
        Ok(())
    }
}

fn to_inbound(frame: StompFrame) -> InboundFrame {
    let StompFrame { headers, body, .. } = frame;
    let lookup = |name: &str| {
        headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    };

    InboundFrame {
        destination: lookup("destination").unwrap_or_default(),
        subscription: lookup("subscription"),
        content_type: lookup("content-type"),
        payload: body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::scheduler::TokioTaskScheduler;

    fn client(virtual_host: Option<&str>) -> StompClient {
        StompClient::new(
            StompClientConfig {
                virtual_host: virtual_host.map(str::to_string),
                ..StompClientConfig::default()
            },
            Arc::new(TokioTaskScheduler::new()),
        )
    }

    #[test]
    fn host_header_defaults_to_url_host() {
        assert_eq!(
            client(None).host_for("wss://feed.example.com:8443/ws"),
            "feed.example.com"
        );
        assert_eq!(client(Some("vhost")).host_for("ws://127.0.0.1/ws"), "vhost");
    }

    #[test]
    fn message_frame_maps_to_inbound_frame() {
        let frame = StompFrame::new(StompCommand::Message)
            .header("destination", "/topic/abc123")
            .header("subscription", "sub-0")
            .header("content-type", "application/json")
            .body("{}");

        let inbound = to_inbound(frame);
        assert_eq!(inbound.destination, "/topic/abc123");
        assert_eq!(inbound.subscription.as_deref(), Some("sub-0"));
        assert_eq!(inbound.content_type.as_deref(), Some("application/json"));
        assert_eq!(inbound.payload, b"{}".to_vec());
    }

    #[tokio::test]
    async fn closed_session_rejects_subscribe() {
        let (tx, _rx) = mpsc::channel(1);
        let session = StompSession::new(tx, None);

        session.disconnect().await;

        assert!(!session.is_connected());
        assert_eq!(
            session.subscribe("/topic/abc123").await,
            Err(StompSession::closed())
        );
    }

    #[tokio::test]
    async fn subscription_ids_are_sequential() {
        let (tx, mut rx) = mpsc::channel(4);
        let session = StompSession::new(tx, Some("server-1".to_string()));

        assert_eq!(session.subscribe("/topic/a").await.unwrap(), "sub-0");
        assert_eq!(session.subscribe("/topic/b").await.unwrap(), "sub-1");
        assert_eq!(session.server_session(), Some("server-1"));

        match rx.recv().await {
            Some(Outbound::Frame(frame)) => {
                assert_eq!(frame.get("destination"), Some("/topic/a"));
            }
            other => panic!("expected SUBSCRIBE, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn handshake_timeout_is_reported() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept TCP but never answer the WebSocket upgrade.
        let _server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let client = StompClient::new(
            StompClientConfig {
                connect_timeout: Duration::from_millis(200),
                ..StompClientConfig::default()
            },
            Arc::new(TokioTaskScheduler::new()),
        );

        struct Ignore;
        impl SessionHandler for Ignore {
            fn handle_frame(&self, _frame: &InboundFrame) {}
            fn handle_exception(&self, _error: SessionError) {}
            fn handle_transport_error(&self, _error: SessionError) {}
        }

        let result = client
            .connect(&format!("ws://{addr}/ws"), Arc::new(Ignore))
            .await;
        assert!(matches!(result, Err(SessionError::Handshake(_))));
    }
}
