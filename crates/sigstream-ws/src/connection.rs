//! WebSocket connection manager.
//!
//! Owns one best-effort socket to the backend. Network failure never
//! surfaces as an error: callers observe `ConnectionState` instead and the
//! manager heals itself with bounded exponential backoff.
//!
//! State machine: `Idle -> Connecting -> Open -> Closed`. An abnormal close
//! (any code other than 1000) while reconnection is enabled schedules a new
//! `Connecting` after `base * 2^(attempt-1)`; after `max_reconnect_attempts`
//! the manager stays `Closed` until the next explicit `connect()`.

use crate::endpoint::{derive_endpoint, DEFAULT_WS_PATH};
use crate::error::WsResult;
use crate::handlers::{HandlerId, HandlerRegistry, HandlerResult};
use crate::message::WsMessage;
use crate::transport::{Connector, Socket, TungsteniteConnector};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Intentional close. Never triggers reconnection.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close frame without a status code.
pub const NO_STATUS_RECEIVED: u16 = 1005;
/// Connection lost without a close frame (including failed opens).
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Origin of the serving page (e.g., "https://app.example.com").
    #[serde(default)]
    pub page_origin: String,
    /// Socket path on the origin host.
    #[serde(default = "default_path")]
    pub path: String,
    /// Reconnection attempts after an abnormal close before giving up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Base delay for exponential backoff.
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
}

fn default_path() -> String {
    DEFAULT_WS_PATH.to_string()
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_base_delay_ms() -> u64 {
    1000
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            page_origin: String::new(),
            path: default_path(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
        }
    }
}

impl ConnectionConfig {
    /// Socket URL derived from the page origin.
    pub fn endpoint(&self) -> WsResult<String> {
        derive_endpoint(&self.page_origin, &self.path)
    }

    /// Backoff delay before reconnection attempt `attempt` (1-based).
    ///
    /// attempt=1 -> base, attempt=2 -> 2*base, attempt=3 -> 4*base, ...
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.reconnect_base_delay_ms.saturating_mul(1u64 << exponent))
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Never connected.
    #[default]
    Idle,
    Connecting,
    Open,
    /// Closed, either terminally or while a reconnect is pending.
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handles for the socket task currently owning the connection.
struct LiveSocket {
    outbound: mpsc::UnboundedSender<Message>,
    close: CancellationToken,
}

struct Inner {
    state: ConnectionState,
    should_reconnect: bool,
    reconnect_attempts: u32,
    /// At most one outstanding reconnect timer.
    reconnect_timer: Option<CancellationToken>,
    /// Cancels the handshake in flight; becomes the socket's close token.
    handshake: Option<CancellationToken>,
    socket: Option<LiveSocket>,
    /// Bumped for every socket task and on disconnect; stale tasks compare
    /// against it and leave the state alone.
    generation: u64,
}

struct Shared {
    config: ConnectionConfig,
    connector: Arc<dyn Connector>,
    inner: Mutex<Inner>,
    handlers: HandlerRegistry,
    state_tx: watch::Sender<ConnectionState>,
    malformed_messages: AtomicU64,
    reconnects: AtomicU64,
}

/// WebSocket connection manager.
///
/// Cheap to clone; all clones share one socket, one attempt counter and one
/// handler registry. Construct one per application and hand clones to
/// consumers.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Create a manager using the tokio-tungstenite transport.
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_connector(config, Arc::new(TungsteniteConnector))
    }

    /// Create a manager with a custom transport.
    pub fn with_connector(config: ConnectionConfig, connector: Arc<dyn Connector>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        Self {
            shared: Arc::new(Shared {
                config,
                connector,
                inner: Mutex::new(Inner {
                    state: ConnectionState::Idle,
                    should_reconnect: false,
                    reconnect_attempts: 0,
                    reconnect_timer: None,
                    handshake: None,
                    socket: None,
                    generation: 0,
                }),
                handlers: HandlerRegistry::new(),
                state_tx,
                malformed_messages: AtomicU64::new(0),
                reconnects: AtomicU64::new(0),
            }),
        }
    }

    /// Open the connection.
    ///
    /// Resolves once the socket is open or the attempt failed, and
    /// immediately when already open/connecting or when the endpoint cannot
    /// be derived. Never fails: without a socket the application simply has
    /// no live updates.
    pub async fn connect(&self) {
        if let Some(opened) = self.shared.start_connect() {
            // Sender dropped means the attempt ended either way.
            let _ = opened.await;
        }
    }

    /// Close the connection and stop reconnecting. Idempotent.
    ///
    /// Any pending reconnect timer and any handshake in flight are
    /// cancelled before this returns; a pending `connect()` then resolves.
    pub fn disconnect(&self) {
        self.shared.disconnect();
    }

    /// Send a message. Returns false unless the socket is open.
    pub fn send(&self, message: &WsMessage) -> bool {
        match message.to_text() {
            Ok(text) => self.shared.send_text(text),
            Err(e) => {
                warn!(error = %e, kind = %message.kind, "Failed to encode message");
                false
            }
        }
    }

    /// Send any serializable value as a text frame.
    ///
    /// Returns `Err` only when `value` cannot be serialized.
    pub fn send_json<T: Serialize>(&self, value: &T) -> WsResult<bool> {
        let text = serde_json::to_string(value)?;
        Ok(self.shared.send_text(text))
    }

    /// Register an inbound message handler.
    pub fn add_message_handler<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&WsMessage) -> HandlerResult + Send + Sync + 'static,
    {
        self.shared.handlers.add(handler)
    }

    /// Unregister a handler. It receives no further messages.
    pub fn remove_message_handler(&self, id: HandlerId) -> bool {
        self.shared.handlers.remove(id)
    }

    pub fn handler_count(&self) -> usize {
        self.shared.handlers.len()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    /// Whether the socket is open.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Subscribe to state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Reconnection attempts since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.inner.lock().reconnect_attempts
    }

    /// Whether a reconnect timer is outstanding.
    pub fn has_pending_reconnect(&self) -> bool {
        self.shared.inner.lock().reconnect_timer.is_some()
    }

    /// Inbound frames dropped because they were not tagged JSON objects.
    pub fn malformed_messages(&self) -> u64 {
        self.shared.malformed_messages.load(Ordering::Relaxed)
    }

    /// Reconnection attempts started since creation.
    pub fn reconnect_count(&self) -> u64 {
        self.shared.reconnects.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }
}

impl Shared {
    fn set_state(&self, inner: &mut Inner, state: ConnectionState) {
        if inner.state != state {
            debug!(from = %inner.state, to = %state, "Connection state changed");
        }
        inner.state = state;
        self.state_tx.send_replace(state);
    }

    fn start_connect(self: &Arc<Self>) -> Option<oneshot::Receiver<()>> {
        let url = match self.config.endpoint() {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Realtime endpoint unavailable, live updates disabled");
                return None;
            }
        };

        let mut inner = self.inner.lock();
        if matches!(
            inner.state,
            ConnectionState::Connecting | ConnectionState::Open
        ) {
            debug!(state = %inner.state, "connect() ignored, already active");
            return None;
        }

        // Explicit connect starts a fresh backoff cycle.
        if let Some(timer) = inner.reconnect_timer.take() {
            timer.cancel();
        }
        inner.reconnect_attempts = 0;
        inner.should_reconnect = true;

        let (opened_tx, opened_rx) = oneshot::channel();
        self.spawn_socket(&mut inner, url, Some(opened_tx));
        Some(opened_rx)
    }

    fn spawn_socket(
        self: &Arc<Self>,
        inner: &mut Inner,
        url: String,
        opened: Option<oneshot::Sender<()>>,
    ) {
        inner.generation += 1;
        let generation = inner.generation;
        let attempt = inner.reconnect_attempts;
        let close = CancellationToken::new();
        if let Some(stale) = inner.handshake.replace(close.clone()) {
            stale.cancel();
        }
        self.set_state(inner, ConnectionState::Connecting);

        let shared = self.clone();
        tokio::spawn(async move {
            shared.run_socket(url, generation, attempt, close, opened).await;
        });
    }

    async fn run_socket(
        self: Arc<Self>,
        url: String,
        generation: u64,
        attempt: u32,
        close: CancellationToken,
        opened: Option<oneshot::Sender<()>>,
    ) {
        info!(url = %url, attempt, "Connecting to WebSocket");

        let connected = tokio::select! {
            biased;

            () = close.cancelled() => None,
            result = self.connector.connect(&url) => Some(result),
        };

        let socket = match connected {
            None => {
                debug!(attempt, "Handshake cancelled by disconnect");
                notify(opened);
                return;
            }
            Some(Ok(socket)) => socket,
            Some(Err(e)) => {
                warn!(error = %e, attempt, "WebSocket connection failed");
                self.handle_close(generation, ABNORMAL_CLOSURE, &e.to_string());
                notify(opened);
                return;
            }
        };

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let registered = {
            let mut inner = self.inner.lock();
            // disconnect() may have run while the handshake was in flight
            if inner.generation == generation && !close.is_cancelled() {
                inner.handshake = None;
                inner.socket = Some(LiveSocket {
                    outbound: outbound_tx,
                    close: close.clone(),
                });
                inner.reconnect_attempts = 0;
                self.set_state(&mut inner, ConnectionState::Open);
                true
            } else {
                false
            }
        };
        if !registered {
            debug!("Discarding socket opened after disconnect");
            close_quietly(socket).await;
            notify(opened);
            return;
        }
        info!(url = %url, "WebSocket connected");
        notify(opened);

        let (code, reason) = self.pump(socket, outbound_rx, close).await;
        self.handle_close(generation, code, &reason);
    }

    /// Run the socket until it closes. Returns the close code and reason.
    async fn pump(
        &self,
        socket: Socket,
        mut outbound_rx: mpsc::UnboundedReceiver<Message>,
        close: CancellationToken,
    ) -> (u16, String) {
        let Socket {
            mut sink,
            mut stream,
        } = socket;

        loop {
            tokio::select! {
                biased;

                () = close.cancelled() => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "client disconnect".into(),
                    };
                    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                        debug!(error = %e, "Failed to send Close frame");
                    }
                    return (NORMAL_CLOSURE, "client disconnect".to_string());
                }

                frame = stream.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => self.handle_text(&text),
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = sink.send(Message::Pong(data)).await {
                                return (ABNORMAL_CLOSURE, e.to_string());
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            return frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((NO_STATUS_RECEIVED, String::new()));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket read error");
                            return (ABNORMAL_CLOSURE, e.to_string());
                        }
                        None => return (ABNORMAL_CLOSURE, "stream ended".to_string()),
                    }
                }

                outbound = outbound_rx.recv() => {
                    match outbound {
                        Some(msg) => {
                            if let Err(e) = sink.send(msg).await {
                                error!(error = %e, "WebSocket write error");
                                return (ABNORMAL_CLOSURE, e.to_string());
                            }
                        }
                        // Sender only goes away with the LiveSocket entry.
                        None => return (NORMAL_CLOSURE, "released".to_string()),
                    }
                }
            }
        }
    }

    fn handle_text(&self, text: &str) {
        match WsMessage::parse(text) {
            Ok(msg) => {
                self.handlers.dispatch(&msg);
            }
            Err(e) => {
                self.malformed_messages.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, len = text.len(), "Dropping malformed message");
            }
        }
    }

    fn handle_close(self: &Arc<Self>, generation: u64, code: u16, reason: &str) {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            debug!(code, "Stale socket closed");
            return;
        }

        inner.handshake = None;
        inner.socket = None;
        self.set_state(&mut inner, ConnectionState::Closed);

        if code == NORMAL_CLOSURE {
            info!(code, "WebSocket closed");
            return;
        }

        warn!(code, %reason, "WebSocket closed abnormally");
        if inner.should_reconnect {
            self.schedule_reconnect(&mut inner);
        }
    }

    fn schedule_reconnect(self: &Arc<Self>, inner: &mut Inner) {
        if let Some(timer) = inner.reconnect_timer.take() {
            timer.cancel();
        }

        if inner.reconnect_attempts >= self.config.max_reconnect_attempts {
            error!(
                attempts = inner.reconnect_attempts,
                "Max reconnection attempts reached, live updates stopped"
            );
            return;
        }

        inner.reconnect_attempts += 1;
        let attempt = inner.reconnect_attempts;
        let delay = self.config.backoff_delay(attempt);
        let deadline = Instant::now() + delay;
        warn!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");

        let timer = CancellationToken::new();
        inner.reconnect_timer = Some(timer.clone());

        let shared = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep_until(deadline) => shared.fire_reconnect(&timer),
                () = timer.cancelled() => debug!(attempt, "Reconnect timer cancelled"),
            }
        });
    }

    fn fire_reconnect(self: &Arc<Self>, timer: &CancellationToken) {
        let mut inner = self.inner.lock();
        // Cancellation happens under this lock, so an uncancelled token is
        // still the outstanding one.
        if timer.is_cancelled() || !inner.should_reconnect {
            return;
        }
        inner.reconnect_timer = None;

        if matches!(
            inner.state,
            ConnectionState::Connecting | ConnectionState::Open
        ) {
            return;
        }

        match self.config.endpoint() {
            Ok(url) => {
                self.reconnects.fetch_add(1, Ordering::Relaxed);
                self.spawn_socket(&mut inner, url, None);
            }
            Err(e) => warn!(error = %e, "Realtime endpoint unavailable, reconnect skipped"),
        }
    }

    fn disconnect(&self) {
        let mut inner = self.inner.lock();
        inner.should_reconnect = false;
        if let Some(timer) = inner.reconnect_timer.take() {
            timer.cancel();
        }
        if let Some(handshake) = inner.handshake.take() {
            handshake.cancel();
        }
        if let Some(socket) = inner.socket.take() {
            socket.close.cancel();
        }
        inner.reconnect_attempts = 0;
        inner.generation += 1;
        if inner.state != ConnectionState::Closed {
            info!(state = %inner.state, "Disconnecting WebSocket");
        }
        self.set_state(&mut inner, ConnectionState::Closed);
    }

    fn send_text(&self, text: String) -> bool {
        let inner = self.inner.lock();
        if inner.state != ConnectionState::Open {
            return false;
        }
        match &inner.socket {
            Some(socket) => socket.outbound.send(Message::Text(text)).is_ok(),
            None => false,
        }
    }
}

fn notify(opened: Option<oneshot::Sender<()>>) {
    if let Some(tx) = opened {
        let _ = tx.send(());
    }
}

async fn close_quietly(socket: Socket) {
    let Socket { mut sink, .. } = socket;
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: "client disconnect".into(),
    };
    let _ = sink.send(Message::Close(Some(frame))).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WsError;
    use crate::transport::MockConnector;

    fn test_config() -> ConnectionConfig {
        ConnectionConfig {
            page_origin: "http://localhost:3000".to_string(),
            reconnect_base_delay_ms: 100,
            ..Default::default()
        }
    }

    fn refusing_connector(calls: Arc<Mutex<Vec<Instant>>>, times: usize) -> MockConnector {
        let mut connector = MockConnector::new();
        connector.expect_connect().times(times).returning(move |_| {
            calls.lock().push(Instant::now());
            Box::pin(async { Err(WsError::ConnectionFailed("refused".to_string())) })
        });
        connector
    }

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.reconnect_base_delay_ms, 1000);
        assert_eq!(config.path, "/ws");
    }

    #[test]
    fn test_backoff_doubles() {
        let config = test_config();
        let delays: Vec<u64> = (1..=5)
            .map(|a| config.backoff_delay(a).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1600]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_retries_with_exponential_delays() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let connector = refusing_connector(calls.clone(), 6);
        let manager = ConnectionManager::with_connector(test_config(), Arc::new(connector));

        manager.connect().await;
        assert_eq!(manager.state(), ConnectionState::Closed);
        assert!(manager.has_pending_reconnect());

        tokio::time::sleep(Duration::from_secs(60)).await;

        let calls = calls.lock().clone();
        // initial attempt + 5 reconnects
        assert_eq!(calls.len(), 6);
        let gaps: Vec<u64> = calls
            .windows(2)
            .map(|w| (w[1] - w[0]).as_millis() as u64)
            .collect();
        assert_eq!(gaps, vec![100, 200, 400, 800, 1600]);

        assert!(!manager.has_pending_reconnect());
        assert_eq!(manager.reconnect_attempts(), 5);
        assert_eq!(manager.reconnect_count(), 5);
        assert_eq!(manager.state(), ConnectionState::Closed);

        // The lifetime counter survives the attempt reset in disconnect().
        manager.disconnect();
        assert_eq!(manager.reconnect_attempts(), 0);
        assert_eq!(manager.reconnect_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_is_idempotent_and_cancels_timer() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let connector = refusing_connector(calls.clone(), 1);
        let manager = ConnectionManager::with_connector(test_config(), Arc::new(connector));

        manager.connect().await;
        assert!(manager.has_pending_reconnect());

        manager.disconnect();
        manager.disconnect();

        assert_eq!(manager.state(), ConnectionState::Closed);
        assert!(!manager.has_pending_reconnect());
        assert_eq!(manager.reconnect_attempts(), 0);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(calls.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_after_disconnect_does_not_reconnect() {
        let calls = Arc::new(Mutex::new(0u32));
        let mut connector = MockConnector::new();
        let c = calls.clone();
        connector.expect_connect().times(1).returning(move |_| {
            *c.lock() += 1;
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Err(WsError::ConnectionClosed {
                    code: ABNORMAL_CLOSURE,
                    reason: "reset".to_string(),
                })
            })
        });
        let manager = ConnectionManager::with_connector(test_config(), Arc::new(connector));

        let m = manager.clone();
        let pending = tokio::spawn(async move { m.connect().await });
        tokio::task::yield_now().await;
        assert_eq!(manager.state(), ConnectionState::Connecting);

        manager.disconnect();
        pending.await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(*calls.lock(), 1);
        assert!(!manager.has_pending_reconnect());
        assert_eq!(manager.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_while_connecting_is_noop() {
        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .times(1)
            .returning(|_| Box::pin(futures_util::future::pending::<WsResult<Socket>>()));
        let manager = ConnectionManager::with_connector(test_config(), Arc::new(connector));

        let m = manager.clone();
        let _first = tokio::spawn(async move { m.connect().await });
        tokio::task::yield_now().await;

        // Resolves immediately without a second connector call.
        manager.connect().await;
        assert_eq!(manager.state(), ConnectionState::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_releases_pending_connect() {
        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .times(1)
            .returning(|_| Box::pin(futures_util::future::pending::<WsResult<Socket>>()));
        let manager = ConnectionManager::with_connector(test_config(), Arc::new(connector));

        let m = manager.clone();
        let pending = tokio::spawn(async move { m.connect().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(manager.state(), ConnectionState::Connecting);

        manager.disconnect();

        tokio::time::timeout(Duration::from_secs(2), pending)
            .await
            .expect("connect() should resolve once disconnect() returns")
            .unwrap();
        assert_eq!(manager.state(), ConnectionState::Closed);
        assert!(!manager.has_pending_reconnect());
    }

    #[tokio::test]
    async fn test_invalid_endpoint_resolves_without_socket() {
        let mut connector = MockConnector::new();
        connector.expect_connect().times(0);
        let config = ConnectionConfig {
            page_origin: "not a url".to_string(),
            ..Default::default()
        };
        let manager = ConnectionManager::with_connector(config, Arc::new(connector));

        manager.connect().await;

        assert_eq!(manager.state(), ConnectionState::Idle);
        assert!(!manager.has_pending_reconnect());
    }

    #[tokio::test]
    async fn test_send_requires_open_socket() {
        let manager = ConnectionManager::with_connector(test_config(), Arc::new(MockConnector::new()));
        assert!(!manager.send(&WsMessage::new("ping")));
        assert!(!manager.send_json(&serde_json::json!({"type": "ping"})).unwrap());
    }

    #[tokio::test]
    async fn test_state_changes_are_published() {
        let manager = ConnectionManager::with_connector(test_config(), Arc::new(MockConnector::new()));
        let rx = manager.state_changes();
        assert_eq!(*rx.borrow(), ConnectionState::Idle);

        manager.disconnect();
        assert_eq!(*rx.borrow(), ConnectionState::Closed);
    }
}
