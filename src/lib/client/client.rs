//! Connection manager: owns the one STOMP session of a [`RealtimeClient`].
//!
//! The session runs on a background task. Failures never come back from
//! [`RealtimeClient::connect`]; they are logged and reported through the
//! `on_error`/`on_close` listeners, and the session retries after the configured
//! fixed delay until [`RealtimeClient::disconnect`] is called.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tracing::{debug, error, info, instrument, warn};

use crate::client::config::{ClientConfig, Heartbeat, ReconnectPolicy};
use crate::client::registry::Registry;
use crate::client::router::Router;
use crate::client::{guarded, lock};
use crate::core::{ClientError, Command, Frame};
use crate::storage::TokenStore;
use crate::transport::{self, WsConnection};

const RECEIPT_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// The last attempt failed; a retry may be pending.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// `disconnect()` was called.
    ClientRequest,
    /// The broker closed the socket, with its close reason if it gave one.
    Remote(Option<String>),
    Network(String),
    HeartbeatTimeout,
    /// The socket or the STOMP handshake never completed.
    HandshakeFailed,
}

/// Details of an established session, from the broker's `CONNECTED` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub version: Option<String>,
    pub server: Option<String>,
    pub session: Option<String>,
    pub heartbeat: Heartbeat,
}

type ConnectListener = Arc<dyn Fn(&SessionInfo) + Send + Sync>;
type ErrorListener = Arc<dyn Fn(&ClientError) + Send + Sync>;
type CloseListener = Arc<dyn Fn(&CloseReason) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    on_connect: Option<ConnectListener>,
    on_error: Option<ErrorListener>,
    on_close: Option<CloseListener>,
}

struct Session {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub(crate) struct Shared {
    config: ClientConfig,
    tokens: Arc<dyn TokenStore>,
    state: watch::Sender<ConnectionState>,
    listeners: Mutex<Listeners>,
    pub(crate) registry: Arc<Mutex<Registry>>,
    router: Router,
    outbound: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
    session: Mutex<Option<Session>>,
}

/// Handle to the realtime connection. Cloning is cheap and every clone drives
/// the same session, registry and listeners. Dropping the last clone shuts the
/// session down as `disconnect()` would, without waiting for it.
#[derive(Clone)]
pub struct RealtimeClient {
    pub(crate) shared: Arc<Shared>,
    _owner: Arc<Owner>,
}

/// Held only by client handles. The session task keeps `Shared` alive, so the
/// shutdown signal hangs off this instead.
struct Owner(Arc<Shared>);

impl Drop for Owner {
    fn drop(&mut self) {
        if let Some(session) = lock(&self.0.session).take() {
            debug!("Last client handle dropped; stopping session");
            let _ = session.shutdown.send(true);
        }
    }
}

impl RealtimeClient {
    pub fn new(config: ClientConfig, tokens: Arc<dyn TokenStore>) -> Self {
        let registry = Arc::new(Mutex::new(Registry::new()));
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let shared = Arc::new(Shared {
            config,
            tokens,
            state,
            listeners: Mutex::new(Listeners::default()),
            router: Router::new(registry.clone()),
            registry,
            outbound: Mutex::new(None),
            session: Mutex::new(None),
        });
        Self {
            _owner: Arc::new(Owner(shared.clone())),
            shared,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Starts the session unless one is already connecting, connected or waiting
    /// to retry. Without a token nothing is opened.
    pub async fn connect(&self) {
        if self.session_active() {
            debug!("Connect requested while a session is active; ignoring");
            return;
        }

        let Some(token) = self.shared.load_token().await else {
            return;
        };

        let mut session = lock(&self.shared.session);
        if session.as_ref().is_some_and(|s| !s.handle.is_finished()) {
            return;
        }
        let (shutdown, shutdown_rx) = watch::channel(false);
        self.shared.set_state(ConnectionState::Connecting);
        let handle = tokio::spawn(run_session(self.shared.clone(), token, shutdown_rx));
        *session = Some(Session { shutdown, handle });
    }

    /// Closes the session and stops reconnecting. No-op without a session.
    pub async fn disconnect(&self) {
        let Some(session) = lock(&self.shared.session).take() else {
            return;
        };
        let _ = session.shutdown.send(true);
        if let Err(e) = session.handle.await {
            warn!(error = %e, "Session task ended abnormally");
        }
        self.shared.clear_outbound();
        self.shared.set_state(ConnectionState::Disconnected);
    }

    pub fn on_connect<F>(&self, callback: F)
    where
        F: Fn(&SessionInfo) + Send + Sync + 'static,
    {
        lock(&self.shared.listeners).on_connect = Some(Arc::new(callback));
    }

    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(&ClientError) + Send + Sync + 'static,
    {
        lock(&self.shared.listeners).on_error = Some(Arc::new(callback));
    }

    pub fn on_close<F>(&self, callback: F)
    where
        F: Fn(&CloseReason) + Send + Sync + 'static,
    {
        lock(&self.shared.listeners).on_close = Some(Arc::new(callback));
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    fn session_active(&self) -> bool {
        lock(&self.shared.session)
            .as_ref()
            .is_some_and(|s| !s.handle.is_finished())
    }

    pub(crate) fn outbound(&self) -> Option<mpsc::UnboundedSender<Frame>> {
        lock(&self.shared.outbound).clone()
    }

    /// Marks the client connected with frames going to the returned receiver
    /// instead of a socket.
    #[cfg(test)]
    pub(crate) fn attach_outbound(&self) -> mpsc::UnboundedReceiver<Frame> {
        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.shared.outbound) = Some(tx);
        self.shared.set_state(ConnectionState::Connected);
        rx
    }

    #[cfg(test)]
    pub(crate) fn detach_outbound(&self) {
        self.shared.clear_outbound();
        self.shared.set_state(ConnectionState::Disconnected);
    }
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "Connection state changed");
        }
    }

    fn clear_outbound(&self) {
        lock(&self.outbound).take();
    }

    async fn load_token(&self) -> Option<String> {
        match self.tokens.load_token().await {
            Ok(Some(token)) => Some(token),
            Ok(None) => {
                warn!("No access token stored; not connecting");
                self.fire_error(&ClientError::MissingToken);
                None
            }
            Err(e) => {
                error!(error = %e, "Failed to load access token; not connecting");
                self.fire_error(&ClientError::TokenStore(e.to_string()));
                None
            }
        }
    }

    fn fire_connect(&self, info: &SessionInfo) {
        let listener = lock(&self.listeners).on_connect.clone();
        if let Some(listener) = listener {
            if let Err(reason) = guarded(|| listener(info)) {
                error!(reason = %reason, "on_connect listener panicked");
            }
        }
    }

    fn fire_error(&self, err: &ClientError) {
        let listener = lock(&self.listeners).on_error.clone();
        if let Some(listener) = listener {
            if let Err(reason) = guarded(|| listener(err)) {
                error!(reason = %reason, "on_error listener panicked");
            }
        }
    }

    fn fire_close(&self, close: &CloseReason) {
        let listener = lock(&self.listeners).on_close.clone();
        if let Some(listener) = listener {
            if let Err(reason) = guarded(|| listener(close)) {
                error!(reason = %reason, "on_close listener panicked");
            }
        }
    }

    #[instrument(skip_all, fields(url = %self.config.url))]
    async fn handshake(&self, token: &str) -> Result<(WsConnection, SessionInfo), ClientError> {
        let mut ws = transport::open(&self.config.url).await?;
        let connect = Frame::new(Command::Connect)
            .header("accept-version", "1.2,1.1,1.0")
            .header("host", transport::host_of(&self.config.url))
            .header("heart-beat", self.config.heartbeat_header())
            .header("Authorization", format!("Bearer {token}"));
        ws.send(transport::to_message(&connect)).await?;

        while let Some(msg) = ws.next().await {
            let msg = msg?;
            if let WsMessage::Close(_) = msg {
                break;
            }
            let Some(frames) = transport::decode(&msg)? else {
                continue;
            };
            for frame in frames {
                match frame.command {
                    Command::Connected => {
                        let info = SessionInfo {
                            version: frame.get("version").map(str::to_string),
                            server: frame.get("server").map(str::to_string),
                            session: frame.get("session").map(str::to_string),
                            heartbeat: Heartbeat::negotiate(&self.config, frame.get("heart-beat")),
                        };
                        return Ok((ws, info));
                    }
                    Command::Error => return Err(broker_error(&frame)),
                    other => debug!(command = %other, "Ignoring frame before CONNECTED"),
                }
            }
        }
        Err(ClientError::HandshakeClosed)
    }

    /// One connection attempt, from socket open to socket close.
    async fn run_connection(
        &self,
        token: &str,
        shutdown: &mut watch::Receiver<bool>,
    ) -> (CloseReason, Option<ClientError>) {
        let handshake = tokio::select! {
            result = tokio::time::timeout(self.config.connect_timeout, self.handshake(token)) => result,
            _ = shutdown.changed() => return (CloseReason::ClientRequest, None),
        };
        let (ws, info) = match handshake {
            Ok(Ok(established)) => established,
            Ok(Err(e)) => return (CloseReason::HandshakeFailed, Some(e)),
            Err(_) => return (CloseReason::HandshakeFailed, Some(ClientError::HandshakeTimeout)),
        };
        let (mut sink, mut stream) = ws.split();

        // Queue re-subscriptions before publishing the sender, so a concurrent
        // subscribe cannot slip a duplicate SUBSCRIBE in between.
        let (tx, mut rx) = mpsc::unbounded_channel();
        {
            let registry = lock(&self.registry);
            let frames = registry.resubscribe_frames();
            if !frames.is_empty() {
                info!(topics = frames.len(), "Re-subscribing live topics");
            }
            for frame in frames {
                let _ = tx.send(frame);
            }
            *lock(&self.outbound) = Some(tx);
        }
        self.set_state(ConnectionState::Connected);
        info!(session = ?info.session, server = ?info.server, "Connected to broker");
        self.fire_connect(&info);

        let idle_limit = info.heartbeat.incoming.map(|d| d * 2);
        let mut last_inbound = Instant::now();
        let mut last_outbound = Instant::now();

        loop {
            let inbound_deadline = deadline(idle_limit.map(|limit| last_inbound + limit));
            let heartbeat_due = deadline(info.heartbeat.outgoing.map(|every| last_outbound + every));

            tokio::select! {
                _ = shutdown.changed() => {
                    // Stop accepting frames first; whatever was accepted is flushed.
                    self.clear_outbound();
                    rx.close();
                    while let Ok(frame) = rx.try_recv() {
                        if sink.send(transport::to_message(&frame)).await.is_err() {
                            break;
                        }
                    }
                    graceful_close(&mut sink, &mut stream).await;
                    info!("Disconnected on request");
                    return (CloseReason::ClientRequest, None);
                }
                Some(frame) = rx.recv() => {
                    debug!(command = %frame.command, "Sending frame");
                    if let Err(e) = sink.send(transport::to_message(&frame)).await {
                        return (CloseReason::Network(e.to_string()), Some(e.into()));
                    }
                    last_outbound = Instant::now();
                }
                msg = stream.next() => {
                    let msg = match msg {
                        None => return (CloseReason::Remote(None), None),
                        Some(Err(e)) => return (CloseReason::Network(e.to_string()), Some(e.into())),
                        Some(Ok(WsMessage::Close(close))) => {
                            let reason = close.map(|c| c.reason.to_string()).filter(|r| !r.is_empty());
                            return (CloseReason::Remote(reason), None);
                        }
                        Some(Ok(msg)) => msg,
                    };
                    last_inbound = Instant::now();
                    match transport::decode(&msg) {
                        Ok(Some(frames)) => {
                            for frame in frames {
                                self.handle_frame(&frame);
                            }
                        }
                        Ok(None) => {}
                        Err(e) => warn!(error = %e, "Dropping undecodable frame"),
                    }
                }
                _ = heartbeat_due => {
                    if let Err(e) = sink.send(transport::heartbeat()).await {
                        return (CloseReason::Network(e.to_string()), Some(e.into()));
                    }
                    last_outbound = Instant::now();
                }
                _ = inbound_deadline => {
                    let limit = idle_limit.unwrap_or_default();
                    return (CloseReason::HeartbeatTimeout, Some(ClientError::HeartbeatTimeout(limit)));
                }
            }
        }
    }

    fn handle_frame(&self, frame: &Frame) {
        match frame.command {
            Command::Message => {
                self.router.dispatch(frame);
            }
            Command::Error => {
                let err = broker_error(frame);
                warn!(error = %err, "Broker reported an error");
                self.fire_error(&err);
            }
            Command::Receipt => debug!(receipt = ?frame.get("receipt-id"), "Receipt"),
            other => debug!(command = %other, "Ignoring unexpected frame"),
        }
    }
}

#[instrument(skip_all)]
async fn run_session(shared: Arc<Shared>, token: String, mut shutdown: watch::Receiver<bool>) {
    let mut first = Some(token);
    loop {
        let token = match first.take() {
            Some(token) => Some(token),
            None => shared.load_token().await,
        };

        if let Some(token) = token {
            shared.set_state(ConnectionState::Connecting);
            let (reason, failure) = shared.run_connection(&token, &mut shutdown).await;
            shared.clear_outbound();
            match &failure {
                Some(e) => {
                    warn!(error = %e, reason = ?reason, "Connection lost");
                    shared.set_state(ConnectionState::Error);
                    shared.fire_error(e);
                }
                None => shared.set_state(ConnectionState::Disconnected),
            }
            shared.fire_close(&reason);
            if reason == CloseReason::ClientRequest {
                break;
            }
        } else {
            shared.set_state(ConnectionState::Error);
        }

        if *shutdown.borrow() {
            stopped_between_attempts(&shared);
            break;
        }
        let ReconnectPolicy::Fixed(delay) = shared.config.reconnect else {
            break;
        };
        info!(delay = ?delay, "Reconnecting after delay");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => {
                stopped_between_attempts(&shared);
                break;
            }
        }
    }
}

/// Shutdown seen while no connection was open, e.g. during the retry delay.
fn stopped_between_attempts(shared: &Shared) {
    info!("Disconnected on request while waiting to reconnect");
    shared.set_state(ConnectionState::Disconnected);
    shared.fire_close(&CloseReason::ClientRequest);
}

async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn graceful_close(
    sink: &mut futures_util::stream::SplitSink<WsConnection, WsMessage>,
    stream: &mut futures_util::stream::SplitStream<WsConnection>,
) {
    let receipt = format!("disconnect-{}", uuid::Uuid::new_v4());
    let disconnect = Frame::new(Command::Disconnect).header("receipt", receipt.as_str());
    if sink.send(transport::to_message(&disconnect)).await.is_ok() {
        let acknowledged = tokio::time::timeout(RECEIPT_WAIT, async {
            while let Some(Ok(msg)) = stream.next().await {
                let Ok(Some(frames)) = transport::decode(&msg) else {
                    continue;
                };
                if frames.iter().any(|f| {
                    f.command == Command::Receipt && f.get("receipt-id") == Some(receipt.as_str())
                }) {
                    return true;
                }
            }
            false
        })
        .await;
        if !matches!(acknowledged, Ok(true)) {
            debug!("No receipt for DISCONNECT; closing anyway");
        }
    }
    let _ = sink.close().await;
}

fn broker_error(frame: &Frame) -> ClientError {
    let details = if frame.body.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(&frame.body).into_owned())
    };
    ClientError::Broker {
        message: frame.get("message").unwrap_or("broker error").to_string(),
        details,
    }
}
