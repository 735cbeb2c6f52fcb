//! Single live-stream connection with supervised reconnects.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{ClientConfig, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_RECONNECT_DELAY_MS};
use crate::error::{ClientError, Result};
use crate::lock_unpoisoned;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

/// When to try again after the stream closes.
///
/// The default reproduces the dashboard: a fixed 5 second delay, forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    /// Doubling backoff ceiling. `None` keeps the delay fixed.
    pub max_delay: Option<Duration>,
    /// Reconnects allowed in a row without a successful open. `None` is unbounded.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS))
    }
}

impl ReconnectPolicy {
    #[must_use]
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base_delay: delay,
            max_delay: None,
            max_attempts: None,
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Delay before reconnect attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let Some(max_delay) = self.max_delay else {
            return self.base_delay;
        };
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .checked_mul(1_u32 << exponent)
            .unwrap_or(max_delay)
            .min(max_delay)
    }

    #[must_use]
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt <= max)
    }
}

/// Connection manager configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl From<&ClientConfig> for ConnectionConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            reconnect: config.reconnect.clone(),
        }
    }
}

pub type MessageHandler = Arc<dyn Fn(Value) + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(&ClientError) + Send + Sync>;

/// Subscribers for inbound frames and transport errors.
///
/// Kept for the whole session: every reconnect reuses the same handlers.
#[derive(Clone)]
pub struct StreamHandlers {
    pub on_message: MessageHandler,
    pub on_error: Option<ErrorHandler>,
}

impl StreamHandlers {
    pub fn new<F>(on_message: F) -> Self
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        Self {
            on_message: Arc::new(on_message),
            on_error: None,
        }
    }

    #[must_use]
    pub fn with_error_handler<F>(mut self, on_error: F) -> Self
    where
        F: Fn(&ClientError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(on_error));
        self
    }

    fn report(&self, error: &ClientError) {
        if let Some(on_error) = &self.on_error {
            on_error(error);
        }
    }
}

/// What the filter controller needs from the live stream.
#[async_trait]
pub trait LiveChannel: Send + Sync {
    fn state(&self) -> ConnectionState;
    async fn send_json(&self, message: &Value) -> Result<()>;
}

/// Owner of the one streaming connection of a dashboard session.
///
/// A single supervisor task opens the socket, pumps frames to the handlers,
/// and sleeps out the reconnect delay. Because that task is the only thing
/// that ever reconnects, at most one reconnect is pending at any time.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Shared>,
}

struct Shared {
    url: Url,
    config: ConnectionConfig,
    state_tx: watch::Sender<ConnectionState>,
    writer: Mutex<Option<WsWriter>>,
    supervisor: std::sync::Mutex<Option<JoinHandle<()>>>,
    reconnects: AtomicU32,
    shut_down: AtomicBool,
}

impl ConnectionManager {
    /// Create a manager with default config.
    pub fn new(url: &str) -> Result<Self> {
        Self::with_config(url, ConnectionConfig::default())
    }

    pub fn with_config(url: &str, config: ConnectionConfig) -> Result<Self> {
        let parsed_url = Url::parse(url)?;
        if parsed_url.scheme() != "ws" && parsed_url.scheme() != "wss" {
            return Err(ClientError::InvalidUrl(format!(
                "URL must use ws:// or wss:// scheme, got: {}",
                parsed_url.scheme()
            )));
        }
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Ok(Self {
            inner: Arc::new(Shared {
                url: parsed_url,
                config,
                state_tx,
                writer: Mutex::new(None),
                supervisor: std::sync::Mutex::new(None),
                reconnects: AtomicU32::new(0),
                shut_down: AtomicBool::new(false),
            }),
        })
    }

    pub fn from_client_config(config: &ClientConfig) -> Result<Self> {
        Self::with_config(&config.stream_url(), ConnectionConfig::from(config))
    }

    #[must_use]
    pub fn url(&self) -> &str {
        self.inner.url.as_str()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Watch state transitions, e.g. to drive a connection indicator.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Reconnects scheduled since the manager was created.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.reconnects.load(Ordering::SeqCst)
    }

    /// Start the stream and wait for the first open attempt.
    ///
    /// A failed first attempt is returned but does not stop the reconnect
    /// loop. Calling this while a connection is open, opening, or waiting to
    /// reconnect only logs a warning.
    pub async fn connect(&self, handlers: StreamHandlers) -> Result<()> {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return Err(ClientError::ShutDown);
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        {
            let mut supervisor = lock_unpoisoned(&self.inner.supervisor);
            if let Some(task) = supervisor.as_ref()
                && !task.is_finished()
            {
                warn!(
                    url = %self.inner.url,
                    state = self.state().as_str(),
                    "stream already active, ignoring connect"
                );
                return Ok(());
            }
            let shared = Arc::clone(&self.inner);
            *supervisor = Some(tokio::spawn(supervise(shared, handlers, ready_tx)));
        }

        ready_rx.await.unwrap_or(Err(ClientError::ShutDown))
    }

    /// Cancel any pending reconnect and close the socket. Final.
    pub async fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::SeqCst);
        let task = lock_unpoisoned(&self.inner.supervisor).take();
        if let Some(task) = task {
            task.abort();
        }
        if let Some(mut writer) = self.inner.writer.lock().await.take()
            && let Err(error) = writer.send(Message::Close(None)).await
        {
            debug!(url = %self.inner.url, %error, "close frame not delivered");
        }
        self.inner.set_state(ConnectionState::Disconnected);
        info!(url = %self.inner.url, "stream shut down");
    }

    pub async fn send_json(&self, value: &Value) -> Result<()> {
        if self.state() != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }
        let text = serde_json::to_string(value)?;
        let mut writer_guard = self.inner.writer.lock().await;
        let writer = writer_guard.as_mut().ok_or(ClientError::NotConnected)?;
        writer
            .send(Message::Text(text))
            .await
            .map_err(|error| ClientError::ConnectionLost(error.to_string()))
    }
}

#[async_trait]
impl LiveChannel for ConnectionManager {
    fn state(&self) -> ConnectionState {
        ConnectionManager::state(self)
    }

    async fn send_json(&self, message: &Value) -> Result<()> {
        ConnectionManager::send_json(self, message).await
    }
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    async fn open(&self) -> Result<WsReader> {
        let (stream, _response) = timeout(
            self.config.connect_timeout,
            connect_async(self.url.as_str()),
        )
        .await
        .map_err(|_| {
            ClientError::Timeout(format!(
                "connection timeout after {:?}",
                self.config.connect_timeout
            ))
        })?
        .map_err(|error| ClientError::WebSocket(error.to_string()))?;

        let (writer, reader) = stream.split();
        *self.writer.lock().await = Some(writer);
        Ok(reader)
    }

    /// Feed frames to the handlers until the stream ends. Returns why it ended.
    async fn pump(&self, mut reader: WsReader, handlers: &StreamHandlers) -> &'static str {
        while let Some(frame) = reader.next().await {
            match frame {
                Ok(Message::Text(text)) => match parse_frame(text.as_str()) {
                    Ok(value) => (handlers.on_message)(value),
                    Err(error) => {
                        warn!(url = %self.url, %error, "dropping malformed stream frame");
                    }
                },
                Ok(Message::Close(_)) => return "closed by peer",
                Ok(Message::Ping(payload)) => {
                    debug!(url = %self.url, bytes = payload.len(), "received ping");
                }
                Ok(Message::Pong(_) | Message::Binary(_) | Message::Frame(_)) => {}
                Err(error) => {
                    let error = ClientError::WebSocket(error.to_string());
                    warn!(url = %self.url, %error, "websocket read error");
                    handlers.report(&error);
                    return "read error";
                }
            }
        }
        "stream ended"
    }
}

async fn supervise(
    shared: Arc<Shared>,
    handlers: StreamHandlers,
    ready: oneshot::Sender<Result<()>>,
) {
    let mut ready = Some(ready);
    let mut failures: u32 = 0;

    loop {
        shared.set_state(ConnectionState::Connecting);
        match shared.open().await {
            Ok(reader) => {
                failures = 0;
                shared.set_state(ConnectionState::Connected);
                info!(url = %shared.url, "stream connected");
                if let Some(ready) = ready.take() {
                    let _ = ready.send(Ok(()));
                }

                let reason = shared.pump(reader, &handlers).await;
                shared.writer.lock().await.take();
                shared.set_state(ConnectionState::Disconnected);
                warn!(url = %shared.url, reason, "stream disconnected");
            }
            Err(error) => {
                failures = failures.saturating_add(1);
                shared.set_state(ConnectionState::Disconnected);
                warn!(url = %shared.url, %error, "stream connect failed");
                handlers.report(&error);
                if let Some(ready) = ready.take() {
                    let _ = ready.send(Err(error));
                }
            }
        }

        if shared.shut_down.load(Ordering::SeqCst) {
            break;
        }

        // Consecutive failed opens; a clean close counts as the first retry.
        let attempt = failures.max(1);
        let policy = &shared.config.reconnect;
        if !policy.allows(attempt) {
            warn!(
                url = %shared.url,
                attempts = failures,
                "reconnect attempts exhausted, staying disconnected"
            );
            break;
        }

        let delay = policy.delay_for(attempt);
        shared.reconnects.fetch_add(1, Ordering::SeqCst);
        info!(url = %shared.url, attempt, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
        tokio::time::sleep(delay).await;
    }

    shared.set_state(ConnectionState::Disconnected);
}

/// Parse one inbound text frame. The payload shape belongs to the renderer.
pub fn parse_frame(text: &str) -> Result<Value> {
    serde_json::from_str(text).map_err(|error| ClientError::Protocol(error.to_string()))
}
