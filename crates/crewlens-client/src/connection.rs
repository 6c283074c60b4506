//! Persistent WebSocket channel to the agent backend.
//!
//! A supervisor task owns the socket. It connects, forwards decoded frames
//! as [`ConnectionEvent`]s, and on any close waits a fixed delay before
//! connecting again, forever, until [`ConnectionManager::shutdown`].
//! The lifecycle is tracked by [`ConnectionState`], whose transition table
//! is a pure function.

use crate::config::ServerConfig;
use crewlens_core::ClientMessage;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle of the physical channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Frames flow both ways.
    Open,
    /// A local close was requested.
    Closing,
}

/// Inputs that drive [`ConnectionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionInput {
    /// Start a connection attempt.
    Connect,
    /// The handshake completed.
    Opened,
    /// The attempt failed or was abandoned.
    ConnectFailed,
    /// Local close requested.
    Close,
    /// The socket is gone, for whatever reason.
    Closed,
}

impl ConnectionState {
    /// Next state for `input`, or `None` if the input is not valid here.
    pub fn transition(self, input: ConnectionInput) -> Option<Self> {
        use ConnectionInput as I;
        match (self, input) {
            (Self::Disconnected, I::Connect) => Some(Self::Connecting),
            (Self::Connecting, I::Opened) => Some(Self::Open),
            (Self::Connecting, I::ConnectFailed) => Some(Self::Disconnected),
            (Self::Open, I::Close) => Some(Self::Closing),
            (Self::Open | Self::Closing, I::Closed) => Some(Self::Disconnected),
            _ => None,
        }
    }

    /// Whether outbound messages are accepted.
    pub fn can_send(self) -> bool {
        self == Self::Open
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
        };
        write!(f, "{s}")
    }
}

/// Lifecycle notifications and decoded frames, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// A new physical channel opened.
    Connected {
        /// Local id of this channel, for log correlation.
        connection_id: Uuid,
    },
    /// A frame that parsed as JSON.
    Message(Value),
    /// The channel closed or an attempt failed; a reconnect follows.
    Disconnected,
    /// A transport error.
    Error(String),
}

struct Shared {
    state: Mutex<ConnectionState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<WsMessage>>>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn apply(&self, input: ConnectionInput) -> ConnectionState {
        let mut state = self.state.lock();
        match state.transition(input) {
            Some(next) => *state = next,
            None => debug!(state = %*state, input = ?input, "Ignoring connection input"),
        }
        *state
    }
}

/// Handle to the connection supervisor. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Spawn the supervisor for `config.url`. Events are delivered on the
    /// returned receiver.
    pub fn connect(config: ServerConfig) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            state: Mutex::new(ConnectionState::Disconnected),
            outbound: Mutex::new(None),
            shutdown,
            task: Mutex::new(None),
        });

        let task = tokio::spawn(supervise(shared.clone(), config, events_tx));
        *shared.task.lock() = Some(task);
        (Self { shared }, events_rx)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    /// Queue a message on the open channel. Returns `false`, doing nothing,
    /// unless the channel is open.
    pub fn send(&self, message: &ClientMessage) -> bool {
        if !self.state().can_send() {
            return false;
        }
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to encode outbound message");
                return false;
            }
        };
        self.shared
            .outbound
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.send(WsMessage::Text(text)).is_ok())
    }

    /// Stop the supervisor and close the channel. No reconnect follows.
    pub async fn shutdown(&self) {
        let _ = self.shared.shutdown.send(true);
        let task = self.shared.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Connection supervisor ended abnormally");
            }
        }
    }
}

async fn supervise(
    shared: Arc<Shared>,
    config: ServerConfig,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) {
    let mut shutdown = shared.shutdown.subscribe();
    let delay = config.reconnect_delay();

    loop {
        if *shutdown.borrow() {
            break;
        }

        shared.apply(ConnectionInput::Connect);
        debug!(url = %config.url, "Connecting");
        let attempt = tokio::select! {
            result = tokio_tungstenite::connect_async(config.url.as_str()) => result,
            _ = shutdown.changed() => {
                shared.apply(ConnectionInput::ConnectFailed);
                break;
            }
        };

        match attempt {
            Ok((socket, _)) => {
                run_connection(&shared, &config, socket, &events, &mut shutdown).await;
            }
            Err(e) => {
                shared.apply(ConnectionInput::ConnectFailed);
                warn!(url = %config.url, error = %e, "Connection attempt failed");
                let _ = events.send(ConnectionEvent::Error(e.to_string()));
                let _ = events.send(ConnectionEvent::Disconnected);
            }
        }

        if *shutdown.borrow() {
            break;
        }
        debug!(delay_ms = config.reconnect_delay_ms, "Reconnecting after delay");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }

    info!("Connection supervisor stopped");
}

async fn run_connection(
    shared: &Shared,
    config: &ServerConfig,
    socket: Socket,
    events: &mpsc::UnboundedSender<ConnectionEvent>,
    shutdown: &mut watch::Receiver<bool>,
) {
    let connection_id = Uuid::new_v4();
    let (mut write, mut read) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
    *shared.outbound.lock() = Some(tx);
    shared.apply(ConnectionInput::Opened);
    info!(connection_id = %connection_id, url = %config.url, "Connected");
    let _ = events.send(ConnectionEvent::Connected { connection_id });

    let mut ping = config
        .ping_interval()
        .map(|every| tokio::time::interval_at(Instant::now() + every, every));

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<Value>(&text) {
                    Ok(value) => {
                        let _ = events.send(ConnectionEvent::Message(value));
                    }
                    Err(e) => {
                        warn!(connection_id = %connection_id, error = %e, "Dropping malformed frame");
                    }
                },
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!(connection_id = %connection_id, "Server closed connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(connection_id = %connection_id, error = %e, "Read error");
                    let _ = events.send(ConnectionEvent::Error(e.to_string()));
                    break;
                }
            },
            Some(message) = rx.recv() => {
                if let Err(e) = write.send(message).await {
                    warn!(connection_id = %connection_id, error = %e, "Write error");
                    let _ = events.send(ConnectionEvent::Error(e.to_string()));
                    break;
                }
            }
            _ = next_ping(&mut ping) => {
                match ClientMessage::ping().to_json() {
                    Ok(text) => {
                        if let Err(e) = write.send(WsMessage::Text(text)).await {
                            warn!(connection_id = %connection_id, error = %e, "Ping failed");
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to encode ping"),
                }
            }
            _ = shutdown.changed() => {
                shared.apply(ConnectionInput::Close);
                if let Err(e) = write.send(WsMessage::Close(None)).await {
                    debug!(connection_id = %connection_id, error = %e, "Close frame not sent");
                }
                break;
            }
        }
    }

    *shared.outbound.lock() = None;
    shared.apply(ConnectionInput::Closed);
    info!(connection_id = %connection_id, "Disconnected");
    let _ = events.send(ConnectionEvent::Disconnected);
}

async fn next_ping(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
