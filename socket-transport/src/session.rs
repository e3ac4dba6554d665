//! Transport session: one logical Socket.IO connection and its driver task
//!
//! A [`TransportSession`] is a cheap handle; the connection itself is owned
//! by a driver task spawned on a tokio runtime. The driver establishes the
//! connection, answers heartbeats, dispatches inbound events and reconnects
//! with backoff when the connection is lost.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{json, Value};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::backoff::Backoff;
use crate::config::TransportConfig;
use crate::dispatch::{DispatchTable, RawEvent};
use crate::error::TransportError;
use crate::link::{Connector, Link};
use crate::packet::{EnginePacket, SocketPacket};
use crate::types::{ConnectionState, DisconnectReason, SessionId, TransportKind};

/// Lifecycle event fired after each (re)connection.
pub const CONNECT_EVENT: &str = "connect";
/// Lifecycle event fired when a live connection ends; the argument is the reason.
pub const DISCONNECT_EVENT: &str = "disconnect";
/// Lifecycle event fired when a connection attempt fails.
pub const CONNECT_ERROR_EVENT: &str = "connect_error";

/// Hooks run by the driver around connection transitions.
///
/// `on_connected` runs after the namespace handshake and before the
/// `connect` lifecycle event; the packets it returns are written first on
/// the new connection, in order.
pub trait SessionObserver: Send + Sync {
    fn on_connected(&self, _session: SessionId, _socket_id: &str) -> Vec<SocketPacket> {
        Vec::new()
    }

    fn on_disconnected(&self, _session: SessionId, _reason: DisconnectReason) {}
}

#[derive(Debug)]
enum Command {
    Send(SocketPacket),
    Disconnect,
}

struct Status {
    state: ConnectionState,
    socket_id: Option<String>,
    transport: Option<Arc<RwLock<TransportKind>>>,
}

struct SessionShared {
    id: SessionId,
    status: RwLock<Status>,
    dispatch: DispatchTable,
    observers: Vec<Arc<dyn SessionObserver>>,
    closed: AtomicBool,
}

impl SessionShared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Update the state unless the session has been closed; a closed
    /// session only ever reports `Disconnected`.
    fn set_state(&self, state: ConnectionState) {
        let mut status = self.status.write();
        if self.is_closed() && state != ConnectionState::Disconnected {
            return;
        }
        status.state = state;
        if state != ConnectionState::Connected {
            status.socket_id = None;
            status.transport = None;
        }
    }

    fn mark_connected(&self, socket_id: &str, transport: Arc<RwLock<TransportKind>>) -> bool {
        let mut status = self.status.write();
        if self.is_closed() {
            return false;
        }
        status.state = ConnectionState::Connected;
        status.socket_id = Some(socket_id.to_string());
        status.transport = Some(transport);
        true
    }

    fn close(&self) -> bool {
        let mut status = self.status.write();
        let was_closed = self.closed.swap(true, Ordering::SeqCst);
        status.state = ConnectionState::Disconnected;
        status.socket_id = None;
        status.transport = None;
        !was_closed
    }

    fn fire(&self, name: &str, args: Vec<Value>) {
        self.dispatch.dispatch(&RawEvent::new(name, args));
    }
}

/// Handle to one connection and its reconnection loop.
///
/// Clones share the same connection. Once disconnected (explicitly, by the
/// server, or after reconnection gives up) a session never reconnects; a
/// new one must be started.
#[derive(Clone)]
pub struct TransportSession {
    shared: Arc<SessionShared>,
    commands: mpsc::UnboundedSender<Command>,
    // Closes when the driver task returns
    driver_done: watch::Receiver<()>,
}

impl TransportSession {
    /// Spawn the driver on `runtime` and return immediately.
    ///
    /// The session starts in `Connecting`; observers are consulted on every
    /// connect and disconnect transition.
    pub fn start(
        config: TransportConfig,
        connector: Arc<dyn Connector>,
        runtime: &Handle,
        observers: Vec<Arc<dyn SessionObserver>>,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (done_tx, driver_done) = watch::channel(());
        let shared = Arc::new(SessionShared {
            id: SessionId::next(),
            status: RwLock::new(Status {
                state: ConnectionState::Connecting,
                socket_id: None,
                transport: None,
            }),
            dispatch: DispatchTable::new(),
            observers,
            closed: AtomicBool::new(false),
        });

        tracing::info!(session = %shared.id, url = %config.server_url, "Starting transport session");

        let driver = Driver {
            shared: Arc::clone(&shared),
            backoff: Backoff::from_config(&config),
            config,
            connector,
            commands: command_rx,
            _done: done_tx,
        };
        runtime.spawn(driver.run());

        Self {
            shared,
            commands,
            driver_done,
        }
    }

    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.status.read().state
    }

    /// `true` only in the `Connected` state.
    pub fn is_connected(&self) -> bool {
        self.state().is_usable()
    }

    /// Whether the session has reached its terminal state.
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Socket id assigned by the server for the current connection.
    pub fn socket_id(&self) -> Option<String> {
        self.shared.status.read().socket_id.clone()
    }

    /// Transport carrying the current connection.
    pub fn transport(&self) -> Option<TransportKind> {
        self.shared
            .status
            .read()
            .transport
            .as_ref()
            .map(|kind| *kind.read())
    }

    /// Handlers invoked for inbound and lifecycle events.
    pub fn dispatch(&self) -> &DispatchTable {
        &self.shared.dispatch
    }

    /// Send an event if connected; otherwise drop it with a warning.
    ///
    /// Returns whether the event was handed to the driver.
    pub fn emit(&self, event: &str, args: Vec<Value>) -> bool {
        let state = self.state();
        if !state.is_usable() {
            tracing::warn!(session = %self.shared.id, event, state = %state, "Dropping emit: not connected");
            return false;
        }
        self.send(SocketPacket::event(event, args))
    }

    /// Queue a packet for the driver without checking the state.
    ///
    /// The driver writes it if a connection is live when it is processed
    /// and drops it otherwise.
    pub fn send(&self, packet: SocketPacket) -> bool {
        self.commands.send(Command::Send(packet)).is_ok()
    }

    /// Whether the driver task has returned. After `disconnect` this means
    /// the namespace close was written and the link shut down.
    pub fn is_finished(&self) -> bool {
        self.driver_done.has_changed().is_err()
    }

    /// Wait until the driver task has returned.
    pub async fn finished(&self) {
        let mut done = self.driver_done.clone();
        while done.changed().await.is_ok() {}
    }

    /// Close the connection and stop reconnecting. Idempotent.
    pub fn disconnect(&self) {
        if self.shared.close() {
            tracing::info!(session = %self.shared.id, "Disconnecting");
            let _ = self.commands.send(Command::Disconnect);
        }
    }
}

impl std::fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSession")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .field("socket_id", &self.socket_id())
            .finish()
    }
}

enum Established {
    Ready(Link, String),
    Failed(TransportError),
    Cancelled,
}

enum Outcome {
    Lost(DisconnectReason),
    ClientClosed,
    ServerClosed,
}

struct Driver {
    shared: Arc<SessionShared>,
    config: TransportConfig,
    connector: Arc<dyn Connector>,
    commands: mpsc::UnboundedReceiver<Command>,
    backoff: Backoff,
    _done: watch::Sender<()>,
}

/// Handle a command that arrived while no connection is live.
/// Returns `false` when the session should stop.
fn idle_command(session: SessionId, command: Option<Command>) -> bool {
    match command {
        Some(Command::Send(packet)) => {
            tracing::warn!(session = %session, packet = %packet.encode(), "Dropping send: no live connection");
            true
        }
        Some(Command::Disconnect) | None => false,
    }
}

impl Driver {
    async fn run(mut self) {
        let mut ever_connected = false;

        loop {
            if self.shared.is_closed() {
                break;
            }
            self.shared.set_state(if ever_connected {
                ConnectionState::Reconnecting
            } else {
                ConnectionState::Connecting
            });

            match self.establish().await {
                Established::Cancelled => break,
                Established::Failed(err) => {
                    tracing::error!(session = %self.shared.id, error = %err, "Connection attempt failed");
                    self.shared.fire(
                        CONNECT_ERROR_EVENT,
                        vec![json!({ "message": err.to_string() })],
                    );
                    if !self.config.reconnection || !self.wait_before_retry().await {
                        break;
                    }
                }
                Established::Ready(link, socket_id) => {
                    ever_connected = true;
                    self.backoff.reset();
                    match self.serve(link, socket_id).await {
                        Outcome::ClientClosed | Outcome::ServerClosed => break,
                        Outcome::Lost(_) => {
                            if !self.config.reconnection || !self.wait_before_retry().await {
                                break;
                            }
                        }
                    }
                }
            }
        }

        self.shared.close();
        tracing::info!(session = %self.shared.id, "Transport session closed");
    }

    async fn wait_before_retry(&mut self) -> bool {
        if let Some(limit) = self.config.reconnection_attempts {
            if self.backoff.attempts() >= limit {
                tracing::warn!(
                    session = %self.shared.id,
                    "Giving up after {} reconnection attempts",
                    limit
                );
                return false;
            }
        }

        let delay = self.backoff.duration();
        tracing::debug!(
            session = %self.shared.id,
            attempt = self.backoff.attempts(),
            "Reconnecting in {:?}",
            delay
        );

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return !self.shared.is_closed(),
                command = self.commands.recv() => {
                    if !idle_command(self.shared.id, command) {
                        return false;
                    }
                }
            }
        }
    }

    /// Open a transport and complete the namespace handshake.
    async fn establish(&mut self) -> Established {
        let session = self.shared.id;

        // The connector bounds each transport attempt itself, so a hanging
        // websocket still leaves time for the polling fallback
        let opening = self.connector.open(&self.config);
        tokio::pin!(opening);
        let mut link = loop {
            tokio::select! {
                opened = &mut opening => match opened {
                    Ok(link) => break link,
                    Err(e) => return Established::Failed(e),
                },
                command = self.commands.recv() => {
                    if !idle_command(session, command) {
                        return Established::Cancelled;
                    }
                }
            }
        };

        tracing::debug!(session = %session, transport = %link.kind(), "Transport open, joining namespace");
        let deadline = Instant::now() + self.config.connect_timeout;
        if link
            .send(SocketPacket::Connect { sid: None }.into_engine())
            .is_err()
        {
            return Established::Failed(TransportError::Closed);
        }

        loop {
            tokio::select! {
                frame = tokio::time::timeout_at(deadline, link.recv()) => {
                    let packet = match frame {
                        Err(_) => {
                            link.shutdown().await;
                            return Established::Failed(TransportError::Timeout(
                                "namespace handshake".to_string(),
                            ));
                        }
                        Ok(None) => return Established::Failed(TransportError::Closed),
                        Ok(Some(Err(e))) => return Established::Failed(e),
                        Ok(Some(Ok(packet))) => packet,
                    };

                    match packet {
                        EnginePacket::Ping(data) => {
                            let _ = link.send(EnginePacket::Pong(data));
                        }
                        EnginePacket::Close => return Established::Failed(TransportError::Closed),
                        EnginePacket::Message(data) => match SocketPacket::decode(&data) {
                            Ok(SocketPacket::Connect { sid: Some(socket_id) }) => {
                                return Established::Ready(link, socket_id);
                            }
                            Ok(SocketPacket::Connect { sid: None }) => {
                                link.shutdown().await;
                                return Established::Failed(TransportError::Handshake(
                                    "CONNECT reply without a socket id".to_string(),
                                ));
                            }
                            Ok(SocketPacket::ConnectError(detail)) => {
                                link.shutdown().await;
                                return Established::Failed(TransportError::Refused(
                                    SocketPacket::error_message(&detail),
                                ));
                            }
                            Ok(other) => {
                                tracing::debug!(session = %session, "Ignoring {:?} before namespace connect", other);
                            }
                            Err(e) => {
                                tracing::warn!(session = %session, error = %e, "Dropping undecodable packet");
                            }
                        },
                        _ => {}
                    }
                }
                command = self.commands.recv() => {
                    if !idle_command(session, command) {
                        link.shutdown().await;
                        return Established::Cancelled;
                    }
                }
            }
        }
    }

    /// Run a live connection until it ends.
    async fn serve(&mut self, mut link: Link, socket_id: String) -> Outcome {
        let session = self.shared.id;

        if !self.shared.mark_connected(&socket_id, link.kind_handle()) {
            let _ = link.send(SocketPacket::Disconnect.into_engine());
            link.shutdown().await;
            return Outcome::ClientClosed;
        }
        tracing::info!(
            session = %session,
            socket_id = %socket_id,
            transport = %link.kind(),
            "Connected"
        );

        for observer in &self.shared.observers {
            for packet in observer.on_connected(session, &socket_id) {
                tracing::debug!(session = %session, packet = %packet.encode(), "Sending on connect");
                let _ = link.send(packet.into_engine());
            }
        }
        self.shared.fire(CONNECT_EVENT, Vec::new());

        let heartbeat = link.handshake().heartbeat_deadline();
        let watchdog = tokio::time::sleep(heartbeat);
        tokio::pin!(watchdog);

        let outcome = loop {
            tokio::select! {
                _ = &mut watchdog => {
                    tracing::warn!(session = %session, "No ping within {:?}", heartbeat);
                    break Outcome::Lost(DisconnectReason::PingTimeout);
                }
                frame = link.recv() => match frame {
                    None => break Outcome::Lost(DisconnectReason::TransportClose),
                    Some(Err(TransportError::Protocol(e))) => {
                        tracing::warn!(session = %session, error = %e, "Dropping undecodable packet");
                    }
                    Some(Err(e)) => {
                        tracing::warn!(session = %session, error = %e, "Transport failed");
                        break Outcome::Lost(DisconnectReason::TransportError);
                    }
                    Some(Ok(packet)) => match packet {
                        EnginePacket::Ping(data) => {
                            watchdog.as_mut().reset(Instant::now() + heartbeat);
                            let _ = link.send(EnginePacket::Pong(data));
                        }
                        EnginePacket::Close => break Outcome::Lost(DisconnectReason::TransportClose),
                        EnginePacket::Message(data) => match SocketPacket::decode(&data) {
                            Ok(SocketPacket::Event { name, args, .. }) => {
                                if !self.shared.is_closed() {
                                    tracing::debug!(session = %session, event = %name, "Event received");
                                    self.shared.dispatch.dispatch(&RawEvent::new(name, args));
                                }
                            }
                            Ok(SocketPacket::Disconnect) => {
                                tracing::info!(session = %session, "Server closed the namespace");
                                break Outcome::ServerClosed;
                            }
                            Ok(SocketPacket::ConnectError(detail)) => {
                                self.shared.fire(
                                    CONNECT_ERROR_EVENT,
                                    vec![json!({ "message": SocketPacket::error_message(&detail) })],
                                );
                            }
                            Ok(SocketPacket::Connect { .. }) => {
                                tracing::debug!(session = %session, "Ignoring duplicate CONNECT");
                            }
                            Err(e) => {
                                tracing::warn!(session = %session, error = %e, "Dropping undecodable packet");
                            }
                        },
                        EnginePacket::Open(_)
                        | EnginePacket::Pong(_)
                        | EnginePacket::Upgrade
                        | EnginePacket::Noop => {}
                    },
                },
                command = self.commands.recv() => match command {
                    Some(Command::Send(packet)) => {
                        tracing::debug!(session = %session, packet = %packet.encode(), "Sending");
                        if link.send(packet.into_engine()).is_err() {
                            tracing::warn!(session = %session, "Dropping send: transport closed");
                        }
                    }
                    Some(Command::Disconnect) | None => {
                        let _ = link.send(SocketPacket::Disconnect.into_engine());
                        break Outcome::ClientClosed;
                    }
                },
            }
        };

        let reason = match outcome {
            Outcome::Lost(reason) => reason,
            Outcome::ClientClosed => DisconnectReason::IoClientDisconnect,
            Outcome::ServerClosed => DisconnectReason::IoServerDisconnect,
        };

        link.shutdown().await;

        let next_state = if reason.allows_reconnect() && self.config.reconnection {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Disconnected
        };
        self.shared.set_state(next_state);
        if !reason.allows_reconnect() {
            self.shared.close();
        }

        tracing::info!(session = %session, reason = %reason, "Disconnected");
        for observer in &self.shared.observers {
            observer.on_disconnected(session, reason);
        }
        self.shared.fire(DISCONNECT_EVENT, vec![json!(reason.as_str())]);

        outcome
    }
}
