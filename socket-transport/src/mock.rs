//! In-memory event server for tests.
//!
//! [`MockServer`] plays the server side of Engine.IO/Socket.IO without a
//! network: it answers namespace CONNECT packets, records everything the
//! client sends and lets a test push events or drop the connection.
//! [`MockConnector`] is the `Connector` a session uses to reach it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::config::TransportConfig;
use crate::error::{Result, TransportError};
use crate::link::{Connector, Link, LinkIo};
use crate::packet::{EnginePacket, Handshake, SocketPacket};
use crate::types::TransportKind;

enum ServerAction {
    Push(EnginePacket),
    Drop,
}

struct MockState {
    attempts: usize,
    opens: usize,
    fail_next: usize,
    refusal: Option<String>,
    ping_interval: u64,
    ping_timeout: u64,
    received: Vec<SocketPacket>,
    current: Option<mpsc::UnboundedSender<ServerAction>>,
}

/// Scriptable stand-in for the event server.
#[derive(Clone)]
pub struct MockServer {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockServer {
    /// Server with a heartbeat long enough never to expire during a test.
    pub fn new() -> Self {
        Self::with_heartbeat(60_000, 60_000)
    }

    /// Server advertising the given ping interval and timeout (milliseconds).
    /// It never sends pings on its own; see [`MockServer::ping`].
    pub fn with_heartbeat(ping_interval: u64, ping_timeout: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                attempts: 0,
                opens: 0,
                fail_next: 0,
                refusal: None,
                ping_interval,
                ping_timeout,
                received: Vec::new(),
                current: None,
            })),
        }
    }

    /// Connector that opens links to this server.
    pub fn connector(&self) -> MockConnector {
        MockConnector {
            server: self.clone(),
        }
    }

    /// Make the next `n` transport opens fail.
    pub fn fail_next_connects(&self, n: usize) {
        self.state.lock().fail_next = n;
    }

    /// Answer namespace CONNECT with CONNECT_ERROR carrying `message`
    /// (or accept again with `None`).
    pub fn refuse_connects(&self, message: Option<&str>) {
        self.state.lock().refusal = message.map(str::to_string);
    }

    /// Push an event to the connected client.
    pub fn push_event(&self, name: &str, args: Vec<Value>) -> bool {
        self.act(ServerAction::Push(
            SocketPacket::event(name, args).into_engine(),
        ))
    }

    /// Send a heartbeat ping.
    pub fn ping(&self) -> bool {
        self.act(ServerAction::Push(EnginePacket::Ping(String::new())))
    }

    /// Close the namespace from the server side (`41`).
    pub fn disconnect_from_server(&self) -> bool {
        self.act(ServerAction::Push(SocketPacket::Disconnect.into_engine()))
    }

    /// Drop the underlying connection without a close handshake.
    pub fn drop_connection(&self) -> bool {
        let sent = self.act(ServerAction::Drop);
        self.state.lock().current = None;
        sent
    }

    /// Whether a client link is currently open.
    pub fn is_link_open(&self) -> bool {
        self.state
            .lock()
            .current
            .as_ref()
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    /// Transport opens that succeeded.
    pub fn open_count(&self) -> usize {
        self.state.lock().opens
    }

    /// Transport opens attempted, including failed ones.
    pub fn attempt_count(&self) -> usize {
        self.state.lock().attempts
    }

    /// Socket.IO packets received from the client, oldest first.
    pub fn received(&self) -> Vec<SocketPacket> {
        self.state.lock().received.clone()
    }

    /// Events received from the client as `(name, args)`.
    pub fn sent_events(&self) -> Vec<(String, Vec<Value>)> {
        self.state
            .lock()
            .received
            .iter()
            .filter_map(|packet| match packet {
                SocketPacket::Event { name, args, .. } => Some((name.clone(), args.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn clear_received(&self) {
        self.state.lock().received.clear();
    }

    fn act(&self, action: ServerAction) -> bool {
        match self.state.lock().current.as_ref() {
            Some(tx) => tx.send(action).is_ok(),
            None => false,
        }
    }
}

/// `Connector` backed by a [`MockServer`].
#[derive(Clone)]
pub struct MockConnector {
    server: MockServer,
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, _config: &TransportConfig) -> Result<Link> {
        let (handshake, actions, socket_id) = {
            let mut state = self.server.state.lock();
            state.attempts += 1;
            if state.fail_next > 0 {
                state.fail_next -= 1;
                return Err(TransportError::Connection(
                    "mock server refused the connection".to_string(),
                ));
            }
            state.opens += 1;

            let handshake = Handshake {
                sid: format!("engine-{}", state.opens),
                upgrades: vec![],
                ping_interval: state.ping_interval,
                ping_timeout: state.ping_timeout,
                max_payload: 1_000_000,
            };
            let (tx, rx) = mpsc::unbounded_channel();
            state.current = Some(tx);
            (handshake, rx, format!("sock-{}", state.opens))
        };

        let (mut link, io) = Link::channel(handshake, TransportKind::WebSocket);
        link.attach(tokio::spawn(respond(
            io,
            actions,
            Arc::clone(&self.server.state),
            socket_id,
        )));
        Ok(link)
    }
}

async fn respond(
    mut io: LinkIo,
    mut actions: mpsc::UnboundedReceiver<ServerAction>,
    state: Arc<Mutex<MockState>>,
    socket_id: String,
) {
    loop {
        tokio::select! {
            packet = io.outbound.recv() => match packet {
                None | Some(EnginePacket::Close) => break,
                Some(EnginePacket::Message(data)) => match SocketPacket::decode(&data) {
                    Ok(SocketPacket::Connect { .. }) => {
                        let refusal = state.lock().refusal.clone();
                        let reply = match refusal {
                            Some(message) => SocketPacket::ConnectError(json!({ "message": message })),
                            None => SocketPacket::Connect { sid: Some(socket_id.clone()) },
                        };
                        let _ = io.inbound.send(Ok(reply.into_engine()));
                    }
                    Ok(packet) => state.lock().received.push(packet),
                    Err(e) => tracing::debug!(error = %e, "Mock server ignoring packet"),
                },
                Some(_) => {}
            },
            action = actions.recv() => match action {
                Some(ServerAction::Push(packet)) => {
                    if io.inbound.send(Ok(packet)).is_err() {
                        break;
                    }
                }
                Some(ServerAction::Drop) | None => break,
            },
        }
    }
}

/// Poll `condition` until it holds or `limit` elapses.
pub async fn wait_until<F: FnMut() -> bool>(limit: Duration, mut condition: F) -> bool {
    let deadline = Instant::now() + limit;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Blocking variant of [`wait_until`] for synchronous tests.
pub fn wait_for<F: FnMut() -> bool>(limit: Duration, mut condition: F) -> bool {
    let deadline = Instant::now() + limit;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}
