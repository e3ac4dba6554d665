//! Socket.IO v4 transport session for the Afya notification channel.
//!
//! This crate owns the single bidirectional connection between a process
//! and the event server. It speaks Engine.IO v4 over a websocket, falling
//! back to HTTP long-polling (with an opportunistic upgrade back to
//! websocket), and carries Socket.IO v4 packets on the default namespace.
//!
//! # Overview
//!
//! - [`TransportSession`]: handle to one connection. A driver task spawned
//!   on a tokio runtime connects, answers heartbeats, dispatches inbound
//!   events and reconnects with exponential backoff.
//! - [`DispatchTable`]: event name to handler entries, invoked on the
//!   driver task for inbound events and the `connect`, `disconnect` and
//!   `connect_error` lifecycle events.
//! - [`SessionObserver`]: hook used by higher layers to re-send state (room
//!   membership) on every connection.
//! - [`TransportConfig`]: server address, transport order, reconnection
//!   policy and timeouts.
//!
//! Rooms, typed events and the synchronous facade live in the
//! `afya-realtime-events` and `afya-realtime-notify` crates.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use socket_transport::{HandlerId, RawEvent, TransportConfig, TransportConnector, TransportSession};
//!
//! #[tokio::main]
//! async fn main() {
//!     let session = TransportSession::start(
//!         TransportConfig::from_env(),
//!         Arc::new(TransportConnector::new()),
//!         &tokio::runtime::Handle::current(),
//!         Vec::new(),
//!     );
//!
//!     session.dispatch().add(
//!         "rendez-vous-notification",
//!         HandlerId::next(),
//!         Arc::new(|event: &RawEvent| println!("notification: {:?}", event.payload())),
//!     );
//!
//!     tokio::signal::ctrl_c().await.ok();
//!     session.disconnect();
//! }
//! ```

pub mod backoff;
pub mod config;
pub mod connector;
pub mod dispatch;
pub mod error;
pub mod link;
pub mod packet;
pub mod polling;
pub mod session;
pub mod types;
pub mod websocket;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use config::{TransportConfig, DEFAULT_SERVER_URL, SERVER_URL_ENV};
pub use connector::TransportConnector;
pub use dispatch::{DispatchTable, RawCallback, RawEvent};
pub use error::{PacketError, Result, TransportError};
pub use link::{Connector, Link, LinkIo};
pub use packet::{EnginePacket, Handshake, SocketPacket};
pub use session::{
    SessionObserver, TransportSession, CONNECT_ERROR_EVENT, CONNECT_EVENT, DISCONNECT_EVENT,
};
pub use types::{ConnectionState, DisconnectReason, HandlerId, SessionId, TransportKind};
