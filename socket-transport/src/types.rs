//! Core types for the socket-transport crate.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle state of a transport session.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum ConnectionState {
    /// No connection; initial and terminal state
    Disconnected,
    /// First handshake in progress (or being retried)
    Connecting,
    /// Namespace handshake completed; sends are delivered
    Connected,
    /// A live connection was lost and is being re-established
    Reconnecting,
}

impl ConnectionState {
    /// Whether outbound frames can be written in this state.
    pub fn is_usable(self) -> bool {
        self == ConnectionState::Connected
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Underlying transport mechanisms, in the order a config prefers them.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum TransportKind {
    /// Persistent streaming transport
    WebSocket,
    /// HTTP long-polling transport
    Polling,
}

impl TransportKind {
    /// Name used in the `transport` query parameter and in handshake upgrade lists.
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::WebSocket => "websocket",
            TransportKind::Polling => "polling",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "websocket" | "ws" => Ok(TransportKind::WebSocket),
            "polling" => Ok(TransportKind::Polling),
            other => Err(format!("unknown transport '{}'", other)),
        }
    }
}

/// Why a connection stopped delivering events.
///
/// The strings match the reasons Socket.IO servers and clients use, so they
/// can be logged or forwarded as-is.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum DisconnectReason {
    /// The server closed the namespace; no reconnection follows
    IoServerDisconnect,
    /// `disconnect()` was called locally
    IoClientDisconnect,
    /// No ping arrived within `pingInterval + pingTimeout`
    PingTimeout,
    /// The underlying connection was closed
    TransportClose,
    /// The underlying connection failed
    TransportError,
}

impl DisconnectReason {
    /// Wire/log representation of the reason.
    pub fn as_str(self) -> &'static str {
        match self {
            DisconnectReason::IoServerDisconnect => "io server disconnect",
            DisconnectReason::IoClientDisconnect => "io client disconnect",
            DisconnectReason::PingTimeout => "ping timeout",
            DisconnectReason::TransportClose => "transport close",
            DisconnectReason::TransportError => "transport error",
        }
    }

    /// Whether the session should try to re-establish the connection.
    pub fn allows_reconnect(self) -> bool {
        !matches!(
            self,
            DisconnectReason::IoServerDisconnect | DisconnectReason::IoClientDisconnect
        )
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one `TransportSession` for the lifetime of the process.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct SessionId(u64);

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

impl SessionId {
    /// Allocate a process-unique session id.
    pub fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Identifies one handler entry in a dispatch table.
///
/// Two entries registered with the same `HandlerId` are still two entries;
/// removal by id takes out the first one only.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct HandlerId(u64);

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

impl HandlerId {
    /// Allocate a process-unique handler id.
    pub fn next() -> Self {
        Self(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for HandlerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_connected_is_usable() {
        assert!(ConnectionState::Connected.is_usable());
        assert!(!ConnectionState::Reconnecting.is_usable());
        assert!(!ConnectionState::Connecting.is_usable());
        assert!(!ConnectionState::Disconnected.is_usable());
    }

    #[test]
    fn test_transport_kind_parsing() {
        assert_eq!("websocket".parse::<TransportKind>(), Ok(TransportKind::WebSocket));
        assert_eq!("WS".parse::<TransportKind>(), Ok(TransportKind::WebSocket));
        assert_eq!(" polling ".parse::<TransportKind>(), Ok(TransportKind::Polling));
        assert!("carrier-pigeon".parse::<TransportKind>().is_err());
    }

    #[test]
    fn test_disconnect_reasons() {
        assert_eq!(DisconnectReason::PingTimeout.to_string(), "ping timeout");
        assert!(DisconnectReason::TransportClose.allows_reconnect());
        assert!(DisconnectReason::TransportError.allows_reconnect());
        assert!(!DisconnectReason::IoServerDisconnect.allows_reconnect());
        assert!(!DisconnectReason::IoClientDisconnect.allows_reconnect());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = HandlerId::next();
        let b = HandlerId::next();
        assert_ne!(a, b);
        assert_ne!(SessionId::next(), SessionId::next());
        assert!(a.to_string().starts_with("handler-"));
    }
}
