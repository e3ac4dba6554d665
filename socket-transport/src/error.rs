//! Error types for the socket-transport crate.

/// Errors raised while establishing or running a transport.
///
/// These never cross the notification facade: the session turns them into
/// `connect_error` lifecycle events and log lines.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport could not reach the server
    #[error("Connection error: {0}")]
    Connection(String),

    /// The server answered but the Engine.IO/Socket.IO handshake failed
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// The server refused the namespace connection (CONNECT_ERROR)
    #[error("Connection refused by server: {0}")]
    Refused(String),

    /// A frame could not be decoded
    #[error("Protocol error: {0}")]
    Protocol(#[from] PacketError),

    /// A websocket operation failed
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// A polling request failed
    #[error("HTTP error: {0}")]
    Http(String),

    /// The link is gone
    #[error("Transport closed")]
    Closed,

    /// An operation did not complete in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Errors from the Engine.IO / Socket.IO packet codec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    /// Zero-length frame
    #[error("Empty packet")]
    Empty,

    /// The leading type digit is not a known packet type
    #[error("Unknown packet type: {0:?}")]
    UnknownType(char),

    /// The payload is not valid JSON for this packet type
    #[error("Invalid JSON payload: {0}")]
    InvalidJson(String),

    /// An EVENT packet whose array does not start with a string name
    #[error("Event packet without a name")]
    MissingEventName,

    /// A packet addressed to a namespace other than `/`
    #[error("Unsupported namespace: {0}")]
    UnsupportedNamespace(String),

    /// A packet type this client does not handle (acks, binary attachments)
    #[error("Unsupported packet: {0}")]
    Unsupported(String),
}

impl From<serde_json::Error> for PacketError {
    fn from(err: serde_json::Error) -> Self {
        PacketError::InvalidJson(err.to_string())
    }
}

/// Convenience type alias for Results using TransportError.
pub type Result<T> = std::result::Result<T, TransportError>;
