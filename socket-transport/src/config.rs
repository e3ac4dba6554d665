//! Configuration types for the socket-transport crate
//!
//! `TransportConfig` controls where the session connects, which transports it
//! tries and in what order, and how it behaves when a connection drops.

use std::time::Duration;

use url::Url;

use crate::error::{Result, TransportError};
use crate::types::TransportKind;

/// Environment variable holding the event server address.
pub const SERVER_URL_ENV: &str = "AFYA_API_URL";

/// Server address used when nothing is configured (local development API).
pub const DEFAULT_SERVER_URL: &str = "http://localhost:4000";

/// Engine.IO protocol revision spoken by this client.
pub const ENGINE_IO_VERSION: &str = "4";

/// Configuration for a `TransportSession`
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Event server base address (http, https, ws or wss)
    /// Default: `http://localhost:4000`
    pub server_url: String,

    /// Socket.IO endpoint path on the server
    /// Default: `/socket.io/`
    pub path: String,

    /// Transports to try, in order of preference
    /// Default: websocket, then polling
    pub transports: Vec<TransportKind>,

    /// Try to upgrade a polling connection to websocket once it is open
    /// Default: true
    pub upgrade: bool,

    /// Re-establish lost connections automatically
    /// Default: true
    pub reconnection: bool,

    /// Give up after this many consecutive failed attempts (`None` = never)
    /// Default: None
    pub reconnection_attempts: Option<u32>,

    /// First reconnection delay
    /// Default: 1 second
    pub reconnection_delay: Duration,

    /// Upper bound for the reconnection delay
    /// Default: 5 seconds
    pub reconnection_delay_max: Duration,

    /// Jitter applied to each delay, between 0 and 1
    /// Default: 0.5
    pub randomization_factor: f64,

    /// Time allowed for the transport and namespace handshakes
    /// Default: 20 seconds
    pub connect_timeout: Duration,

    /// Time allowed for the websocket upgrade probe
    /// Default: 10 seconds
    pub upgrade_timeout: Duration,

    /// Capacity of buffered event streams handed to consumers
    /// Default: 256
    pub event_buffer_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            path: "/socket.io/".to_string(),
            transports: vec![TransportKind::WebSocket, TransportKind::Polling],
            upgrade: true,
            reconnection: true,
            reconnection_attempts: None,
            reconnection_delay: Duration::from_secs(1),
            reconnection_delay_max: Duration::from_secs(5),
            randomization_factor: 0.5,
            connect_timeout: Duration::from_secs(20),
            upgrade_timeout: Duration::from_secs(10),
            event_buffer_size: 256,
        }
    }
}

impl TransportConfig {
    /// Create a new TransportConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a config whose server address comes from `AFYA_API_URL`,
    /// falling back to the local development default.
    pub fn from_env() -> Self {
        match std::env::var(SERVER_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => Self::default().with_server_url(url.trim()),
            _ => Self::default(),
        }
    }

    /// Preset for a developer machine: local server, quick retries
    pub fn local_development() -> Self {
        Self {
            reconnection_delay: Duration::from_millis(500),
            reconnection_delay_max: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    /// Preset that never falls back to polling
    pub fn websocket_only() -> Self {
        Self {
            transports: vec![TransportKind::WebSocket],
            upgrade: false,
            ..Default::default()
        }
    }

    /// Preset for networks that block websockets
    pub fn polling_only() -> Self {
        Self {
            transports: vec![TransportKind::Polling],
            upgrade: false,
            ..Default::default()
        }
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<()> {
        self.base_url()?;

        if self.transports.is_empty() {
            return Err(TransportError::Configuration(
                "At least one transport must be configured".to_string(),
            ));
        }

        for (i, kind) in self.transports.iter().enumerate() {
            if self.transports[..i].contains(kind) {
                return Err(TransportError::Configuration(format!(
                    "Transport '{}' listed more than once",
                    kind
                )));
            }
        }

        if self.reconnection_delay > self.reconnection_delay_max {
            return Err(TransportError::Configuration(
                "Invalid reconnection delay: base must not exceed max".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.randomization_factor) {
            return Err(TransportError::Configuration(
                "Randomization factor must be between 0 and 1".to_string(),
            ));
        }

        if self.connect_timeout == Duration::ZERO {
            return Err(TransportError::Configuration(
                "Connect timeout must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(TransportError::Configuration(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.reconnection_attempts == Some(0) {
            return Err(TransportError::Configuration(
                "Reconnection attempts must be greater than 0 when set".to_string(),
            ));
        }

        Ok(())
    }

    /// Server address joined with the Socket.IO path, without query.
    pub fn base_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.server_url).map_err(|e| {
            TransportError::Configuration(format!("Invalid server URL '{}': {}", self.server_url, e))
        })?;

        match url.scheme() {
            "http" | "https" | "ws" | "wss" => {}
            other => {
                return Err(TransportError::Configuration(format!(
                    "Unsupported URL scheme '{}'",
                    other
                )))
            }
        }

        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        url.set_path(&path);
        url.set_query(None);
        Ok(url)
    }

    /// Full endpoint for a transport, optionally bound to an Engine.IO session.
    ///
    /// Websocket endpoints use `ws`/`wss`; polling endpoints use `http`/`https`.
    pub fn endpoint(&self, kind: TransportKind, engine_sid: Option<&str>) -> Result<Url> {
        let mut url = self.base_url()?;

        let secure = matches!(url.scheme(), "https" | "wss");
        let scheme = match (kind, secure) {
            (TransportKind::WebSocket, false) => "ws",
            (TransportKind::WebSocket, true) => "wss",
            (TransportKind::Polling, false) => "http",
            (TransportKind::Polling, true) => "https",
        };
        url.set_scheme(scheme).map_err(|_| {
            TransportError::Configuration(format!("Cannot use scheme '{}' for {}", scheme, url))
        })?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("EIO", ENGINE_IO_VERSION);
            query.append_pair("transport", kind.as_str());
            if let Some(sid) = engine_sid {
                query.append_pair("sid", sid);
            }
        }

        Ok(url)
    }

    /// Builder pattern methods for fluent configuration

    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_transports(mut self, transports: Vec<TransportKind>) -> Self {
        self.transports = transports;
        self
    }

    pub fn with_upgrade(mut self, upgrade: bool) -> Self {
        self.upgrade = upgrade;
        self
    }

    pub fn with_reconnection(mut self, enabled: bool) -> Self {
        self.reconnection = enabled;
        self
    }

    pub fn with_reconnection_attempts(mut self, attempts: u32) -> Self {
        self.reconnection_attempts = Some(attempts);
        self
    }

    pub fn with_reconnection_delay(mut self, base: Duration, max: Duration) -> Self {
        self.reconnection_delay = base;
        self.reconnection_delay_max = max;
        self
    }

    pub fn with_randomization_factor(mut self, factor: f64) -> Self {
        self.randomization_factor = factor;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_upgrade_timeout(mut self, timeout: Duration) -> Self {
        self.upgrade_timeout = timeout;
        self
    }

    pub fn with_event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size;
        self
    }
}
