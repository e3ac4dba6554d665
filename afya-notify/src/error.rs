//! Error types for the notification client

use socket_transport::TransportError;
use thiserror::Error;

/// Errors that can occur while setting up a [`NotificationClient`](crate::NotificationClient)
///
/// Once a client exists, nothing it does returns an error: connection
/// problems surface as `connect_error` events and log diagnostics.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The background runtime thread could not be started
    #[error("Failed to start notification worker: {0}")]
    RuntimeStartup(String),

    /// The transport configuration was rejected
    #[error("Invalid configuration: {0}")]
    Configuration(#[from] TransportError),
}

/// Result type alias for notification client operations
pub type Result<T> = std::result::Result<T, NotifyError>;
