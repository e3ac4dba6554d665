//! Error types for typed event decoding.

/// Errors turning a raw Socket.IO event into an [`InboundEvent`](crate::InboundEvent).
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// The event carries no argument but one is required
    #[error("Event '{event}' has no payload")]
    MissingPayload { event: String },

    /// The payload does not match the expected shape
    #[error("Invalid payload for '{event}': {source}")]
    InvalidPayload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience type alias for Results using EventError.
pub type Result<T> = std::result::Result<T, EventError>;
