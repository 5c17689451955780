//! Error types for hub-event

use thiserror::Error;

/// Errors that can occur in the event core
///
/// Nothing here is fatal to the process. Malformed input is surfaced
/// synchronously to the caller; everything else is logged and degraded.
#[derive(Debug, Error)]
pub enum HubError {
    /// Timestamp does not match the wire format
    #[error("Timestamp '{0}' is not parseable (expected YYYY-MM-DDThh:mm)")]
    InvalidTimestamp(String),

    /// Payload is not valid JSON or has malformed fields
    #[error("Invalid event payload: {0}")]
    InvalidPayload(String),

    /// No registered schedulable event type accepts the payload
    #[error("Payload could not be mapped to a registered event kind")]
    UnknownEventKind,

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Durable store failure (best-effort; in-memory state stays authoritative)
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The counterpart of a channel is gone
    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),
}

/// Result type alias for event operations
pub type Result<T> = std::result::Result<T, HubError>;
