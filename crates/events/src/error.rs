use thiserror::Error;

/// Errors raised by a bus transport.
#[derive(Debug, Clone, Error)]
pub enum BusError {
    /// The bus has been closed and accepts no more traffic.
    #[error("bus connection is closed")]
    Closed,

    /// The underlying transport reported a failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors that can occur when creating, publishing or decoding events.
#[derive(Debug, Error)]
pub enum EventError {
    /// No registry entry exists for the event name.
    #[error("unregistered event: {0}")]
    UnregisteredEvent(String),

    /// The registered validator rejected the payload.
    #[error("invalid payload for event: {0}")]
    InvalidPayload(String),

    /// Publishing was attempted without a bus handle.
    #[error("no bus connection")]
    NoConnection,

    /// The registry entry has no transport subject.
    #[error("subject not configured for event: {0}")]
    SubjectNotConfigured(String),

    /// The delivery does not carry a well-formed envelope or payload.
    #[error("malformed event: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The event is well-formed but this consumer does not handle it.
    #[error("unexpected event for this consumer: {0}")]
    UnexpectedEvent(String),

    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Classifies an error as transient (redeliver the message) or permanent
/// (acknowledge and drop it).
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for BusError {
    fn is_retryable(&self) -> bool {
        true
    }
}

impl Retryable for EventError {
    fn is_retryable(&self) -> bool {
        matches!(self, EventError::NoConnection | EventError::Bus(_))
    }
}

/// Result type for event operations.
pub type Result<T> = std::result::Result<T, EventError>;
