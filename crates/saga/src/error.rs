//! Saga error types.

use events::{EventError, Retryable};
use policy::PolicyError;
use thiserror::Error;

/// Errors raised by the saga participants.
///
/// Business outcomes that have a compensating event (out of stock,
/// insufficient balance) are not errors; repositories report them as typed
/// outcomes instead.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Authorization failure or policy lookup failure.
    #[error("Authorization error: {0}")]
    Policy(#[from] PolicyError),

    /// The request is malformed.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The request conflicts with existing state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The backing store could not be reached.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Creating or publishing an event failed.
    #[error("Event error: {0}")]
    Event(#[from] EventError),
}

impl SagaError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        SagaError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// True when the caller lacks a required grant.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, SagaError::Policy(PolicyError::InsufficientPermission))
    }
}

impl Retryable for SagaError {
    fn is_retryable(&self) -> bool {
        match self {
            SagaError::StoreUnavailable(_) => true,
            SagaError::Event(e) => e.is_retryable(),
            SagaError::Policy(e) => e.is_transient(),
            SagaError::Validation(_) | SagaError::Conflict(_) | SagaError::NotFound { .. } => false,
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

#[cfg(test)]
mod tests {
    use super::*;
    use events::BusError;

    #[test]
    fn infrastructure_failures_are_retryable() {
        assert!(SagaError::StoreUnavailable("db".into()).is_retryable());
        assert!(SagaError::Event(EventError::Bus(BusError::Closed)).is_retryable());
        assert!(SagaError::Policy(PolicyError::Upstream("authz".into())).is_retryable());
    }

    #[test]
    fn business_and_schema_failures_are_not() {
        assert!(!SagaError::not_found("Order", "x").is_retryable());
        assert!(!SagaError::Validation("qty".into()).is_retryable());
        assert!(!SagaError::Event(EventError::InvalidPayload("x".into())).is_retryable());
        assert!(!SagaError::Policy(PolicyError::InsufficientPermission).is_retryable());
    }

    #[test]
    fn permission_denied_detection() {
        assert!(SagaError::Policy(PolicyError::InsufficientPermission).is_permission_denied());
        assert!(!SagaError::Validation("x".into()).is_permission_denied());
    }
}
