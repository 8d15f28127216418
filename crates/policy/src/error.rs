use thiserror::Error;

/// Errors raised by the policy cache and the enforcer.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The resource type is not handled by this service's cache.
    #[error("unsupported resource type: {0}")]
    UnsupportedRtype(String),

    /// The subject has no resident cache entry to patch.
    #[error("subject not cached: {0}")]
    SubNotCached(String),

    /// A policy string is not in `sub:rtype:act:rid` form.
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    /// The caller lacks the grant required for the operation.
    #[error("insufficient permission")]
    InsufficientPermission,

    /// The authorization service could not be queried.
    #[error("policy source unavailable: {0}")]
    Upstream(String),

    #[error("policy source request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl PolicyError {
    /// Cache-consistency outcomes that mean "nothing to do" rather than
    /// failure.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            PolicyError::UnsupportedRtype(_) | PolicyError::SubNotCached(_)
        )
    }

    /// Failures worth retrying later.
    pub fn is_transient(&self) -> bool {
        matches!(self, PolicyError::Upstream(_) | PolicyError::Http(_))
    }
}

/// Result type for policy operations.
pub type Result<T> = std::result::Result<T, PolicyError>;
