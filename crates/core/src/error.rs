//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// The first four variants are the platform's error taxonomy. `Storage` and
/// `InvalidId` cover local store failures and malformed identifiers; both
/// still propagate to the caller as request failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A referenced entity is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// An input violated a constraint.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested state transition is not allowed.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A notification could not be delivered (transient, retryable).
    #[error("delivery failure: {0}")]
    DeliveryFailure(String),

    /// The local store failed (lock poisoning, snapshot IO, ...).
    #[error("storage error: {0}")]
    Storage(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn delivery_failure(msg: impl Into<String>) -> Self {
        Self::DeliveryFailure(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    /// Whether retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DeliveryFailure(_) | Self::Storage(_))
    }
}
