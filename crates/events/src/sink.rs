use serde_json::Value as JsonValue;
use thiserror::Error;

use agrochain_core::DomainError;

use crate::EventEnvelope;

/// Why a single delivery attempt failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Network error, timeout, 5xx, unavailable bus: worth retrying.
    #[error("transient delivery failure: {0}")]
    Transient(String),

    /// The receiver refused the message (e.g. 4xx); retrying cannot help.
    #[error("delivery rejected: {0}")]
    Permanent(String),
}

impl DeliveryError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }
}

impl From<DeliveryError> for DomainError {
    fn from(value: DeliveryError) -> Self {
        DomainError::delivery_failure(value.to_string())
    }
}

/// Capability to deliver one envelope to its destination.
///
/// A sink is either a fan-out to zero or more subscribers (bus) or a single
/// external endpoint (HTTP callback). Sinks perform exactly one attempt per
/// call; retries and dead-lettering belong to the emitter.
pub trait EventSink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn deliver(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), DeliveryError>;
}

impl<S> EventSink for std::sync::Arc<S>
where
    S: EventSink + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn deliver(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), DeliveryError> {
        (**self).deliver(envelope)
    }
}
