use agrochain_core::DomainResult;
use agrochain_events::{DeliveryError, EventSink, JsonEnvelope};

/// Runs a local consumer as a sink.
///
/// Lets a bus consumer sit behind a [`ReliableEmitter`](crate::ReliableEmitter)
/// so that failures it cannot recover from land in a dead-letter queue and can
/// be replayed. Retryable domain errors are transient, everything else is
/// permanent.
pub struct HandlerSink<F> {
    name: String,
    handler: F,
}

impl<F> HandlerSink<F>
where
    F: Fn(&JsonEnvelope) -> DomainResult<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

impl<F> std::fmt::Debug for HandlerSink<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerSink").field("name", &self.name).finish()
    }
}

impl<F> EventSink for HandlerSink<F>
where
    F: Fn(&JsonEnvelope) -> DomainResult<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver(&self, envelope: &JsonEnvelope) -> Result<(), DeliveryError> {
        match (self.handler)(envelope) {
            Ok(()) => Ok(()),
            Err(err) if err.is_retryable() => Err(DeliveryError::transient(err.to_string())),
            Err(err) => Err(DeliveryError::permanent(err.to_string())),
        }
    }
}
