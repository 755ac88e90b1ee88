use agrochain_events::{DeliveryError, EventBus, EventSink, JsonEnvelope};

/// Fan-out to every bus subscriber.
///
/// Publishing with no subscribers counts as delivered; a failed publish is
/// transient.
#[derive(Debug, Clone)]
pub struct BusSink<B> {
    bus: B,
}

impl<B> BusSink<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<B> EventSink for BusSink<B>
where
    B: EventBus<JsonEnvelope>,
{
    fn name(&self) -> &str {
        "bus"
    }

    fn deliver(&self, envelope: &JsonEnvelope) -> Result<(), DeliveryError> {
        self.bus
            .publish(envelope.clone())
            .map_err(|e| DeliveryError::transient(format!("bus publish failed: {e:?}")))
    }
}
