use crate::EventEnvelope;

/// Messages that belong to a named topic.
///
/// Subscribers use this to ignore bus traffic they are not interested in; the
/// in-memory bus broadcasts every message to every subscriber.
pub trait TopicScoped {
    fn topic(&self) -> &str;
}

impl<E> TopicScoped for EventEnvelope<E> {
    fn topic(&self) -> &str {
        EventEnvelope::topic(self)
    }
}
