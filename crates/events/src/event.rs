use serde::Serialize;
use serde::de::DeserializeOwned;

/// A typed integration event.
///
/// Events are **immutable** facts about a committed state change. Each event
/// type is bound to exactly one topic; its JSON form is the flat payload other
/// services receive.
pub trait Event:
    Clone + core::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Topic name on the bus (e.g. `"nueva_cosecha"`).
    const TOPIC: &'static str;

    fn topic(&self) -> &'static str {
        Self::TOPIC
    }
}
