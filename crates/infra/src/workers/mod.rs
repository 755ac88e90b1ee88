//! Background consumers of bus topics.

mod subscriber;

pub use subscriber::{TopicSubscriber, WorkerHandle};
