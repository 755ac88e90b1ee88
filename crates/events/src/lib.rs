//! `agrochain-events`: event propagation mechanics.
//!
//! This crate defines the messages exchanged between the services and the
//! capability traits used to deliver them:
//!
//! - [`EventEnvelope`]: the unit that travels (topic, dedup key, payload)
//! - [`EventBus`] / [`InMemoryEventBus`]: pub/sub fan-out
//! - [`EventSink`]: one delivery target (bus, HTTP endpoint, test fake)
//! - [`EventEmitter`]: what services call after a committed write
//!
//! Delivery is **at-least-once**: every consumer must treat processing as
//! idempotent, typically by deduplicating on the envelope key.

pub mod bus;
pub mod emitter;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod integration;
pub mod sink;
pub mod testing;
pub mod topic;

pub use bus::{EventBus, Subscription};
pub use emitter::{DeliveryResult, EmitEvent, EventEmitter};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use integration::{CosechaFacturada, InventarioAjustado, NuevaCosecha};
pub use sink::{DeliveryError, EventSink};
pub use topic::TopicScoped;

/// Envelope type carried by buses, sinks and outboxes.
pub type JsonEnvelope = EventEnvelope<serde_json::Value>;
