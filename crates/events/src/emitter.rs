use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::event::Event;

/// What happened to an emission, from the emitting service's point of view.
///
/// None of these outcomes is an error for the caller: the triggering write
/// has already been committed, and failed deliveries are retried internally.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryResult {
    /// Delivered on the first attempt.
    Delivered { delivery_id: Uuid },
    /// Recorded in the outbox; the delivery worker will (re)try it.
    Queued {
        delivery_id: Uuid,
        attempt: u32,
        next_attempt_at: Option<DateTime<Utc>>,
    },
    /// Parked for manual replay (permanent failure on the first attempt).
    DeadLettered { delivery_id: Uuid, reason: String },
    /// The emission could not even be recorded (outbox or serialization failure).
    Rejected { reason: String },
}

impl DeliveryResult {
    pub fn delivery_id(&self) -> Option<Uuid> {
        match self {
            DeliveryResult::Delivered { delivery_id }
            | DeliveryResult::Queued { delivery_id, .. }
            | DeliveryResult::DeadLettered { delivery_id, .. } => Some(*delivery_id),
            DeliveryResult::Rejected { .. } => None,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryResult::Delivered { .. })
    }
}

/// Turns a committed state change into an outbound notification.
///
/// Services call this strictly after their store write returned.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, topic: &str, key: &str, payload: JsonValue) -> DeliveryResult;
}

impl<T> EventEmitter for std::sync::Arc<T>
where
    T: EventEmitter + ?Sized,
{
    fn emit(&self, topic: &str, key: &str, payload: JsonValue) -> DeliveryResult {
        (**self).emit(topic, key, payload)
    }
}

/// Typed convenience over [`EventEmitter::emit`].
pub trait EmitEvent {
    fn emit_event<E: Event>(&self, key: &str, event: &E) -> DeliveryResult;
}

impl<T> EmitEvent for T
where
    T: EventEmitter + ?Sized,
{
    fn emit_event<E: Event>(&self, key: &str, event: &E) -> DeliveryResult {
        match serde_json::to_value(event) {
            Ok(payload) => self.emit(E::TOPIC, key, payload),
            Err(e) => DeliveryResult::Rejected {
                reason: format!("failed to serialize {} payload: {e}", E::TOPIC),
            },
        }
    }
}
