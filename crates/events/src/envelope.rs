use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::event::Event;

/// Envelope for an emitted event.
///
/// Notes:
/// - `event_id` identifies one emission; redeliveries of the same emission keep it.
/// - `key` is a causally-derived dedup key (e.g. `"<harvestId>:REGISTERED"`);
///   two emissions describing the same state change share it.
/// - `payload` is the flat JSON object consumers see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    topic: String,
    key: String,
    occurred_at: DateTime<Utc>,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(topic: impl Into<String>, key: impl Into<String>, payload: E) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            topic: topic.into(),
            key: key.into(),
            occurred_at: Utc::now(),
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl EventEnvelope<JsonValue> {
    /// Serialize a typed event into a JSON envelope on its own topic.
    pub fn from_event<E: Event>(key: impl Into<String>, event: &E) -> serde_json::Result<Self> {
        Ok(Self::new(E::TOPIC, key, serde_json::to_value(event)?))
    }

    /// Decode the payload as `E`, or `None` if the envelope is on another topic.
    pub fn decode<E: Event>(&self) -> Option<serde_json::Result<E>> {
        if self.topic != E::TOPIC {
            return None;
        }
        Some(serde_json::from_value(self.payload.clone()))
    }
}
