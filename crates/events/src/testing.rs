//! In-memory fakes for the delivery capabilities.
//!
//! These are used by unit tests across the workspace and are small enough to
//! ship in the library.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde_json::Value as JsonValue;

use crate::emitter::{DeliveryResult, EventEmitter};
use crate::event::Event;
use crate::sink::{DeliveryError, EventSink};
use crate::EventEnvelope;

/// Emitter that records every emission and reports it delivered.
#[derive(Debug, Default)]
pub struct RecordingEmitter {
    emitted: Mutex<Vec<EventEnvelope<JsonValue>>>,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emitted(&self) -> Vec<EventEnvelope<JsonValue>> {
        self.emitted.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Typed payloads emitted on `E`'s topic, in emission order.
    pub fn emitted_events<E: Event>(&self) -> Vec<E> {
        self.emitted()
            .iter()
            .filter_map(|env| env.decode::<E>())
            .filter_map(Result::ok)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.emitted.lock().map(|e| e.len()).unwrap_or(0)
    }
}

impl EventEmitter for RecordingEmitter {
    fn emit(&self, topic: &str, key: &str, payload: JsonValue) -> DeliveryResult {
        let envelope = EventEnvelope::new(topic, key, payload);
        let delivery_id = envelope.event_id();
        match self.emitted.lock() {
            Ok(mut emitted) => {
                emitted.push(envelope);
                DeliveryResult::Delivered { delivery_id }
            }
            Err(_) => DeliveryResult::Rejected {
                reason: "recording emitter poisoned".to_string(),
            },
        }
    }
}

/// Sink that accepts everything and remembers what it saw.
#[derive(Debug, Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<EventEnvelope<JsonValue>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<EventEnvelope<JsonValue>> {
        self.delivered.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

impl EventSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn deliver(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), DeliveryError> {
        self.delivered
            .lock()
            .map_err(|_| DeliveryError::transient("recording sink poisoned"))?
            .push(envelope.clone());
        Ok(())
    }
}

/// Sink that replays a script of attempt outcomes, then falls back to a fixed one.
///
/// Successful attempts are recorded like [`RecordingSink`].
#[derive(Debug)]
pub struct ScriptedSink {
    script: Mutex<VecDeque<Result<(), DeliveryError>>>,
    fallback: Result<(), DeliveryError>,
    attempts: Mutex<u32>,
    delivered: RecordingSink,
}

impl ScriptedSink {
    pub fn new(
        script: impl IntoIterator<Item = Result<(), DeliveryError>>,
        fallback: Result<(), DeliveryError>,
    ) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            attempts: Mutex::new(0),
            delivered: RecordingSink::new(),
        }
    }

    /// Fail transiently `n` times, then succeed.
    pub fn failing(n: usize) -> Self {
        Self::new(
            (0..n).map(|i| Err(DeliveryError::transient(format!("attempt {} refused", i + 1)))),
            Ok(()),
        )
    }

    /// Fail transiently on every attempt.
    pub fn always_failing() -> Self {
        Self::new([], Err(DeliveryError::transient("endpoint unreachable")))
    }

    /// Reject every attempt permanently.
    pub fn rejecting() -> Self {
        Self::new([], Err(DeliveryError::permanent("404 Not Found")))
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.lock().map(|a| *a).unwrap_or(0)
    }

    pub fn delivered(&self) -> Vec<EventEnvelope<JsonValue>> {
        self.delivered.delivered()
    }
}

impl EventSink for ScriptedSink {
    fn name(&self) -> &str {
        "scripted"
    }

    fn deliver(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), DeliveryError> {
        if let Ok(mut attempts) = self.attempts.lock() {
            *attempts += 1;
        }
        let next = self
            .script
            .lock()
            .map_err(|_| DeliveryError::transient("scripted sink poisoned"))?
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match next {
            Ok(()) => self.delivered.deliver(envelope),
            Err(e) => Err(e),
        }
    }
}
