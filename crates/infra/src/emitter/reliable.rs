//! At-least-once emitter: outbox first, then sink, with retries and dead letters.

use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use agrochain_events::{DeliveryResult, EventEmitter, EventEnvelope, EventSink};

use super::delivery::{DeadLetterEntry, Delivery, DeliveryStatus};
use super::outbox::{Outbox, OutboxError, OutboxStats};
use super::retry::RetryPolicy;

/// Where the first attempt happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// First attempt on the emitting thread; retries on the worker.
    #[default]
    Inline,
    /// Every attempt on the delivery worker (blocking network sinks).
    Deferred,
}

#[derive(Debug, Clone)]
pub struct EmitterConfig {
    /// Name for logging.
    pub name: String,
    pub mode: DeliveryMode,
    pub retry: RetryPolicy,
    /// Deliveries claimed per worker pass.
    pub batch_size: usize,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            name: "emitter".to_string(),
            mode: DeliveryMode::Inline,
            retry: RetryPolicy::default(),
            batch_size: 32,
        }
    }
}

impl EmitterConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: DeliveryMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    attempts: u64,
    delivered: u64,
    retried: u64,
    dead_lettered: u64,
    replayed: u64,
    rejected: u64,
}

/// Emitter statistics snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmitterStats {
    pub name: String,
    pub sink: String,
    pub attempts: u64,
    pub delivered: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub replayed: u64,
    pub rejected: u64,
    pub outbox: OutboxStats,
}

/// Operator surface over an emitter's dead-letter queue.
pub trait DeadLetterAdmin: Send + Sync {
    fn dead_letters(&self) -> Result<Vec<DeadLetterEntry>, OutboxError>;

    /// Re-queue a dead letter with a fresh attempt budget.
    fn replay(&self, delivery_id: Uuid) -> Result<DeliveryResult, OutboxError>;

    fn discard(&self, delivery_id: Uuid) -> Result<DeadLetterEntry, OutboxError>;

    fn stats(&self) -> Result<EmitterStats, OutboxError>;
}

impl<T> DeadLetterAdmin for std::sync::Arc<T>
where
    T: DeadLetterAdmin + ?Sized,
{
    fn dead_letters(&self) -> Result<Vec<DeadLetterEntry>, OutboxError> {
        (**self).dead_letters()
    }

    fn replay(&self, delivery_id: Uuid) -> Result<DeliveryResult, OutboxError> {
        (**self).replay(delivery_id)
    }

    fn discard(&self, delivery_id: Uuid) -> Result<DeadLetterEntry, OutboxError> {
        (**self).discard(delivery_id)
    }

    fn stats(&self) -> Result<EmitterStats, OutboxError> {
        (**self).stats()
    }
}

/// Emitter with an outbox, bounded retries and a dead-letter queue.
///
/// `emit` never fails towards the caller: the triggering write has already
/// been committed. Sink failures are recorded on the delivery and retried by
/// [`deliver_ready`](Self::deliver_ready), which a
/// [`DeliveryWorker`](super::DeliveryWorker) calls in the background.
pub struct ReliableEmitter<S, O> {
    config: EmitterConfig,
    sink: S,
    outbox: O,
    counters: Mutex<Counters>,
}

impl<S: EventSink, O: Outbox> ReliableEmitter<S, O> {
    pub fn new(config: EmitterConfig, sink: S, outbox: O) -> Self {
        Self {
            config,
            sink,
            outbox,
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &EmitterConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn outbox(&self) -> &O {
        &self.outbox
    }

    /// Attempt every delivery whose retry time has come.
    ///
    /// Returns the number of deliveries attempted.
    pub fn deliver_ready(&self) -> Result<usize, OutboxError> {
        let claimed = self
            .outbox
            .claim_ready(Utc::now(), self.config.batch_size.max(1))?;
        let count = claimed.len();
        for delivery in claimed {
            self.attempt(delivery);
        }
        Ok(count)
    }

    fn count(&self, f: impl FnOnce(&mut Counters)) {
        if let Ok(mut counters) = self.counters.lock() {
            f(&mut counters);
        }
    }

    /// One attempt on an in-flight delivery.
    fn attempt(&self, mut delivery: Delivery) -> DeliveryResult {
        debug!(
            emitter = %self.config.name,
            sink = self.sink.name(),
            delivery_id = %delivery.id,
            topic = delivery.envelope.topic(),
            key = delivery.envelope.key(),
            attempt = delivery.attempt,
            "delivering"
        );
        self.count(|c| c.attempts += 1);

        match self.sink.deliver(&delivery.envelope) {
            Ok(()) => {
                delivery.mark_delivered();
                if let Err(e) = self.outbox.complete(delivery.id) {
                    error!(emitter = %self.config.name, delivery_id = %delivery.id, error = %e, "failed to acknowledge delivery");
                }
                self.count(|c| c.delivered += 1);
                DeliveryResult::Delivered {
                    delivery_id: delivery.id,
                }
            }
            Err(err) => {
                delivery.mark_failed(err.to_string(), err.is_permanent(), &self.config.retry);

                if delivery.status == DeliveryStatus::DeadLettered {
                    let reason = err.to_string();
                    warn!(
                        emitter = %self.config.name,
                        delivery_id = %delivery.id,
                        topic = delivery.envelope.topic(),
                        key = delivery.envelope.key(),
                        attempts = delivery.attempt,
                        reason = %reason,
                        "delivery dead-lettered"
                    );
                    let delivery_id = delivery.id;
                    if let Err(e) = self.outbox.dead_letter(delivery, reason.clone()) {
                        error!(emitter = %self.config.name, %delivery_id, error = %e, "failed to dead-letter delivery");
                    }
                    self.count(|c| c.dead_lettered += 1);
                    DeliveryResult::DeadLettered {
                        delivery_id,
                        reason,
                    }
                } else {
                    debug!(
                        emitter = %self.config.name,
                        delivery_id = %delivery.id,
                        attempt = delivery.attempt,
                        next_attempt_at = ?delivery.next_attempt_at,
                        error = %err,
                        "delivery failed; retry scheduled"
                    );
                    if let Err(e) = self.outbox.reschedule(&delivery) {
                        error!(emitter = %self.config.name, delivery_id = %delivery.id, error = %e, "failed to reschedule delivery");
                    }
                    self.count(|c| c.retried += 1);
                    DeliveryResult::Queued {
                        delivery_id: delivery.id,
                        attempt: delivery.attempt,
                        next_attempt_at: delivery.next_attempt_at,
                    }
                }
            }
        }
    }

    fn reject(&self, reason: String) -> DeliveryResult {
        error!(emitter = %self.config.name, reason = %reason, "emission rejected");
        self.count(|c| c.rejected += 1);
        DeliveryResult::Rejected { reason }
    }
}

impl<S: EventSink, O: Outbox> EventEmitter for ReliableEmitter<S, O> {
    fn emit(&self, topic: &str, key: &str, payload: JsonValue) -> DeliveryResult {
        let mut delivery = Delivery::new(EventEnvelope::new(topic, key, payload));

        match self.config.mode {
            DeliveryMode::Deferred => {
                let delivery_id = delivery.id;
                match self.outbox.enqueue(delivery) {
                    Ok(_) => DeliveryResult::Queued {
                        delivery_id,
                        attempt: 0,
                        next_attempt_at: None,
                    },
                    Err(e) => self.reject(format!("outbox enqueue failed: {e}")),
                }
            }
            DeliveryMode::Inline => {
                // Enqueued already in flight so the worker cannot claim it concurrently.
                delivery.mark_in_flight();
                if let Err(e) = self.outbox.enqueue(delivery.clone()) {
                    return self.reject(format!("outbox enqueue failed: {e}"));
                }
                self.attempt(delivery)
            }
        }
    }
}

impl<S: EventSink, O: Outbox> DeadLetterAdmin for ReliableEmitter<S, O> {
    fn dead_letters(&self) -> Result<Vec<DeadLetterEntry>, OutboxError> {
        self.outbox.list_dead_letters()
    }

    fn replay(&self, delivery_id: Uuid) -> Result<DeliveryResult, OutboxError> {
        let delivery = self.outbox.replay_dead_letter(delivery_id)?;
        info!(
            emitter = %self.config.name,
            %delivery_id,
            topic = delivery.envelope.topic(),
            key = delivery.envelope.key(),
            "dead letter replayed"
        );
        self.count(|c| c.replayed += 1);
        Ok(DeliveryResult::Queued {
            delivery_id,
            attempt: 0,
            next_attempt_at: None,
        })
    }

    fn discard(&self, delivery_id: Uuid) -> Result<DeadLetterEntry, OutboxError> {
        let entry = self.outbox.discard_dead_letter(delivery_id)?;
        info!(emitter = %self.config.name, %delivery_id, "dead letter discarded");
        Ok(entry)
    }

    fn stats(&self) -> Result<EmitterStats, OutboxError> {
        let outbox = self.outbox.stats()?;
        let c = self
            .counters
            .lock()
            .map(|c| *c)
            .map_err(|_| OutboxError::Storage("emitter counters poisoned".to_string()))?;
        Ok(EmitterStats {
            name: self.config.name.clone(),
            sink: self.sink.name().to_string(),
            attempts: c.attempts,
            delivered: c.delivered,
            retried: c.retried,
            dead_lettered: c.dead_lettered,
            replayed: c.replayed,
            rejected: c.rejected,
            outbox,
        })
    }
}
