//! Outbox storage for pending and dead-lettered deliveries.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::delivery::{DeadLetterEntry, Delivery, DeliveryStatus};

/// Outbox abstraction.
///
/// Deliveries are claimed oldest first. A delivered record is removed; a
/// dead-lettered one moves to a separate queue until replayed or discarded.
pub trait Outbox: Send + Sync {
    /// Record a new delivery (in any non-terminal status).
    fn enqueue(&self, delivery: Delivery) -> Result<Uuid, OutboxError>;

    /// Claim up to `limit` ready deliveries, marking each in flight.
    ///
    /// Deliveries whose in-flight claim has expired are claimed again.
    fn claim_ready(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Delivery>, OutboxError>;

    /// Store the outcome of a failed attempt that will be retried.
    fn reschedule(&self, delivery: &Delivery) -> Result<(), OutboxError>;

    /// Remove a delivered record.
    fn complete(&self, delivery_id: Uuid) -> Result<(), OutboxError>;

    /// Move a delivery to the dead-letter queue.
    fn dead_letter(&self, delivery: Delivery, reason: String)
    -> Result<DeadLetterEntry, OutboxError>;

    /// Dead letters, oldest first.
    fn list_dead_letters(&self) -> Result<Vec<DeadLetterEntry>, OutboxError>;

    /// Move a dead letter back to pending with a fresh attempt budget.
    fn replay_dead_letter(&self, delivery_id: Uuid) -> Result<Delivery, OutboxError>;

    fn discard_dead_letter(&self, delivery_id: Uuid) -> Result<DeadLetterEntry, OutboxError>;

    fn stats(&self) -> Result<OutboxStats, OutboxError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OutboxError {
    #[error("delivery not found: {0}")]
    NotFound(Uuid),
    #[error("delivery already exists: {0}")]
    AlreadyExists(Uuid),
    #[error("outbox storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxStats {
    pub pending: usize,
    pub in_flight: usize,
    pub dead_lettered: usize,
}

/// How long a claimed delivery stays in flight before it is claimed again.
const DEFAULT_CLAIM_TIMEOUT: Duration = Duration::from_secs(300);

/// In-memory outbox.
#[derive(Debug)]
pub struct InMemoryOutbox {
    deliveries: RwLock<BTreeMap<Uuid, Delivery>>,
    dead_letters: RwLock<BTreeMap<Uuid, DeadLetterEntry>>,
    claim_timeout: Duration,
}

impl Default for InMemoryOutbox {
    fn default() -> Self {
        Self {
            deliveries: RwLock::default(),
            dead_letters: RwLock::default(),
            claim_timeout: DEFAULT_CLAIM_TIMEOUT,
        }
    }
}

impl InMemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Must exceed the longest sink attempt, or a slow attempt is repeated.
    pub fn with_claim_timeout(mut self, timeout: Duration) -> Self {
        self.claim_timeout = timeout;
        self
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

fn poisoned() -> OutboxError {
    OutboxError::Storage("outbox lock poisoned".to_string())
}

impl Outbox for InMemoryOutbox {
    fn enqueue(&self, delivery: Delivery) -> Result<Uuid, OutboxError> {
        let mut deliveries = self.deliveries.write().map_err(|_| poisoned())?;
        if deliveries.contains_key(&delivery.id) {
            return Err(OutboxError::AlreadyExists(delivery.id));
        }
        let id = delivery.id;
        deliveries.insert(id, delivery);
        Ok(id)
    }

    fn claim_ready(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Delivery>, OutboxError> {
        let mut deliveries = self.deliveries.write().map_err(|_| poisoned())?;

        // v7 ids sort by creation time.
        let claimed: Vec<Delivery> = deliveries
            .values_mut()
            .filter(|d| d.is_ready(now) || d.claim_expired(now, self.claim_timeout))
            .take(limit)
            .map(|d| {
                d.mark_in_flight();
                d.clone()
            })
            .collect();

        Ok(claimed)
    }

    fn reschedule(&self, delivery: &Delivery) -> Result<(), OutboxError> {
        let mut deliveries = self.deliveries.write().map_err(|_| poisoned())?;
        let slot = deliveries
            .get_mut(&delivery.id)
            .ok_or(OutboxError::NotFound(delivery.id))?;
        *slot = delivery.clone();
        Ok(())
    }

    fn complete(&self, delivery_id: Uuid) -> Result<(), OutboxError> {
        let mut deliveries = self.deliveries.write().map_err(|_| poisoned())?;
        deliveries
            .remove(&delivery_id)
            .map(|_| ())
            .ok_or(OutboxError::NotFound(delivery_id))
    }

    fn dead_letter(
        &self,
        mut delivery: Delivery,
        reason: String,
    ) -> Result<DeadLetterEntry, OutboxError> {
        let mut deliveries = self.deliveries.write().map_err(|_| poisoned())?;
        let mut dead_letters = self.dead_letters.write().map_err(|_| poisoned())?;

        deliveries.remove(&delivery.id);
        delivery.status = DeliveryStatus::DeadLettered;
        let entry = DeadLetterEntry::new(delivery, reason);
        dead_letters.insert(entry.id(), entry.clone());
        Ok(entry)
    }

    fn list_dead_letters(&self) -> Result<Vec<DeadLetterEntry>, OutboxError> {
        let dead_letters = self.dead_letters.read().map_err(|_| poisoned())?;
        let mut result: Vec<_> = dead_letters.values().cloned().collect();
        result.sort_by_key(|e| e.dead_lettered_at);
        Ok(result)
    }

    fn replay_dead_letter(&self, delivery_id: Uuid) -> Result<Delivery, OutboxError> {
        let mut deliveries = self.deliveries.write().map_err(|_| poisoned())?;
        let mut dead_letters = self.dead_letters.write().map_err(|_| poisoned())?;

        let entry = dead_letters
            .remove(&delivery_id)
            .ok_or(OutboxError::NotFound(delivery_id))?;

        let mut delivery = entry.delivery;
        delivery.reset();
        deliveries.insert(delivery.id, delivery.clone());
        Ok(delivery)
    }

    fn discard_dead_letter(&self, delivery_id: Uuid) -> Result<DeadLetterEntry, OutboxError> {
        let mut dead_letters = self.dead_letters.write().map_err(|_| poisoned())?;
        dead_letters
            .remove(&delivery_id)
            .ok_or(OutboxError::NotFound(delivery_id))
    }

    fn stats(&self) -> Result<OutboxStats, OutboxError> {
        let deliveries = self.deliveries.read().map_err(|_| poisoned())?;
        let dead_letters = self.dead_letters.read().map_err(|_| poisoned())?;

        let mut stats = OutboxStats {
            dead_lettered: dead_letters.len(),
            ..OutboxStats::default()
        };
        for delivery in deliveries.values() {
            match delivery.status {
                DeliveryStatus::Pending => stats.pending += 1,
                DeliveryStatus::InFlight => stats.in_flight += 1,
                DeliveryStatus::DeadLettered => stats.dead_lettered += 1,
            }
        }
        Ok(stats)
    }
}

impl<O> Outbox for Arc<O>
where
    O: Outbox + ?Sized,
{
    fn enqueue(&self, delivery: Delivery) -> Result<Uuid, OutboxError> {
        (**self).enqueue(delivery)
    }

    fn claim_ready(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Delivery>, OutboxError> {
        (**self).claim_ready(now, limit)
    }

    fn reschedule(&self, delivery: &Delivery) -> Result<(), OutboxError> {
        (**self).reschedule(delivery)
    }

    fn complete(&self, delivery_id: Uuid) -> Result<(), OutboxError> {
        (**self).complete(delivery_id)
    }

    fn dead_letter(
        &self,
        delivery: Delivery,
        reason: String,
    ) -> Result<DeadLetterEntry, OutboxError> {
        (**self).dead_letter(delivery, reason)
    }

    fn list_dead_letters(&self) -> Result<Vec<DeadLetterEntry>, OutboxError> {
        (**self).list_dead_letters()
    }

    fn replay_dead_letter(&self, delivery_id: Uuid) -> Result<Delivery, OutboxError> {
        (**self).replay_dead_letter(delivery_id)
    }

    fn discard_dead_letter(&self, delivery_id: Uuid) -> Result<DeadLetterEntry, OutboxError> {
        (**self).discard_dead_letter(delivery_id)
    }

    fn stats(&self) -> Result<OutboxStats, OutboxError> {
        (**self).stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrochain_events::EventEnvelope;

    fn delivery(key: &str) -> Delivery {
        Delivery::new(EventEnvelope::new("t", key, serde_json::json!({})))
    }

    #[test]
    fn claims_oldest_first_and_marks_in_flight() {
        let outbox = InMemoryOutbox::new();
        let first = outbox.enqueue(delivery("a")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        outbox.enqueue(delivery("b")).unwrap();

        let claimed = outbox.claim_ready(Utc::now(), 1).unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, first);
        assert_eq!(claimed[0].status, DeliveryStatus::InFlight);
        assert_eq!(claimed[0].attempt, 1);

        let stats = outbox.stats().unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.in_flight, 1);
    }

    #[test]
    fn in_flight_deliveries_are_not_claimed_twice() {
        let outbox = InMemoryOutbox::new();
        outbox.enqueue(delivery("a")).unwrap();

        assert_eq!(outbox.claim_ready(Utc::now(), 10).unwrap().len(), 1);
        assert!(outbox.claim_ready(Utc::now(), 10).unwrap().is_empty());
    }

    #[test]
    fn expired_claims_are_claimed_again() {
        let outbox = InMemoryOutbox::new().with_claim_timeout(std::time::Duration::from_secs(30));
        let id = outbox.enqueue(delivery("a")).unwrap();
        assert_eq!(outbox.claim_ready(Utc::now(), 10).unwrap().len(), 1);

        assert!(outbox.claim_ready(Utc::now(), 10).unwrap().is_empty());
        let later = Utc::now() + chrono::Duration::seconds(31);
        let reclaimed = outbox.claim_ready(later, 10).unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].id, id);
        assert_eq!(reclaimed[0].attempt, 2);
        assert_eq!(outbox.stats().unwrap().in_flight, 1);
    }

    #[test]
    fn complete_removes_the_delivery() {
        let outbox = InMemoryOutbox::new();
        let id = outbox.enqueue(delivery("a")).unwrap();
        outbox.complete(id).unwrap();

        assert_eq!(outbox.stats().unwrap(), OutboxStats::default());
        assert_eq!(outbox.complete(id), Err(OutboxError::NotFound(id)));
    }

    #[test]
    fn dead_letter_replay_and_discard() {
        let outbox = InMemoryOutbox::new();
        let id = outbox.enqueue(delivery("a")).unwrap();
        let claimed = outbox.claim_ready(Utc::now(), 1).unwrap().remove(0);

        outbox.dead_letter(claimed, "rejected".into()).unwrap();
        let letters = outbox.list_dead_letters().unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].reason, "rejected");
        assert!(outbox.claim_ready(Utc::now(), 10).unwrap().is_empty());

        let replayed = outbox.replay_dead_letter(id).unwrap();
        assert_eq!(replayed.attempt, 0);
        assert_eq!(outbox.claim_ready(Utc::now(), 10).unwrap().len(), 1);

        assert_eq!(outbox.discard_dead_letter(id).unwrap_err(), OutboxError::NotFound(id));
    }

    #[test]
    fn duplicate_enqueue_is_rejected() {
        let outbox = InMemoryOutbox::new();
        let d = delivery("a");
        outbox.enqueue(d.clone()).unwrap();
        assert_eq!(outbox.enqueue(d.clone()), Err(OutboxError::AlreadyExists(d.id)));
    }
}
