//! Outbox records.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use agrochain_events::JsonEnvelope;

use super::retry::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Waiting for its first attempt or for its retry time.
    Pending,
    /// Claimed by an emitter attempt.
    InFlight,
    /// Parked after a permanent failure or an exhausted attempt budget.
    DeadLettered,
}

/// One attempt to hand an envelope to a sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub attempt: u32,
    pub at: DateTime<Utc>,
    pub error: Option<String>,
}

/// An envelope on its way to a sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub id: Uuid,
    pub envelope: JsonEnvelope,
    pub status: DeliveryStatus,
    /// Attempts made so far.
    pub attempt: u32,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub history: Vec<AttemptRecord>,
}

impl Delivery {
    pub fn new(envelope: JsonEnvelope) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            envelope,
            status: DeliveryStatus::Pending,
            attempt: 0,
            next_attempt_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
            history: Vec::new(),
        }
    }

    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.status == DeliveryStatus::Pending && self.next_attempt_at.is_none_or(|at| now >= at)
    }

    /// In flight for at least `timeout` since it was claimed.
    ///
    /// The attempt is presumed lost (a crashed or stuck worker) and the
    /// delivery may be claimed again.
    pub fn claim_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.status == DeliveryStatus::InFlight
            && now
                .signed_duration_since(self.updated_at)
                .to_std()
                .is_ok_and(|age| age >= timeout)
    }

    /// Start an attempt.
    pub fn mark_in_flight(&mut self) {
        self.status = DeliveryStatus::InFlight;
        self.attempt += 1;
        self.updated_at = Utc::now();
    }

    pub fn mark_delivered(&mut self) {
        let now = Utc::now();
        self.updated_at = now;
        self.next_attempt_at = None;
        self.history.push(AttemptRecord {
            attempt: self.attempt,
            at: now,
            error: None,
        });
    }

    /// Record a failed attempt.
    ///
    /// Schedules a retry with backoff while the policy allows it, otherwise
    /// (or when `permanent`) moves the delivery to `DeadLettered`.
    pub fn mark_failed(&mut self, error: String, permanent: bool, policy: &RetryPolicy) {
        let now = Utc::now();
        self.updated_at = now;
        self.history.push(AttemptRecord {
            attempt: self.attempt,
            at: now,
            error: Some(error.clone()),
        });
        self.last_error = Some(error);

        if !permanent && policy.should_retry(self.attempt) {
            let delay = policy.delay_for_attempt(self.attempt);
            self.next_attempt_at =
                Some(now + chrono::Duration::from_std(delay).unwrap_or_default());
            self.status = DeliveryStatus::Pending;
        } else {
            self.next_attempt_at = None;
            self.status = DeliveryStatus::DeadLettered;
        }
    }

    /// Back to pending with a fresh attempt budget.
    pub fn reset(&mut self) {
        self.status = DeliveryStatus::Pending;
        self.attempt = 0;
        self.next_attempt_at = None;
        self.last_error = None;
        self.updated_at = Utc::now();
        self.history.clear();
    }
}

/// Entry in the dead-letter queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterEntry {
    pub delivery: Delivery,
    pub dead_lettered_at: DateTime<Utc>,
    pub reason: String,
}

impl DeadLetterEntry {
    pub fn new(delivery: Delivery, reason: String) -> Self {
        Self {
            delivery,
            dead_lettered_at: Utc::now(),
            reason,
        }
    }

    pub fn id(&self) -> Uuid {
        self.delivery.id
    }
}
