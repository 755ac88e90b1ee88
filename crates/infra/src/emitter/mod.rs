//! Reliable event emission.
//!
//! A [`ReliableEmitter`] records each emission in an [`Outbox`], hands it to
//! an [`EventSink`](agrochain_events::EventSink), and on failure retries with
//! bounded backoff ([`RetryPolicy`]) until the attempt budget is spent, after
//! which the delivery is dead-lettered. A [`DeliveryWorker`] drives retries in
//! the background; [`DeadLetterAdmin`] exposes the dead-letter queue.

mod delivery;
mod outbox;
mod reliable;
mod retry;
mod worker;

pub use delivery::{AttemptRecord, DeadLetterEntry, Delivery, DeliveryStatus};
pub use outbox::{InMemoryOutbox, Outbox, OutboxError, OutboxStats};
pub use reliable::{DeadLetterAdmin, DeliveryMode, EmitterConfig, EmitterStats, ReliableEmitter};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use worker::{DeliveryWorker, DeliveryWorkerHandle, PendingDeliveries, WorkerStats};
