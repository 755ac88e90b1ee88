//! Infrastructure layer: record storage, reliable delivery, sinks and workers.

pub mod emitter;
pub mod ledger;
pub mod sinks;
pub mod workers;

pub use emitter::{
    BackoffStrategy, DeadLetterAdmin, DeadLetterEntry, Delivery, DeliveryMode, DeliveryStatus,
    DeliveryWorker, DeliveryWorkerHandle, EmitterConfig, EmitterStats, InMemoryOutbox, Outbox,
    OutboxError, OutboxStats, PendingDeliveries, ReliableEmitter, RetryPolicy, WorkerStats,
};
pub use ledger::LocalLedgerStore;
pub use sinks::{BusSink, HandlerSink, HttpCallbackSink};
pub use workers::{TopicSubscriber, WorkerHandle};
