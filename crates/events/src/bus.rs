//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus is the fan-out transport between a service's emitter and the
//! subscribers of a topic. It is intentionally lightweight:
//!
//! - **Transport-agnostic**: in-memory channels here, a broker elsewhere
//! - **At-least-once**: a message may arrive more than once; consumers must be idempotent
//! - **No persistence**: the publishing service's outbox is what survives failures
//!
//! Messages are published only after the originating write is committed, so a
//! subscriber never observes a change that could still be rolled back.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// A subscription to an event stream.
///
/// Each subscription gets a copy of every message published after it was
/// created (broadcast semantics). Subscriptions are meant to be drained by a
/// single thread.
///
/// ```ignore
/// let subscription = bus.subscribe();
/// loop {
///     match subscription.recv_timeout(Duration::from_millis(250)) {
///         Ok(envelope) => handle(envelope)?,
///         Err(RecvTimeoutError::Timeout) => continue,   // check for shutdown
///         Err(RecvTimeoutError::Disconnected) => break, // bus dropped
///     }
/// }
/// ```
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Pub/sub abstraction used by the bus sink and topic subscribers.
///
/// `publish()` can fail (poisoned lock, broker unreachable). The caller is the
/// emitter, which treats the failure as transient and retries from its outbox.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
