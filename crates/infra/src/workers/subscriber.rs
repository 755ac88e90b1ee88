use std::collections::HashSet;
use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use agrochain_core::{DomainError, DomainResult};
use agrochain_events::{EventBus, Subscription, TopicScoped};

use crate::emitter::RetryPolicy;

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    name: String,
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Bus consumer for a fixed set of topics.
///
/// - Subscribes before the thread starts, so nothing published after
///   `spawn` returns is missed
/// - Messages on other topics are skipped
/// - Retryable handler errors (`DeliveryFailure`, `Storage`) are retried in
///   place with the given policy; anything else is logged and dropped
/// - The handler must be idempotent: the bus is at-least-once
///
/// A consumer whose failures must survive goes behind a
/// [`ReliableEmitter`](crate::ReliableEmitter) with a
/// [`HandlerSink`](crate::HandlerSink), and the handler here only emits into
/// it. Exhausted failures then land in that emitter's dead-letter queue.
#[derive(Debug)]
pub struct TopicSubscriber;

impl TopicSubscriber {
    pub fn spawn<M, B, H>(
        name: impl Into<String>,
        bus: B,
        topics: &[&str],
        retry: RetryPolicy,
        handler: H,
    ) -> io::Result<WorkerHandle>
    where
        M: TopicScoped + Send + 'static,
        B: EventBus<M>,
        H: FnMut(&M) -> DomainResult<()> + Send + 'static,
    {
        let name = name.into();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub: Subscription<M> = bus.subscribe();
        let topics: HashSet<String> = topics.iter().map(|t| t.to_string()).collect();

        let worker_name = name.clone();
        let join = thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker_loop(&worker_name, sub, shutdown_rx, &topics, &retry, handler))?;

        Ok(WorkerHandle {
            name,
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop<M, H>(
    name: &str,
    sub: Subscription<M>,
    shutdown_rx: mpsc::Receiver<()>,
    topics: &HashSet<String>,
    retry: &RetryPolicy,
    mut handler: H,
) where
    M: TopicScoped,
    H: FnMut(&M) -> DomainResult<()>,
{
    let tick = Duration::from_millis(250);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(msg) => {
                if !topics.contains(msg.topic()) {
                    continue;
                }
                if let Err(err) = handle_with_retry(&mut handler, &msg, retry, &shutdown_rx) {
                    warn!(worker = name, topic = msg.topic(), error = %err, "subscriber handler failed");
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!(worker = name, "subscriber stopped");
}

fn handle_with_retry<M, H>(
    handler: &mut H,
    msg: &M,
    retry: &RetryPolicy,
    shutdown_rx: &mpsc::Receiver<()>,
) -> DomainResult<()>
where
    H: FnMut(&M) -> DomainResult<()>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match handler(msg) {
            Ok(()) => return Ok(()),
            Err(err) if err.is_retryable() && retry.should_retry(attempt) => {
                debug!(attempt, error = %err, "retrying subscriber handler");
                // A shutdown request cuts the backoff short.
                match shutdown_rx.recv_timeout(retry.delay_for_attempt(attempt)) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                        return Err(DomainError::delivery_failure(format!(
                            "shut down while retrying: {err}"
                        )));
                    }
                }
            }
            Err(err) => return Err(err),
        }
    }
}
