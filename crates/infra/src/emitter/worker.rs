//! Background delivery worker.

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{error, info};

use agrochain_events::EventSink;

use super::outbox::{Outbox, OutboxError};
use super::reliable::ReliableEmitter;

/// Something holding deliveries that are due.
pub trait PendingDeliveries: Send + Sync {
    fn name(&self) -> &str;

    /// Attempt everything that is due, returning how many were attempted.
    fn deliver_ready(&self) -> Result<usize, OutboxError>;
}

impl<S: EventSink, O: Outbox> PendingDeliveries for ReliableEmitter<S, O> {
    fn name(&self) -> &str {
        ReliableEmitter::name(self)
    }

    fn deliver_ready(&self) -> Result<usize, OutboxError> {
        ReliableEmitter::deliver_ready(self)
    }
}

impl<P: PendingDeliveries + ?Sized> PendingDeliveries for Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn deliver_ready(&self) -> Result<usize, OutboxError> {
        (**self).deliver_ready()
    }
}

/// Worker runtime statistics.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStats {
    pub passes: u64,
    pub attempted: u64,
    pub errors: u64,
    pub uptime_secs: u64,
}

/// Handle to a running delivery worker.
#[derive(Debug)]
pub struct DeliveryWorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl DeliveryWorkerHandle {
    /// Stop the worker and wait for its current pass to finish.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Polls an emitter's outbox and (re)attempts due deliveries.
pub struct DeliveryWorker;

impl DeliveryWorker {
    pub fn spawn<P>(pending: P, poll_interval: Duration) -> io::Result<DeliveryWorkerHandle>
    where
        P: PendingDeliveries + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(WorkerStats::default()));
        let worker_stats = stats.clone();

        let join = thread::Builder::new()
            .name(format!("delivery-{}", pending.name()))
            .spawn(move || worker_loop(pending, poll_interval, shutdown_rx, worker_stats))?;

        Ok(DeliveryWorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }
}

fn worker_loop<P: PendingDeliveries>(
    pending: P,
    poll_interval: Duration,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<WorkerStats>>,
) {
    info!(worker = pending.name(), "delivery worker started");
    let started = Instant::now();

    loop {
        let attempted = match pending.deliver_ready() {
            Ok(n) => n,
            Err(e) => {
                error!(worker = pending.name(), error = %e, "failed to claim deliveries");
                if let Ok(mut s) = stats.lock() {
                    s.errors += 1;
                }
                0
            }
        };

        if let Ok(mut s) = stats.lock() {
            s.passes += 1;
            s.attempted += attempted as u64;
            s.uptime_secs = started.elapsed().as_secs();
        }

        // Keep draining while there is work; otherwise sleep until the next poll.
        let wait = if attempted > 0 {
            Duration::ZERO
        } else {
            poll_interval
        };
        match shutdown_rx.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    info!(worker = pending.name(), "delivery worker stopped");
}
