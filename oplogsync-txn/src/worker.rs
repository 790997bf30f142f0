// A writer worker: a long-running consumer of a bounded queue, applying
// entries serially against one destination session it never shares with
// any other worker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use oplogsync_base::LogPosition;
use oplogsync_net::{reconnect, Driver, DriverError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::apply::apply_entry;
use crate::entry::LogEntry;

/// Queue depth ~100, matching the bound described in §3.
pub const QUEUE_CAPACITY: usize = 100;

/// The handle a dispatcher holds for one worker: a sender into its queue
/// plus the atomics it publishes progress through. Cheap to clone.
#[derive(Clone)]
pub struct WorkerHandle {
    id: usize,
    tx: mpsc::Sender<LogEntry>,
    enqueued: Arc<AtomicU64>,
    applied: Arc<AtomicU64>,
    position: Arc<AtomicU64>,
}

impl WorkerHandle {
    pub fn id(&self) -> usize {
        self.id
    }

    /// Enqueue an entry, blocking (yielding) when the queue is full. The
    /// enqueued count is incremented only after the send completes, per §4.1.
    pub async fn push(&self, entry: LogEntry) {
        // A closed receiver means the worker task has died; that should
        // never happen since workers never return, but don't panic the
        // dispatcher over it.
        if self.tx.send(entry).await.is_ok() {
            self.enqueued.fetch_add(1, Ordering::AcqRel);
        }
    }

    pub fn depth(&self) -> u64 {
        self.enqueued
            .load(Ordering::Acquire)
            .saturating_sub(self.applied.load(Ordering::Acquire))
    }

    pub fn position(&self) -> LogPosition {
        LogPosition::from_packed(self.position.load(Ordering::Acquire))
    }
}

/// Spawns one worker as a `tokio` task and returns the handle a dispatcher
/// uses to drive it. `initial_position` seeds the worker's reported
/// position before it has applied anything, so the dispatcher's aggregate
/// reads as the start position rather than zero until real progress lands.
pub fn spawn_worker(
    id: usize,
    driver: Arc<dyn Driver>,
    hostport: Arc<str>,
    connect_timeout: Duration,
    initial_position: LogPosition,
) -> WorkerHandle {
    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    let enqueued = Arc::new(AtomicU64::new(0));
    let applied = Arc::new(AtomicU64::new(0));
    let position = Arc::new(AtomicU64::new(initial_position.packed()));

    tokio::spawn(run_worker(
        id,
        rx,
        driver,
        hostport,
        connect_timeout,
        applied.clone(),
        position.clone(),
    ));

    WorkerHandle {
        id,
        tx,
        enqueued,
        applied,
        position,
    }
}

async fn run_worker(
    id: usize,
    mut rx: mpsc::Receiver<LogEntry>,
    driver: Arc<dyn Driver>,
    hostport: Arc<str>,
    connect_timeout: Duration,
    applied: Arc<AtomicU64>,
    position: Arc<AtomicU64>,
) {
    let mut session = reconnect(driver.as_ref(), &hostport, connect_timeout).await;

    while let Some(entry) = rx.recv().await {
        loop {
            match apply_entry(session.as_ref(), &entry).await {
                Ok(()) => break,
                Err(DriverError::NotFound) => {
                    debug!(target: "oplogsync", worker = id, ns = %entry.ns, ts = %entry.ts, "match not found, treating as applied");
                    break;
                }
                Err(DriverError::WriteError(e)) => {
                    info!(target: "oplogsync", worker = id, ns = %entry.ns, ts = %entry.ts, error = ?e, "driver write error, advancing anyway");
                    break;
                }
                Err(DriverError::Transport(e)) => {
                    warn!(target: "oplogsync", worker = id, error = ?e, "transport failure, reconnecting");
                    session = reconnect(driver.as_ref(), &hostport, connect_timeout).await;
                    // retry the same entry against the new session
                }
            }
        }
        applied.fetch_add(1, Ordering::AcqRel);
        position.store(entry.ts.packed(), Ordering::Release);
    }
}
