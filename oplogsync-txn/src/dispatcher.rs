// The replay dispatcher: tails the source log, validates the start
// position, routes each entry to the correct worker, enforces the command
// barrier, and aggregates progress. This is the component §2 calls out as
// the hardest part of the system.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use oplogsync_base::{err, Error, LogPosition, Result};
use oplogsync_net::{Driver, DriverError, Session};
use tracing::{error, info, warn};

use crate::entry::{LogEntry, LogEntryKind};
use crate::worker::{spawn_worker, WorkerHandle};

pub const MAX_WORKERS: usize = 32;
const PROGRESS_SAMPLE_INTERVAL: u64 = 1000;
const BARRIER_POLL: Duration = Duration::from_millis(10);
const IDLE_POLL: Duration = Duration::from_millis(100);

/// `min(num_cpus, 32)`, at least 1 -- the default worker-pool size absent an
/// explicit override (§6 `--workers`).
pub fn default_worker_count() -> usize {
    num_cpus::get().clamp(1, MAX_WORKERS)
}

pub struct ReplayDispatcher {
    workers: Vec<WorkerHandle>,
    routed: AtomicU64,
}

impl ReplayDispatcher {
    /// Spawns `num_workers` (clamped to `[1, 32]`) workers dialing
    /// `dst_hostport`, each seeded with `start` as its initial reported
    /// position.
    pub fn new(
        driver: Arc<dyn Driver>,
        dst_hostport: &str,
        connect_timeout: Duration,
        num_workers: usize,
        start: LogPosition,
    ) -> ReplayDispatcher {
        let n = num_workers.clamp(1, MAX_WORKERS);
        let hostport: Arc<str> = Arc::from(dst_hostport);
        let workers = (0..n)
            .map(|id| spawn_worker(id, driver.clone(), hostport.clone(), connect_timeout, start))
            .collect();
        ReplayDispatcher {
            workers,
            routed: AtomicU64::new(0),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// The furthest position any worker has reported, per §4.2: this is
    /// progress visibility, not a safe resume checkpoint.
    pub fn aggregate_position(&self) -> LogPosition {
        self.workers
            .iter()
            .map(|w| w.position())
            .max()
            .unwrap_or(LogPosition::ZERO)
    }

    /// Tails the source oplog forever, dispatching entries to workers.
    /// Returns only on a fatal error (§7): configuration is already fatal
    /// before this is called, so the remaining fatal causes are stale-oplog
    /// detection and an unclassified cursor error.
    pub async fn run(
        &self,
        src_driver: Arc<dyn Driver>,
        src_hostport: &str,
        connect_timeout: Duration,
        start: LogPosition,
    ) -> Result<()> {
        let mut session = oplogsync_net::reconnect(src_driver.as_ref(), src_hostport, connect_timeout).await;
        let mut tail_from = start;

        'reconnect: loop {
            info!(target: "oplogsync", start = %tail_from, "locating oplog");
            let mut cursor = match session.tail_oplog(tail_from).await {
                Ok(c) => c,
                Err(DriverError::Transport(_)) => {
                    session =
                        oplogsync_net::reconnect(src_driver.as_ref(), src_hostport, connect_timeout).await;
                    continue 'reconnect;
                }
                Err(e) => return Err(fatal(e)),
            };

            let mut validated = tail_from.is_seconds_only();
            if validated {
                info!(target: "oplogsync", "start optime specified by user, skip verification");
            }

            loop {
                match cursor.next().await {
                    Ok(Some(doc)) => {
                        if !validated {
                            let observed = entry_position(&doc)?;
                            if observed != tail_from {
                                error!(target: "oplogsync", expected = %tail_from, observed = %observed, "oplog is stale");
                                return Err(err(format!(
                                    "oplog is stale, expected {tail_from}, current {observed}"
                                )));
                            }
                            validated = true;
                            info!(target: "oplogsync", "oplog is OK");
                            continue;
                        }

                        let entry = LogEntry::from_raw(&doc)?;
                        self.dispatch_one(entry).await;

                        let n = self.routed.fetch_add(1, Ordering::AcqRel) + 1;
                        if n % PROGRESS_SAMPLE_INTERVAL == 0 {
                            self.publish_progress(n);
                        }
                    }
                    Ok(None) => {
                        tokio::time::sleep(IDLE_POLL).await;
                    }
                    Err(DriverError::Transport(e)) => {
                        warn!(target: "oplogsync", error = ?e, "tailing oplog failed, reconnecting");
                        session = oplogsync_net::reconnect(src_driver.as_ref(), src_hostport, connect_timeout)
                            .await;
                        tail_from = self.aggregate_position();
                        continue 'reconnect;
                    }
                    Err(e) => return Err(fatal(e)),
                }
            }
        }
    }

    async fn dispatch_one(&self, entry: LogEntry) {
        match &entry.kind {
            LogEntryKind::Command { .. } => {
                self.wait_drained(None).await;
                self.workers[0].push(entry).await;
                self.wait_drained(Some(0)).await;
            }
            LogEntryKind::NoOp => {}
            _ => {
                let key = entry
                    .sharding_key()
                    .expect("data-plane entries always carry a sharding key");
                let idx = route(&key, self.workers.len());
                self.workers[idx].push(entry).await;
            }
        }
    }

    /// Spin-waits until the given worker (or, if `None`, every worker) has
    /// drained its queue. §9 notes a semaphore would replace this in a
    /// production system; the 10 ms cadence here matches the documented
    /// behavior, and the barrier is rare enough relative to data-plane
    /// traffic that the simplicity is worth more than shaving the latency.
    async fn wait_drained(&self, only: Option<usize>) {
        loop {
            let drained = match only {
                Some(id) => self.workers[id].depth() == 0,
                None => self.workers.iter().all(|w| w.depth() == 0),
            };
            if drained {
                return;
            }
            tokio::time::sleep(BARRIER_POLL).await;
        }
    }

    fn publish_progress(&self, routed: u64) {
        let aggregate = self.aggregate_position();
        let lag = aggregate.lag_seconds(SystemTime::now());
        info!(
            target: "oplogsync",
            routed,
            lag_secs = lag,
            aggregate = %aggregate,
            "replay progress",
        );
    }
}

fn entry_position(doc: &bson::Document) -> Result<LogPosition> {
    let ts = doc.get_timestamp("ts").map_err(|_| err("oplog entry missing ts"))?;
    Ok(LogPosition::new(ts.time, ts.increment))
}

fn fatal(e: DriverError) -> Error {
    err(e.to_string())
}

/// `crc32_ieee(canonical_binary({_id: key})) mod n` -- routing determinism
/// (testable property #3).
fn route(key: &bson::Bson, n: usize) -> usize {
    let bytes = crate::entry::canonical_key_bytes(key);
    (crc32fast::hash(&bytes) as usize) % n
}

#[cfg(test)]
mod test {
    use super::*;
    use bson::{doc, Bson};

    #[test]
    fn routing_is_deterministic() {
        let key = Bson::Int32(42);
        let a = route(&key, 8);
        let b = route(&key, 8);
        assert_eq!(a, b);
        assert!(a < 8);
    }

    #[test]
    fn routing_depends_on_worker_count() {
        let key = Bson::Int32(42);
        // Not a universal property, but N=1 must always be worker 0.
        assert_eq!(route(&key, 1), 0);
    }
}
