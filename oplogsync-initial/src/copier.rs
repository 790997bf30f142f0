// One document-copy worker: consumes a shared bounded queue of documents
// read from a source collection's snapshot cursor and writes them to the
// destination, either batched (fresh destination) or upserted (resume /
// top-off over an existing one). Every worker for a collection shares one
// receiver behind a mutex -- the queue is the producer's backpressure
// mechanism, not a partition key, so there is no reason to give each worker
// its own channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bson::Document;
use oplogsync_net::{reconnect, Driver};
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use crate::options::SyncOptions;

/// Matches the batch-insert group size (§4.3): a fresh destination prefers
/// raw batch insert for throughput, surfacing duplicate keys as an error
/// rather than silently upserting over them.
const BATCH_SIZE: usize = 1_000;

pub type SharedReceiver = Arc<Mutex<mpsc::Receiver<Document>>>;

async fn next_document(rx: &SharedReceiver) -> Option<Document> {
    rx.lock().await.recv().await
}

#[allow(clippy::too_many_arguments)]
pub async fn run_copy_worker(
    driver: Arc<dyn Driver>,
    hostport: Arc<str>,
    connect_timeout: Duration,
    database: Arc<str>,
    collection: Arc<str>,
    rx: SharedReceiver,
    opts: SyncOptions,
    written: Arc<AtomicU64>,
) {
    let session = reconnect(driver.as_ref(), &hostport, connect_timeout).await;
    let coll = session.database(&database).collection(&collection);

    if opts.upsert {
        while let Some(doc) = next_document(&rx).await {
            let id = doc.get("_id").cloned().unwrap_or(bson::Bson::Null);
            if let Err(e) = coll.upsert_by_id(id, doc).await {
                warn!(target: "oplogsync", database = %database, collection = %collection, error = %e, "write document failed");
            }
            written.fetch_add(1, Ordering::AcqRel);
        }
        return;
    }

    let mut batch = Vec::with_capacity(BATCH_SIZE);
    while let Some(doc) = next_document(&rx).await {
        batch.push(doc);
        if batch.len() == BATCH_SIZE {
            flush_batch(coll.as_ref(), std::mem::take(&mut batch), &database, &collection).await;
            written.fetch_add(BATCH_SIZE as u64, Ordering::AcqRel);
        }
    }
    // Flush a partial trailing batch as singleton inserts, per §4.3.
    let remaining = batch.len() as u64;
    for doc in batch {
        if let Err(e) = coll.insert_one(doc).await {
            warn!(target: "oplogsync", database = %database, collection = %collection, error = %e, "write document failed");
        }
    }
    written.fetch_add(remaining, Ordering::AcqRel);
}

async fn flush_batch(
    coll: &dyn oplogsync_net::Collection,
    batch: Vec<Document>,
    database: &str,
    collection: &str,
) {
    if let Err(e) = coll.insert_many(batch).await {
        warn!(target: "oplogsync", database, collection, error = %e, "batch insert failed");
    }
}
