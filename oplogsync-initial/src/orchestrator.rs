// Enumerates user databases and collections on the source and copies every
// document to the destination before the oplog tail starts. This is the
// "initial bulk copy" phase; the checkpoint the tail resumes from is
// established by the caller before this runs (§4.4).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use oplogsync_base::{err, Result};
use oplogsync_net::{reconnect, Driver, DriverError};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::copier::run_copy_worker;
use crate::options::SyncOptions;

/// Bounded document queue shared by the producer and all copy workers for
/// one collection, per §4.3.
const QUEUE_CAPACITY: usize = 10_000;
const PROGRESS_SAMPLE_INTERVAL: u64 = 10_000;

/// Copies every user database (excluding `local` and `admin`) from source to
/// destination. Per-collection failures (bad index spec, a dropped
/// collection mid-copy) are logged and skipped rather than aborting the
/// whole run, matching the source implementation's database-by-database
/// resilience.
pub async fn run_initial_sync(
    src_driver: Arc<dyn Driver>,
    src_hostport: &str,
    dst_driver: Arc<dyn Driver>,
    dst_hostport: &str,
    connect_timeout: Duration,
    opts: SyncOptions,
) -> Result<()> {
    let src = reconnect(src_driver.as_ref(), src_hostport, connect_timeout).await;
    let dst_meta = reconnect(dst_driver.as_ref(), dst_hostport, connect_timeout).await;

    let dbnames = src
        .database_names()
        .await
        .map_err(|e| err(format!("listing source databases: {e}")))?;

    for dbname in dbnames {
        if dbname == "local" || dbname == "admin" {
            continue;
        }
        info!(target: "oplogsync", database = %dbname, "sync database");
        if let Err(e) = sync_database(
            src.as_ref(),
            dst_meta.as_ref(),
            dst_driver.clone(),
            dst_hostport,
            connect_timeout,
            &dbname,
            opts,
        )
        .await
        {
            warn!(target: "oplogsync", database = %dbname, error = %e, "sync database failed, continuing");
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn sync_database(
    src: &dyn oplogsync_net::Session,
    dst_meta: &dyn oplogsync_net::Session,
    dst_driver: Arc<dyn Driver>,
    dst_hostport: &str,
    connect_timeout: Duration,
    dbname: &str,
    opts: SyncOptions,
) -> Result<()> {
    let collnames = src
        .database(dbname)
        .collection_names()
        .await
        .map_err(|e| err(format!("listing collections of {dbname}: {e}")))?;

    for collname in collnames {
        if collname.starts_with("system.") {
            continue;
        }
        info!(target: "oplogsync", database = dbname, collection = %collname, "sync collection");
        if let Err(e) = sync_collection(
            src,
            dst_meta,
            dst_driver.clone(),
            dst_hostport,
            connect_timeout,
            dbname,
            &collname,
            opts,
        )
        .await
        {
            warn!(target: "oplogsync", database = dbname, collection = %collname, error = %e, "sync collection failed, continuing");
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn sync_collection(
    src: &dyn oplogsync_net::Session,
    dst_meta: &dyn oplogsync_net::Session,
    dst_driver: Arc<dyn Driver>,
    dst_hostport: &str,
    connect_timeout: Duration,
    dbname: &str,
    collname: &str,
    opts: SyncOptions,
) -> Result<()> {
    let src_coll = src.database(dbname).collection(collname);

    if !opts.ignore_index {
        let indexes = src_coll
            .list_indexes()
            .await
            .map_err(|e| err(format!("listing indexes: {e}")))?;
        let dst_coll = dst_meta.database(dbname).collection(collname);
        for spec in indexes {
            info!(target: "oplogsync", database = dbname, collection = collname, index = ?spec, "create index");
            dst_coll
                .create_index(spec)
                .await
                .map_err(|e| err(format!("creating index: {e}")))?;
        }
    }

    let total = src_coll
        .count()
        .await
        .map_err(|e| err(format!("counting documents: {e}")))?;
    if total == 0 {
        return Ok(());
    }

    let mut cursor = src_coll
        .find_snapshot()
        .await
        .map_err(|e| err(format!("opening snapshot cursor: {e}")))?;

    let (tx, rx) = tokio::sync::mpsc::channel(QUEUE_CAPACITY);
    let rx = Arc::new(Mutex::new(rx));
    let written = Arc::new(AtomicU64::new(0));
    let num_workers = opts.num_workers.max(1);
    let hostport: Arc<str> = Arc::from(dst_hostport);
    let database: Arc<str> = Arc::from(dbname);
    let collection: Arc<str> = Arc::from(collname);

    let mut workers = Vec::with_capacity(num_workers);
    for _ in 0..num_workers {
        workers.push(tokio::spawn(run_copy_worker(
            dst_driver.clone(),
            hostport.clone(),
            connect_timeout,
            database.clone(),
            collection.clone(),
            rx.clone(),
            opts,
            written.clone(),
        )));
    }

    let mut read = 0u64;
    loop {
        match cursor.next().await {
            Ok(Some(doc)) => {
                if tx.send(doc).await.is_err() {
                    break;
                }
                read += 1;
                if read % PROGRESS_SAMPLE_INTERVAL == 0 {
                    info!(target: "oplogsync", database = dbname, collection = collname, read, total, "initial sync progress");
                }
            }
            Ok(None) => break,
            Err(DriverError::Transport(e)) => {
                return Err(err(format!("snapshot cursor transport error: {e}")));
            }
            Err(e) => {
                return Err(err(format!("snapshot cursor error: {e}")));
            }
        }
    }
    // Closing the producer's sender drains the queue: once every enqueued
    // document has been received, each worker's next `recv()` sees a closed
    // channel with an empty buffer and returns, ending its loop.
    drop(tx);

    for w in workers {
        let _ = w.await;
    }

    info!(
        target: "oplogsync", database = dbname, collection = collname,
        written = written.load(Ordering::Acquire), total, "collection sync complete",
    );

    Ok(())
}
