// The synchronizer facade (§4.4): opens sessions, establishes the start
// position, runs initial sync unless oplog-only mode is requested, then
// hands off to the replay dispatcher for the remainder of the process's
// life. Parameterized over the driver seam so tests can substitute the
// in-memory fake for both source and destination.

use std::sync::Arc;
use std::time::Duration;

use oplogsync_base::{err, LogPosition, Result};
use oplogsync_net::Driver;
use oplogsync_ui::Cli;
use tracing::info;

/// The connect timeout applies only to the initial dial of a new session;
/// long-lived sessions disable socket/sync/cursor timeouts so an idle tail
/// or a slow oplog seek never trips them (§5).
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Runs the full replication process against the given driver for both
/// endpoints. Returns only on a fatal error; a daemon that completes
/// normally still ends by returning `Ok(())` only if the oplog tail itself
/// returns, which in production never happens (§6: process exit code 0
/// never occurs).
pub async fn run(cli: &Cli, src_driver: Arc<dyn Driver>, dst_driver: Arc<dyn Driver>) -> Result<()> {
    let num_workers = cli.workers.unwrap_or_else(oplogsync_txn::default_worker_count);

    info!(
        target: "oplogsync",
        from = %cli.from, to = %cli.to, oplog_only = cli.oplog,
        upsert = cli.upsert, ignore_index = cli.ignore_index, workers = num_workers,
        "starting",
    );

    let src_session = src_driver
        .dial(&cli.from, CONNECT_TIMEOUT)
        .await
        .map_err(|e| err(format!("connecting to source {}: {e}", cli.from)))?;
    info!(target: "oplogsync", hostport = %cli.from, "connected");

    dst_driver
        .dial(&cli.to, CONNECT_TIMEOUT)
        .await
        .map_err(|e| err(format!("connecting to destination {}: {e}", cli.to)))?;
    info!(target: "oplogsync", hostport = %cli.to, "connected");

    let start = match cli.start_optime {
        Some(secs) => LogPosition::from_seconds(secs),
        None => src_session
            .primary_optime()
            .await
            .map_err(|e| err(format!("determining start position: {e}")))?,
    };
    info!(target: "oplogsync", start = %start, "start position resolved");

    if !cli.oplog {
        let opts = oplogsync_initial::SyncOptions {
            upsert: cli.upsert,
            ignore_index: cli.ignore_index,
            num_workers,
        };
        oplogsync_initial::run_initial_sync(
            src_driver.clone(),
            &cli.from,
            dst_driver.clone(),
            &cli.to,
            CONNECT_TIMEOUT,
            opts,
        )
        .await?;
    }

    let dispatcher =
        oplogsync_txn::ReplayDispatcher::new(dst_driver, &cli.to, CONNECT_TIMEOUT, num_workers, start);
    dispatcher.run(src_driver, &cli.from, CONNECT_TIMEOUT, start).await
}

#[cfg(test)]
mod test {
    use super::*;
    use bson::doc;
    use clap::Parser;
    use oplogsync_net::mock::MockWorld;

    #[tokio::test(start_paused = true)]
    async fn oplog_only_skips_initial_sync_and_replays() {
        let src = MockWorld::new();
        let dst = MockWorld::new();

        src.push_oplog_entry(doc! {
            "ts": bson::Timestamp { time: 100, increment: 1 },
            "op": "i", "ns": "mydb.mycoll", "o": { "_id": 1 },
        });

        let cli = oplogsync_ui::Cli::try_parse_from([
            "oplogsync",
            "--from",
            "src:27017",
            "--to",
            "dst:27017",
            "--oplog",
            "--start-optime",
            "100",
            "--workers",
            "1",
        ])
        .unwrap();

        let src_driver: Arc<dyn Driver> = Arc::new(src.driver());
        let dst_driver: Arc<dyn Driver> = Arc::new(dst.driver());

        let handle = tokio::spawn(async move { run(&cli, src_driver, dst_driver).await });

        for _ in 0..200 {
            if !dst.documents("mydb", "mycoll").is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(dst.documents("mydb", "mycoll").len(), 1);
        handle.abort();
    }
}
