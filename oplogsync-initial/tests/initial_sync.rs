use std::sync::Arc;
use std::time::Duration;

use bson::doc;
use oplogsync_initial::{run_initial_sync, SyncOptions};
use oplogsync_net::mock::MockWorld;
use oplogsync_net::Driver;

const TIMEOUT: Duration = Duration::from_secs(1);

async fn seed(world: &MockWorld, db: &str, coll: &str, doc: bson::Document) {
    world
        .driver()
        .dial("ignored", TIMEOUT)
        .await
        .unwrap()
        .database(db)
        .collection(coll)
        .insert_one(doc)
        .await
        .unwrap();
}

#[tokio::test]
async fn copies_all_documents_with_batch_insert() {
    let src = MockWorld::new();
    let dst = MockWorld::new();

    for i in 0..5 {
        seed(&src, "mydb", "mycoll", doc! { "_id": i, "v": i }).await;
    }

    let src_driver: Arc<dyn Driver> = Arc::new(src.driver());
    let dst_driver: Arc<dyn Driver> = Arc::new(dst.driver());
    let opts = SyncOptions {
        upsert: false,
        ignore_index: true,
        num_workers: 2,
    };
    run_initial_sync(src_driver, "src", dst_driver, "dst", TIMEOUT, opts)
        .await
        .unwrap();

    let docs = dst.documents("mydb", "mycoll");
    assert_eq!(docs.len(), 5);
}

#[tokio::test]
async fn skips_local_and_admin_databases() {
    let src = MockWorld::new();
    let dst = MockWorld::new();

    seed(&src, "local", "oplog.rs", doc! { "_id": 1 }).await;
    seed(&src, "admin", "system.version", doc! { "_id": 1 }).await;
    seed(&src, "mydb", "mycoll", doc! { "_id": 1 }).await;

    let src_driver: Arc<dyn Driver> = Arc::new(src.driver());
    let dst_driver: Arc<dyn Driver> = Arc::new(dst.driver());
    let opts = SyncOptions { upsert: false, ignore_index: true, num_workers: 1 };
    run_initial_sync(src_driver, "src", dst_driver, "dst", TIMEOUT, opts)
        .await
        .unwrap();

    assert!(dst.documents("local", "oplog.rs").is_empty());
    assert_eq!(dst.documents("mydb", "mycoll").len(), 1);
}

#[tokio::test]
async fn skips_system_collections() {
    let src = MockWorld::new();
    let dst = MockWorld::new();

    seed(&src, "mydb", "system.indexes", doc! { "_id": 1 }).await;
    seed(&src, "mydb", "mycoll", doc! { "_id": 1 }).await;

    let src_driver: Arc<dyn Driver> = Arc::new(src.driver());
    let dst_driver: Arc<dyn Driver> = Arc::new(dst.driver());
    let opts = SyncOptions { upsert: false, ignore_index: true, num_workers: 1 };
    run_initial_sync(src_driver, "src", dst_driver, "dst", TIMEOUT, opts)
        .await
        .unwrap();

    assert!(dst.documents("mydb", "system.indexes").is_empty());
    assert_eq!(dst.documents("mydb", "mycoll").len(), 1);
}

#[tokio::test]
async fn upsert_mode_is_idempotent_across_two_runs() {
    let src = MockWorld::new();
    let dst = MockWorld::new();

    seed(&src, "mydb", "mycoll", doc! { "_id": 1, "v": 1 }).await;

    let opts = SyncOptions { upsert: true, ignore_index: true, num_workers: 1 };

    for _ in 0..2 {
        let src_driver: Arc<dyn Driver> = Arc::new(src.driver());
        let dst_driver: Arc<dyn Driver> = Arc::new(dst.driver());
        run_initial_sync(src_driver, "src", dst_driver, "dst", TIMEOUT, opts)
            .await
            .unwrap();
    }

    let docs = dst.documents("mydb", "mycoll");
    assert_eq!(docs.len(), 1);
}

#[tokio::test]
async fn empty_collection_is_skipped_without_error() {
    let src = MockWorld::new();
    let dst = MockWorld::new();

    src.ensure_empty_collection("mydb", "emptycoll");
    seed(&src, "mydb", "mycoll", doc! { "_id": 1 }).await;

    let src_driver: Arc<dyn Driver> = Arc::new(src.driver());
    let dst_driver: Arc<dyn Driver> = Arc::new(dst.driver());
    let opts = SyncOptions { upsert: false, ignore_index: true, num_workers: 1 };
    run_initial_sync(src_driver, "src", dst_driver, "dst", TIMEOUT, opts)
        .await
        .unwrap();

    assert!(dst.documents("mydb", "emptycoll").is_empty());
    assert_eq!(dst.documents("mydb", "mycoll").len(), 1);
}

#[tokio::test]
async fn recreates_indexes_on_destination() {
    let src = MockWorld::new();
    let dst = MockWorld::new();

    seed(&src, "mydb", "mycoll", doc! { "_id": 1 }).await;
    src.driver()
        .dial("ignored", TIMEOUT)
        .await
        .unwrap()
        .database("mydb")
        .collection("mycoll")
        .create_index(doc! { "key": { "v": 1 }, "unique": true })
        .await
        .unwrap();

    let src_driver: Arc<dyn Driver> = Arc::new(src.driver());
    let dst_driver: Arc<dyn Driver> = Arc::new(dst.driver());
    let opts = SyncOptions { upsert: false, ignore_index: false, num_workers: 1 };
    run_initial_sync(src_driver, "src", dst_driver, "dst", TIMEOUT, opts)
        .await
        .unwrap();

    let dst_indexes = dst
        .driver()
        .dial("ignored", TIMEOUT)
        .await
        .unwrap()
        .database("mydb")
        .collection("mycoll")
        .list_indexes()
        .await
        .unwrap();
    assert_eq!(dst_indexes.len(), 1);
}
