// The driver seam. Production code above this module talks only to these
// traits; `mongo.rs` is the one place that knows about the `mongodb` crate.
// This mirrors the distilled spec's "external collaborator" interfaces in
// §6, just expressed as Rust traits instead of prose.

use std::time::Duration;

use async_trait::async_trait;
use bson::{Bson, Document};
use oplogsync_base::LogPosition;

/// The bucket a driver-level failure falls into, per the error taxonomy.
/// Distinct from [`oplogsync_base::Error`]: that type represents *how* an
/// error is carried (message + backtrace); this represents *what the
/// worker/dispatcher should do about it*.
#[derive(Debug)]
pub enum DriverError {
    /// The match key for an update/delete found nothing. Idempotent: the
    /// destination is already in the desired post-state.
    NotFound,
    /// A write was attempted and rejected by the destination (duplicate
    /// key, write conflict, failed command, ...). The source log is
    /// authoritative, so this is logged and treated as applied.
    WriteError(oplogsync_base::Error),
    /// The session or connection is unusable ("EOF" or an unclassified I/O
    /// failure). The caller must reconnect and retry the same operation.
    Transport(oplogsync_base::Error),
}

impl std::fmt::Display for DriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverError::NotFound => write!(f, "not found"),
            DriverError::WriteError(e) => write!(f, "write error: {e:?}"),
            DriverError::Transport(e) => write!(f, "transport error: {e:?}"),
        }
    }
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// A cursor over the destination's copy of a source collection, used during
/// initial sync. Visits every document present at the moment the cursor was
/// opened exactly once ("snapshot").
#[async_trait]
pub trait DocumentCursor: Send {
    async fn next(&mut self) -> DriverResult<Option<Document>>;
}

/// A tailable cursor over the source oplog. `next()` returns `Ok(None)` both
/// when the tail is merely idle (no error, nothing new yet) and is
/// distinguished from a hard failure by the `Err` variant.
#[async_trait]
pub trait TailableCursor: Send {
    async fn next(&mut self) -> DriverResult<Option<Document>>;
}

/// A single collection handle, exclusively owned by whichever worker (or
/// the initial-sync producer) dialed it.
#[async_trait]
pub trait Collection: Send + Sync {
    async fn insert_one(&self, doc: Document) -> DriverResult<()>;

    /// Applies `update` to the document matched by `filter`. `update` is
    /// either a modifier document (e.g. containing `$set`) or a full
    /// document meant to replace the match in place -- both forms appear in
    /// a source oplog, depending on whether the original write was itself a
    /// modifier update or a replacement-style `update`/`save()`.
    /// `DriverError::NotFound` when nothing matched.
    async fn update_one(&self, filter: Document, update: Document) -> DriverResult<()>;

    async fn delete_one(&self, filter: Document) -> DriverResult<()>;

    async fn upsert_by_id(&self, id: Bson, doc: Document) -> DriverResult<()>;

    /// Batch insert for initial sync. Partial failure (e.g. one duplicate
    /// key in the middle of the batch) is a `WriteError`; callers that want
    /// per-document granularity should fall back to singleton inserts.
    async fn insert_many(&self, docs: Vec<Document>) -> DriverResult<()>;

    async fn list_indexes(&self) -> DriverResult<Vec<Document>>;

    async fn create_index(&self, spec: Document) -> DriverResult<()>;

    async fn count(&self) -> DriverResult<u64>;

    async fn find_snapshot(&self) -> DriverResult<Box<dyn DocumentCursor>>;
}

/// A database handle: command execution and collection lookup.
#[async_trait]
pub trait Database: Send + Sync {
    fn collection(&self, name: &str) -> Box<dyn Collection>;

    async fn run_command(&self, cmd: Document) -> DriverResult<Document>;

    async fn collection_names(&self) -> DriverResult<Vec<String>>;
}

/// A live connection to one server (source or destination). Reconnects
/// allocate a brand new `Session`; the old one is simply dropped.
#[async_trait]
pub trait Session: Send + Sync {
    fn database(&self, name: &str) -> Box<dyn Database>;

    async fn database_names(&self) -> DriverResult<Vec<String>>;

    /// Open a tailable cursor over the oplog, filtered to entries with
    /// `ts >= start`.
    async fn tail_oplog(&self, start: LogPosition) -> DriverResult<Box<dyn TailableCursor>>;

    /// The current primary's log position, via `replSetGetStatus`.
    async fn primary_optime(&self) -> DriverResult<LogPosition>;
}

/// Dials a new session. Implemented once for the real `mongodb` driver
/// (`mongo::MongoDriver`) and once for tests (`mock::MockDriver`, behind the
/// `mock` feature).
#[async_trait]
pub trait Driver: Send + Sync {
    async fn dial(&self, hostport: &str, connect_timeout: Duration) -> DriverResult<Box<dyn Session>>;
}
