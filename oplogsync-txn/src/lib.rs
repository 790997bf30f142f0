mod apply;
mod dispatcher;
mod entry;
mod worker;

pub use apply::apply_entry;
pub use dispatcher::{default_worker_count, ReplayDispatcher, MAX_WORKERS};
pub use entry::{canonical_key_bytes, LogEntry, LogEntryKind};
pub use worker::{spawn_worker, WorkerHandle, QUEUE_CAPACITY};
