// Applies a single decoded log entry to the destination. This is the only
// place that knows how each operation kind maps onto the driver seam; the
// worker loop (worker.rs) owns the retry/continue disposition logic that
// `DriverError`'s variants encode.

use oplogsync_base::Namespace;
use oplogsync_net::{DriverError, DriverResult, Session};

use crate::entry::{LogEntry, LogEntryKind};

pub async fn apply_entry(session: &dyn Session, entry: &LogEntry) -> DriverResult<()> {
    match &entry.kind {
        LogEntryKind::Insert { doc } => {
            let ns = namespace(&entry.ns)?;
            session
                .database(&ns.database)
                .collection(&ns.collection)
                .insert_one(doc.clone())
                .await
        }
        LogEntryKind::Update { filter, update } => {
            let ns = namespace(&entry.ns)?;
            session
                .database(&ns.database)
                .collection(&ns.collection)
                .update_one(filter.clone(), update.clone())
                .await
        }
        LogEntryKind::Delete { filter } => {
            let ns = namespace(&entry.ns)?;
            session
                .database(&ns.database)
                .collection(&ns.collection)
                .delete_one(filter.clone())
                .await
        }
        LogEntryKind::Command { body } => {
            let dbname = Namespace::database_of(&entry.ns).map_err(DriverError::WriteError)?;
            session
                .database(&dbname)
                .run_command(body.clone())
                .await
                .map(|_| ())
        }
        LogEntryKind::NoOp => Ok(()),
    }
}

fn namespace(ns: &str) -> DriverResult<Namespace> {
    Namespace::parse(ns).map_err(DriverError::WriteError)
}
