// Decodes a raw oplog document (§3 data model) once, at ingestion, into a
// tagged variant over {Insert, Update, Delete, Command, NoOp} with a shared
// header. Everything downstream (routing, apply) matches on this instead of
// re-inspecting the raw bson each time.

use bson::{Bson, Document};
use oplogsync_base::{err, LogPosition, Result};

#[derive(Debug, Clone)]
pub enum LogEntryKind {
    Insert { doc: Document },
    Update { filter: Document, update: Document },
    Delete { filter: Document },
    Command { body: Document },
    /// Covers both the documented `n` no-op and any `op` value this build
    /// doesn't recognize -- per §7, an unknown kind is ignored and the
    /// position still advances.
    NoOp,
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub ts: LogPosition,
    pub ns: String,
    pub kind: LogEntryKind,
}

impl LogEntry {
    pub fn from_raw(doc: &Document) -> Result<LogEntry> {
        let ts = doc
            .get_timestamp("ts")
            .map_err(|_| err("oplog entry missing ts"))?;
        let ts = LogPosition::new(ts.time, ts.increment);
        let ns = doc
            .get_str("ns")
            .map_err(|_| err("oplog entry missing ns"))?
            .to_string();
        let op = doc.get_str("op").map_err(|_| err("oplog entry missing op"))?;

        let kind = match op {
            "i" => LogEntryKind::Insert {
                doc: get_doc(doc, "o")?,
            },
            "u" => LogEntryKind::Update {
                filter: get_doc(doc, "o2")?,
                update: get_doc(doc, "o")?,
            },
            "d" => LogEntryKind::Delete {
                filter: get_doc(doc, "o")?,
            },
            "c" => LogEntryKind::Command {
                body: get_doc(doc, "o")?,
            },
            "n" => LogEntryKind::NoOp,
            other => {
                tracing::warn!(target: "oplogsync", op = other, "unknown oplog entry kind, ignoring");
                LogEntryKind::NoOp
            }
        };

        Ok(LogEntry { ts, ns, kind })
    }

    /// The sharding key this entry routes on, per §3: `o._id` for
    /// insert/delete, `o2._id` for update, none for command/no-op.
    pub fn sharding_key(&self) -> Option<Bson> {
        match &self.kind {
            LogEntryKind::Insert { doc } => doc.get("_id").cloned(),
            LogEntryKind::Delete { filter } => filter.get("_id").cloned(),
            LogEntryKind::Update { filter, .. } => filter.get("_id").cloned(),
            LogEntryKind::Command { .. } | LogEntryKind::NoOp => None,
        }
    }

    pub fn is_command(&self) -> bool {
        matches!(self.kind, LogEntryKind::Command { .. })
    }

    pub fn is_noop(&self) -> bool {
        matches!(self.kind, LogEntryKind::NoOp)
    }
}

fn get_doc(doc: &Document, field: &str) -> Result<Document> {
    doc.get_document(field)
        .cloned()
        .map_err(|_| err(format!("oplog entry missing {field:?}")))
}

/// The canonical binary form a sharding key routes on: a one-field document
/// `{_id: key}`, bson-encoded. Matches the wire-level
/// `bson.Marshal(bson.M{"_id": oid})` encoding a MongoDB-compatible client
/// would use, so routing is reproducible against logs produced by either
/// side of a heterogeneous deployment.
pub fn canonical_key_bytes(key: &Bson) -> Vec<u8> {
    let mut doc = Document::new();
    doc.insert("_id", key.clone());
    bson::to_vec(&doc).expect("a Bson value always re-encodes")
}

#[cfg(test)]
mod test {
    use super::*;
    use bson::doc;

    fn ts(secs: u32, inc: u32) -> bson::Timestamp {
        bson::Timestamp { time: secs, increment: inc }
    }

    #[test]
    fn parses_insert() {
        let raw = doc! {
            "ts": ts(10, 1), "op": "i", "ns": "mydb.mycoll",
            "o": { "_id": 1, "v": 1 },
        };
        let entry = LogEntry::from_raw(&raw).unwrap();
        assert_eq!(entry.ts, LogPosition::new(10, 1));
        assert_eq!(entry.sharding_key(), Some(Bson::Int32(1)));
        assert!(matches!(entry.kind, LogEntryKind::Insert { .. }));
    }

    #[test]
    fn parses_update_sharding_key_from_o2() {
        let raw = doc! {
            "ts": ts(10, 2), "op": "u", "ns": "mydb.mycoll",
            "o": { "$set": { "v": 2 } },
            "o2": { "_id": 1 },
        };
        let entry = LogEntry::from_raw(&raw).unwrap();
        assert_eq!(entry.sharding_key(), Some(Bson::Int32(1)));
    }

    #[test]
    fn command_has_no_sharding_key() {
        let raw = doc! { "ts": ts(10, 3), "op": "c", "ns": "mydb.$cmd", "o": { "drop": "mycoll" } };
        let entry = LogEntry::from_raw(&raw).unwrap();
        assert_eq!(entry.sharding_key(), None);
        assert!(entry.is_command());
    }

    #[test]
    fn unknown_op_becomes_noop() {
        let raw = doc! { "ts": ts(10, 4), "op": "z", "ns": "mydb.mycoll", "o": {} };
        let entry = LogEntry::from_raw(&raw).unwrap();
        assert!(entry.is_noop());
    }

    #[test]
    fn canonical_bytes_depend_only_on_id() {
        let a = canonical_key_bytes(&Bson::Int32(1));
        let b = canonical_key_bytes(&Bson::Int32(1));
        let c = canonical_key_bytes(&Bson::Int32(2));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
