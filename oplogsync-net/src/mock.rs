// An in-memory fake of the driver seam, used to exercise the worker pool,
// replay dispatcher and initial-sync orchestrator without a live database.
// Feature-gated behind `mock` so it never ships in the production binary.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bson::{Bson, Document};
use oplogsync_base::LogPosition;

use crate::driver::{
    Collection, Database, Driver, DriverError, DriverResult, DocumentCursor, Session, TailableCursor,
};

type CollectionKey = (String, String);

#[derive(Default)]
struct WorldInner {
    collections: HashMap<CollectionKey, Vec<(Bson, Document)>>,
    indexes: HashMap<CollectionKey, Vec<Document>>,
    oplog: Vec<Document>,
    primary_optime: LogPosition,
    /// When `Some(n)`, the n-th call to a tailable cursor's `next()` (source
    /// side, zero-indexed across the whole oplog's lifetime) returns a
    /// transport error instead of the real entry, to exercise reconnect.
    inject_transport_error_at: Option<usize>,
    dial_calls: u32,
}

/// A shared in-memory world: one source oplog plus a destination's
/// collections. Tests build one `MockWorld`, wrap it in two `MockDriver`s
/// (one "dialing" the source, one the destination) and hand those to the
/// component under test.
#[derive(Clone, Default)]
pub struct MockWorld(Arc<Mutex<WorldInner>>);

impl MockWorld {
    pub fn new() -> MockWorld {
        MockWorld::default()
    }

    pub fn with_primary_optime(self, pos: LogPosition) -> MockWorld {
        self.0.lock().unwrap().primary_optime = pos;
        self
    }

    pub fn push_oplog_entry(&self, entry: Document) {
        self.0.lock().unwrap().oplog.push(entry);
    }

    pub fn inject_transport_error_at(&self, index: usize) {
        self.0.lock().unwrap().inject_transport_error_at = Some(index);
    }

    pub fn dial_count(&self) -> u32 {
        self.0.lock().unwrap().dial_calls
    }

    /// Snapshot of a destination collection's documents, in insertion order,
    /// for test assertions.
    pub fn documents(&self, db: &str, coll: &str) -> Vec<Document> {
        self.0
            .lock()
            .unwrap()
            .collections
            .get(&(db.to_string(), coll.to_string()))
            .map(|docs| docs.iter().map(|(_, d)| d.clone()).collect())
            .unwrap_or_default()
    }

    pub fn driver(&self) -> MockDriver {
        MockDriver(self.0.clone())
    }

    /// Registers a collection with zero documents, so it shows up in
    /// `collection_names()` without needing a document inserted first.
    pub fn ensure_empty_collection(&self, db: &str, coll: &str) {
        self.0
            .lock()
            .unwrap()
            .collections
            .entry((db.to_string(), coll.to_string()))
            .or_default();
    }
}

pub struct MockDriver(Arc<Mutex<WorldInner>>);

#[async_trait]
impl Driver for MockDriver {
    async fn dial(&self, _hostport: &str, _connect_timeout: Duration) -> DriverResult<Box<dyn Session>> {
        self.0.lock().unwrap().dial_calls += 1;
        Ok(Box::new(MockSession(self.0.clone())))
    }
}

struct MockSession(Arc<Mutex<WorldInner>>);

#[async_trait]
impl Session for MockSession {
    fn database(&self, name: &str) -> Box<dyn Database> {
        Box::new(MockDatabase {
            world: self.0.clone(),
            name: name.to_string(),
        })
    }

    async fn database_names(&self) -> DriverResult<Vec<String>> {
        let world = self.0.lock().unwrap();
        let mut names: Vec<String> = world.collections.keys().map(|(db, _)| db.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn tail_oplog(&self, start: LogPosition) -> DriverResult<Box<dyn TailableCursor>> {
        Ok(Box::new(MockTailableCursor {
            world: self.0.clone(),
            start,
            position: 0,
        }))
    }

    async fn primary_optime(&self) -> DriverResult<LogPosition> {
        Ok(self.0.lock().unwrap().primary_optime)
    }
}

struct MockTailableCursor {
    world: Arc<Mutex<WorldInner>>,
    start: LogPosition,
    /// Index into the *filtered* (ts >= start) view of the oplog.
    position: usize,
}

#[async_trait]
impl TailableCursor for MockTailableCursor {
    async fn next(&mut self) -> DriverResult<Option<Document>> {
        let world = self.world.lock().unwrap();
        let filtered: Vec<&Document> = world
            .oplog
            .iter()
            .filter(|e| entry_ts(e) >= self.start.packed())
            .collect();
        if let Some(at) = world.inject_transport_error_at {
            if at == self.position {
                drop(world);
                return Err(DriverError::Transport(oplogsync_base::err("EOF")));
            }
        }
        if self.position >= filtered.len() {
            return Ok(None);
        }
        let doc = filtered[self.position].clone();
        self.position += 1;
        Ok(Some(doc))
    }
}

fn entry_ts(doc: &Document) -> u64 {
    doc.get_timestamp("ts")
        .map(|ts| ((ts.time as u64) << 32) | ts.increment as u64)
        .unwrap_or(0)
}

struct MockDatabase {
    world: Arc<Mutex<WorldInner>>,
    name: String,
}

#[async_trait]
impl Database for MockDatabase {
    fn collection(&self, name: &str) -> Box<dyn Collection> {
        Box::new(MockCollection {
            world: self.world.clone(),
            key: (self.name.clone(), name.to_string()),
        })
    }

    async fn run_command(&self, cmd: Document) -> DriverResult<Document> {
        let mut world = self.world.lock().unwrap();
        if let Some(coll_to_drop) = cmd.get_str("drop").ok() {
            world
                .collections
                .remove(&(self.name.clone(), coll_to_drop.to_string()));
            world.indexes.remove(&(self.name.clone(), coll_to_drop.to_string()));
        }
        Ok(Document::new())
    }

    async fn collection_names(&self) -> DriverResult<Vec<String>> {
        let world = self.world.lock().unwrap();
        Ok(world
            .collections
            .keys()
            .filter(|(db, _)| *db == self.name)
            .map(|(_, coll)| coll.clone())
            .collect())
    }
}

struct MockCollection {
    world: Arc<Mutex<WorldInner>>,
    key: CollectionKey,
}

impl MockCollection {
    fn bson_eq(a: &Bson, b: &Bson) -> bool {
        a == b
    }
}

#[async_trait]
impl Collection for MockCollection {
    async fn insert_one(&self, doc: Document) -> DriverResult<()> {
        let mut world = self.world.lock().unwrap();
        let id = doc.get("_id").cloned().unwrap_or(Bson::Null);
        let entry = world.collections.entry(self.key.clone()).or_default();
        if entry.iter().any(|(k, _)| Self::bson_eq(k, &id)) {
            return Err(DriverError::WriteError(oplogsync_base::err(
                "duplicate key error collection",
            )));
        }
        entry.push((id, doc));
        Ok(())
    }

    async fn update_one(&self, filter: Document, update: Document) -> DriverResult<()> {
        let mut world = self.world.lock().unwrap();
        let id = filter.get("_id").cloned().unwrap_or(Bson::Null);
        let entry = world.collections.entry(self.key.clone()).or_default();
        match entry.iter_mut().find(|(k, _)| Self::bson_eq(k, &id)) {
            Some((_, doc)) => {
                apply_update_in_place(doc, &update);
                Ok(())
            }
            None => Err(DriverError::NotFound),
        }
    }

    async fn delete_one(&self, filter: Document) -> DriverResult<()> {
        let mut world = self.world.lock().unwrap();
        let id = filter.get("_id").cloned().unwrap_or(Bson::Null);
        let entry = world.collections.entry(self.key.clone()).or_default();
        let before = entry.len();
        entry.retain(|(k, _)| !Self::bson_eq(k, &id));
        if entry.len() == before {
            Err(DriverError::NotFound)
        } else {
            Ok(())
        }
    }

    async fn upsert_by_id(&self, id: Bson, doc: Document) -> DriverResult<()> {
        let mut world = self.world.lock().unwrap();
        let entry = world.collections.entry(self.key.clone()).or_default();
        if let Some(slot) = entry.iter_mut().find(|(k, _)| Self::bson_eq(k, &id)) {
            slot.1 = doc;
        } else {
            entry.push((id, doc));
        }
        Ok(())
    }

    async fn insert_many(&self, docs: Vec<Document>) -> DriverResult<()> {
        for doc in docs {
            self.insert_one(doc).await?;
        }
        Ok(())
    }

    async fn list_indexes(&self) -> DriverResult<Vec<Document>> {
        Ok(self
            .world
            .lock()
            .unwrap()
            .indexes
            .get(&self.key)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_index(&self, spec: Document) -> DriverResult<()> {
        self.world
            .lock()
            .unwrap()
            .indexes
            .entry(self.key.clone())
            .or_default()
            .push(spec);
        Ok(())
    }

    async fn count(&self) -> DriverResult<u64> {
        Ok(self
            .world
            .lock()
            .unwrap()
            .collections
            .get(&self.key)
            .map(|v| v.len() as u64)
            .unwrap_or(0))
    }

    async fn find_snapshot(&self) -> DriverResult<Box<dyn DocumentCursor>> {
        let docs = self
            .world
            .lock()
            .unwrap()
            .collections
            .get(&self.key)
            .map(|v| v.iter().map(|(_, d)| d.clone()).collect())
            .unwrap_or_default();
        Ok(Box::new(MockDocumentCursor { docs, position: 0 }))
    }
}

/// A document update applied by `_id` replaces the whole document unless
/// the update spec uses `$set`-style modifiers, matching the subset of
/// update semantics the oplog actually produces.
fn apply_update_in_place(doc: &mut Document, update: &Document) {
    if let Some(set) = update.get_document("$set").ok() {
        for (k, v) in set {
            doc.insert(k.clone(), v.clone());
        }
        return;
    }
    let id = doc.get("_id").cloned();
    *doc = update.clone();
    if let Some(id) = id {
        doc.insert("_id", id);
    }
}

struct MockDocumentCursor {
    docs: Vec<Document>,
    position: usize,
}

#[async_trait]
impl DocumentCursor for MockDocumentCursor {
    async fn next(&mut self) -> DriverResult<Option<Document>> {
        if self.position >= self.docs.len() {
            return Ok(None);
        }
        let doc = self.docs[self.position].clone();
        self.position += 1;
        Ok(Some(doc))
    }
}
