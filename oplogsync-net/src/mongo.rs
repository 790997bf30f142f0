// The one place that knows about the `mongodb` crate. Everything here is a
// thin adapter from `mongodb`/`bson` types onto the `driver` traits.

use std::time::Duration;

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures::stream::TryStreamExt;
use mongodb::error::{Error as MongoError, ErrorKind};
use mongodb::options::{ClientOptions, FindOptions, IndexOptions, ReadPreference, SelectionCriteria};
use mongodb::{Client, IndexModel};
use oplogsync_base::LogPosition;
use tracing::debug;

use crate::driver::{
    Collection, Database, Driver, DriverError, DriverResult, DocumentCursor, Session, TailableCursor,
};

const OPLOG_DB: &str = "local";
const OPLOG_COLL: &str = "oplog.rs";
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Classifies a raw `mongodb` error into the three-way taxonomy the
/// worker/dispatcher reason about, using the typed `ErrorKind` the async
/// driver exposes rather than sniffing error message strings.
fn classify(err: MongoError) -> DriverError {
    if err.is_network_error() || matches!(*err.kind, ErrorKind::Io(_)) {
        return DriverError::Transport(oplogsync_base::err(err.to_string()));
    }
    if err.code() == Some(DUPLICATE_KEY_CODE) {
        return DriverError::WriteError(oplogsync_base::err(format!("duplicate key: {err}")));
    }
    DriverError::WriteError(oplogsync_base::err(err.to_string()))
}

pub struct MongoDriver;

#[async_trait]
impl Driver for MongoDriver {
    async fn dial(&self, hostport: &str, connect_timeout: Duration) -> DriverResult<Box<dyn Session>> {
        let uri = format!("mongodb://{hostport}/?directConnection=true");
        let mut opts = ClientOptions::parse(&uri)
            .await
            .map_err(|e| DriverError::Transport(oplogsync_base::err(e.to_string())))?;
        opts.connect_timeout = Some(connect_timeout);
        // Long-lived sessions should not trip on an idle tail or a slow
        // oplog seek; only the initial dial is time-boxed.
        opts.server_selection_timeout = Some(connect_timeout);
        // Pins reads to the primary; a no-op against the direct-connection
        // dial used today, but correct if this ever dials a replica set URI.
        opts.selection_criteria = Some(primary_read_preference());
        let client = Client::with_options(opts)
            .map_err(|e| DriverError::Transport(oplogsync_base::err(e.to_string())))?;
        Ok(Box::new(MongoSession { client }))
    }
}

struct MongoSession {
    client: Client,
}

#[async_trait]
impl Session for MongoSession {
    fn database(&self, name: &str) -> Box<dyn Database> {
        Box::new(MongoDatabase {
            db: self.client.database(name),
        })
    }

    async fn database_names(&self) -> DriverResult<Vec<String>> {
        self.client
            .list_database_names(None, None)
            .await
            .map_err(classify)
    }

    async fn tail_oplog(&self, start: LogPosition) -> DriverResult<Box<dyn TailableCursor>> {
        let coll = self
            .client
            .database(OPLOG_DB)
            .collection::<Document>(OPLOG_COLL);
        let ts = bson::Timestamp {
            time: start.seconds(),
            increment: start.counter(),
        };
        let filter = doc! { "ts": { "$gte": ts } };
        let opts = FindOptions::builder()
            .cursor_type(mongodb::options::CursorType::TailableAwait)
            .no_cursor_timeout(true)
            .build();
        let cursor = coll.find(filter, opts).await.map_err(classify)?;
        Ok(Box::new(MongoTailableCursor { cursor }))
    }

    async fn primary_optime(&self) -> DriverResult<LogPosition> {
        let admin = self.client.database("admin");
        let status = admin
            .run_command(doc! { "replSetGetStatus": 1 }, None)
            .await
            .map_err(classify)?;
        let members = status
            .get_array("members")
            .map_err(|e| DriverError::WriteError(oplogsync_base::err(e.to_string())))?;
        for member in members {
            let member = member
                .as_document()
                .ok_or_else(|| DriverError::WriteError(oplogsync_base::err("malformed member entry")))?;
            // stateStr == "PRIMARY" (state code 1).
            if member.get_i32("state").ok() == Some(1) {
                let ts = member
                    .get_timestamp("optime")
                    .or_else(|_| {
                        member
                            .get_document("optime")
                            .and_then(|o| o.get_timestamp("ts"))
                    })
                    .map_err(|_| DriverError::WriteError(oplogsync_base::err("missing optime on primary")))?;
                return Ok(LogPosition::new(ts.time, ts.increment));
            }
        }
        Err(DriverError::WriteError(oplogsync_base::err(
            "replica set has no PRIMARY",
        )))
    }
}

struct MongoTailableCursor {
    cursor: mongodb::Cursor<Document>,
}

#[async_trait]
impl TailableCursor for MongoTailableCursor {
    async fn next(&mut self) -> DriverResult<Option<Document>> {
        self.cursor.try_next().await.map_err(classify)
    }
}

struct MongoDatabase {
    db: mongodb::Database,
}

#[async_trait]
impl Database for MongoDatabase {
    fn collection(&self, name: &str) -> Box<dyn Collection> {
        Box::new(MongoCollection {
            coll: self.db.collection::<Document>(name),
        })
    }

    async fn run_command(&self, cmd: Document) -> DriverResult<Document> {
        self.db.run_command(cmd, None).await.map_err(classify)
    }

    async fn collection_names(&self) -> DriverResult<Vec<String>> {
        self.db.list_collection_names(None).await.map_err(classify)
    }
}

struct MongoCollection {
    coll: mongodb::Collection<Document>,
}

#[async_trait]
impl Collection for MongoCollection {
    async fn insert_one(&self, doc: Document) -> DriverResult<()> {
        self.coll.insert_one(doc, None).await.map_err(classify)?;
        Ok(())
    }

    async fn update_one(&self, filter: Document, update: Document) -> DriverResult<()> {
        // The oplog's `o` field for a `u` entry is either a modifier
        // document (`$set`, `$unset`, ...) or a full-document replacement,
        // depending on whether the source write was itself a modifier
        // update or a `replaceOne`/non-`$`-operator `update`/`save()`. The
        // CRUD driver's `update_one` rejects replacement-style documents
        // client-side, so route on the same top-level-`$`-key test the
        // server itself uses to distinguish the two forms.
        let is_modifier = update.keys().next().map(|k| k.starts_with('$')).unwrap_or(false);
        let result = if is_modifier {
            self.coll.update_one(filter, update, None).await.map_err(classify)?
        } else {
            self.coll.replace_one(filter, update, None).await.map_err(classify)?
        };
        if result.matched_count == 0 {
            debug!(target: "oplogsync", "update matched nothing, treating as applied");
            return Err(DriverError::NotFound);
        }
        Ok(())
    }

    async fn delete_one(&self, filter: Document) -> DriverResult<()> {
        let result = self.coll.delete_one(filter, None).await.map_err(classify)?;
        if result.deleted_count == 0 {
            debug!(target: "oplogsync", "delete matched nothing, treating as applied");
            return Err(DriverError::NotFound);
        }
        Ok(())
    }

    async fn upsert_by_id(&self, id: Bson, doc: Document) -> DriverResult<()> {
        let options = mongodb::options::ReplaceOptions::builder()
            .upsert(true)
            .build();
        self.coll
            .replace_one(doc! { "_id": id }, doc, options)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn insert_many(&self, docs: Vec<Document>) -> DriverResult<()> {
        self.coll.insert_many(docs, None).await.map_err(classify)?;
        Ok(())
    }

    async fn list_indexes(&self) -> DriverResult<Vec<Document>> {
        let mut cursor = self.coll.list_index_models(None).await.map_err(classify)?;
        let mut out = Vec::new();
        while let Some(spec) = cursor.pop() {
            out.push(bson::to_document(&spec).map_err(|e| {
                DriverError::WriteError(oplogsync_base::err(e.to_string()))
            })?);
        }
        Ok(out)
    }

    async fn create_index(&self, spec: Document) -> DriverResult<()> {
        let model = IndexModel::builder()
            .keys(spec.get_document("key").cloned().unwrap_or_default())
            .options(IndexOptions::builder().name(spec.get_str("name").ok().map(String::from)).build())
            .build();
        self.coll.create_index(model, None).await.map_err(classify)?;
        Ok(())
    }

    async fn count(&self) -> DriverResult<u64> {
        self.coll.estimated_document_count(None).await.map_err(classify)
    }

    async fn find_snapshot(&self) -> DriverResult<Box<dyn DocumentCursor>> {
        // The legacy `snapshot()` read mode has no equivalent in the current
        // wire protocol; a stable `_id`-ordered scan gives the same
        // no-duplicates/no-misses guarantee against an indexed primary key.
        let opts = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        let cursor = self.coll.find(doc! {}, opts).await.map_err(classify)?;
        Ok(Box::new(MongoDocumentCursor { cursor }))
    }
}

struct MongoDocumentCursor {
    cursor: mongodb::Cursor<Document>,
}

#[async_trait]
impl DocumentCursor for MongoDocumentCursor {
    async fn next(&mut self) -> DriverResult<Option<Document>> {
        self.cursor.try_next().await.map_err(classify)
    }
}

/// Selection criteria that pins reads to the primary, used on the source
/// when it is a replica set. Direct-connection mode (single member dialed
/// without replica set discovery) allows secondary reads implicitly, since
/// there is no other member to route to.
pub fn primary_read_preference() -> SelectionCriteria {
    SelectionCriteria::ReadPreference(ReadPreference::Primary)
}
