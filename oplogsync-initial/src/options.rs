// Knobs that distinguish "fresh destination" from "resume/top-off"
// initial-sync runs.

#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    /// Write documents with `upsert_by_id` instead of batched `insert_many`.
    /// Slower, but idempotent against a partially-completed prior run.
    pub upsert: bool,
    /// Skip recreating indexes on the destination before copying documents.
    pub ignore_index: bool,
    /// Number of concurrent document-copy workers per collection.
    pub num_workers: usize,
}

impl Default for SyncOptions {
    fn default() -> SyncOptions {
        SyncOptions {
            upsert: false,
            ignore_index: false,
            num_workers: crate::default_worker_count(),
        }
    }
}
