mod copier;
mod options;
mod orchestrator;

pub use options::SyncOptions;
pub use orchestrator::run_initial_sync;

/// `min(num_cpus, 32)`, at least 1 -- matches the replay dispatcher's
/// default worker-pool size so a single `--workers` override controls both
/// phases consistently.
pub fn default_worker_count() -> usize {
    num_cpus::get().clamp(1, 32)
}
