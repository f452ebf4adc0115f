//! Process-wide pipeline counters.
//!
//! Incremented at the call site; [`Metrics::flush`] reports them as one
//! `info!` event at the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by every run in the process.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    files_crawled: AtomicU64,
    blobs_created: AtomicU64,
    blobs_reused: AtomicU64,
    model_invocations: AtomicU64,
    refs_force_updated: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            files_crawled: AtomicU64::new(0),
            blobs_created: AtomicU64::new(0),
            blobs_reused: AtomicU64::new(0),
            model_invocations: AtomicU64::new(0),
            refs_force_updated: AtomicU64::new(0),
        }
    }

    fn bump(counter: &AtomicU64, name: &'static str) {
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = name, "counter incremented");
    }

    /// Count one file fetched by the crawler.
    pub fn inc_files_crawled(&self) {
        Self::bump(&self.files_crawled, "files_crawled");
    }

    /// Count one blob written to the host.
    pub fn inc_blobs_created(&self) {
        Self::bump(&self.blobs_created, "blobs_created");
    }

    /// Count one unchanged file whose existing blob was reused.
    pub fn inc_blobs_reused(&self) {
        Self::bump(&self.blobs_reused, "blobs_reused");
    }

    /// Count one completion request sent to the model.
    pub fn inc_model_invocations(&self) {
        Self::bump(&self.model_invocations, "model_invocations");
    }

    /// Count one branch moved with a forced ref update.
    pub fn inc_refs_force_updated(&self) {
        Self::bump(&self.refs_force_updated, "refs_force_updated");
    }

    /// Emit all counters as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            files_crawled = self.files_crawled(),
            blobs_created = self.blobs_created(),
            blobs_reused = self.blobs_reused(),
            model_invocations = self.model_invocations(),
            refs_force_updated = self.refs_force_updated(),
        );
    }

    /// Files fetched so far.
    pub fn files_crawled(&self) -> u64 {
        self.files_crawled.load(Ordering::Relaxed)
    }

    /// Blobs written so far.
    pub fn blobs_created(&self) -> u64 {
        self.blobs_created.load(Ordering::Relaxed)
    }

    /// Blobs reused so far.
    pub fn blobs_reused(&self) -> u64 {
        self.blobs_reused.load(Ordering::Relaxed)
    }

    /// Model calls so far.
    pub fn model_invocations(&self) -> u64 {
        self.model_invocations.load(Ordering::Relaxed)
    }

    /// Forced ref updates so far.
    pub fn refs_force_updated(&self) -> u64 {
        self.refs_force_updated.load(Ordering::Relaxed)
    }

    /// Zero every counter (tests).
    pub fn reset(&self) {
        for counter in [
            &self.files_crawled,
            &self.blobs_created,
            &self.blobs_reused,
            &self.model_invocations,
            &self.refs_force_updated,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
