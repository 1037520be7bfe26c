//! Collaborator seams
//!
//! The replay session never stores facts itself. It hands state
//! transitions to a [`StorageSink`] and matched pings to a
//! [`LatencySink`], in log order.

use kglog_core::{Fact, LogIndex};
use parking_lot::Mutex;
use std::sync::Arc;

/// Receives materialized state transitions.
///
/// Each call must be applied atomically with respect to readers.
pub trait StorageSink: Send + Sync {
    /// Facts of a committed transaction, visible as of `visibility_index`
    fn apply_commit(&self, visibility_index: LogIndex, facts: Vec<Fact>);

    /// A transaction aborted. Nothing was emitted for it earlier.
    fn apply_abort(&self, _tx: LogIndex) {}

    /// Discard all materialized state; reads below `wipe_index` now fail
    fn apply_wipe(&self, wipe_index: LogIndex);
}

impl<T: StorageSink + ?Sized> StorageSink for Arc<T> {
    fn apply_commit(&self, visibility_index: LogIndex, facts: Vec<Fact>) {
        (**self).apply_commit(visibility_index, facts)
    }

    fn apply_abort(&self, tx: LogIndex) {
        (**self).apply_abort(tx)
    }

    fn apply_wipe(&self, wipe_index: LogIndex) {
        (**self).apply_wipe(wipe_index)
    }
}

/// Receives `(seq, observed index)` for this writer's own pings
pub trait LatencySink: Send + Sync {
    /// A ping issued by this writer was observed at `index`
    fn observe(&self, seq: u64, index: LogIndex);
}

impl<T: LatencySink + ?Sized> LatencySink for Arc<T> {
    fn observe(&self, seq: u64, index: LogIndex) {
        (**self).observe(seq, index)
    }
}

/// Latency sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLatency;

impl LatencySink for NoopLatency {
    fn observe(&self, _seq: u64, _index: LogIndex) {}
}

/// Latency sink that keeps every observation
#[derive(Debug, Default)]
pub struct RecordingLatency {
    observed: Mutex<Vec<(u64, LogIndex)>>,
}

impl RecordingLatency {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Observations in arrival order
    pub fn observed(&self) -> Vec<(u64, LogIndex)> {
        self.observed.lock().clone()
    }
}

impl LatencySink for RecordingLatency {
    fn observe(&self, seq: u64, index: LogIndex) {
        self.observed.lock().push((seq, index));
    }
}
