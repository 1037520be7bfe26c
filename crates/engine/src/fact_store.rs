//! In-memory as-of fact store
//!
//! Reference [`StorageSink`] that keeps every committed fact with the index
//! it became visible at. All state sits behind one `RwLock`, and each
//! commit or wipe takes the write lock exactly once, so a reader sees
//! either none or all of a transition.

use crate::sink::StorageSink;
use kglog_core::{Fact, HistoryWipedError, Kid, LogIndex};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
struct StoredFact {
    visibility_index: LogIndex,
    fact: Fact,
}

#[derive(Debug, Default, Serialize)]
struct StoreState {
    facts: BTreeMap<Kid, StoredFact>,
    wipe_index: Option<LogIndex>,
}

/// Materialized graph with as-of reads
#[derive(Debug, Default)]
pub struct FactStore {
    state: RwLock<StoreState>,
}

impl FactStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Facts visible as of `as_of`, ordered by fact id
    pub fn facts_as_of(&self, as_of: LogIndex) -> Result<Vec<Fact>, HistoryWipedError> {
        let state = self.state.read();
        if let Some(wipe_index) = state.wipe_index {
            if as_of < wipe_index {
                return Err(HistoryWipedError {
                    requested: as_of,
                    wipe_index,
                });
            }
        }
        Ok(state
            .facts
            .values()
            .filter(|stored| stored.visibility_index <= as_of)
            .map(|stored| stored.fact.clone())
            .collect())
    }

    /// Every fact with its visibility index, ordered by fact id
    pub fn all_facts(&self) -> Vec<(LogIndex, Fact)> {
        self.state
            .read()
            .facts
            .values()
            .map(|stored| (stored.visibility_index, stored.fact.clone()))
            .collect()
    }

    /// Index a fact became visible at
    pub fn visibility_of(&self, fact_id: Kid) -> Option<LogIndex> {
        self.state
            .read()
            .facts
            .get(&fact_id)
            .map(|stored| stored.visibility_index)
    }

    /// Number of facts held
    pub fn len(&self) -> usize {
        self.state.read().facts.len()
    }

    /// Whether the store holds no facts
    pub fn is_empty(&self) -> bool {
        self.state.read().facts.is_empty()
    }

    /// Index of the most recent wipe
    pub fn wipe_index(&self) -> Option<LogIndex> {
        self.state.read().wipe_index
    }

    /// Canonical byte encoding of the whole materialized state
    pub fn snapshot_bytes(&self) -> Vec<u8> {
        let state = self.state.read();
        // BTreeMap order makes the encoding canonical; plain data cannot fail
        rmp_serde::to_vec_named(&*state).unwrap_or_default()
    }

    /// CRC32 of [`FactStore::snapshot_bytes`]
    pub fn fingerprint(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.snapshot_bytes());
        hasher.finalize()
    }
}

impl StorageSink for FactStore {
    fn apply_commit(&self, visibility_index: LogIndex, facts: Vec<Fact>) {
        let mut state = self.state.write();
        for fact in facts {
            state.facts.insert(
                fact.fact_id,
                StoredFact {
                    visibility_index,
                    fact,
                },
            );
        }
    }

    fn apply_abort(&self, tx: LogIndex) {
        debug!(tx, "Abort observed by fact store");
    }

    fn apply_wipe(&self, wipe_index: LogIndex) {
        let mut state = self.state.write();
        state.facts.clear();
        state.wipe_index = Some(wipe_index);
    }
}
