//! Vector-backed log
//!
//! Cloning a [`MemoryLog`] yields another handle to the same records, so a
//! writer and any number of subscribers can share one log.

use crate::log::{LogAppend, LogError, LogStream, Sequencer};
use crate::record::LogRecord;
use kglog_core::LogIndex;
use parking_lot::RwLock;
use std::sync::Arc;

/// In-memory ordered log
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    records: Arc<RwLock<Vec<LogRecord>>>,
}

impl MemoryLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the log has no records
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Stream every record with index `>= from`
    pub fn subscribe_from(&self, from: LogIndex) -> MemorySubscription {
        MemorySubscription {
            records: Arc::clone(&self.records),
            position: 0,
            sequencer: Sequencer::starting_at(from),
        }
    }

    /// Snapshot of all records
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.read().clone()
    }
}

impl LogAppend for MemoryLog {
    fn append_record(&mut self, record: LogRecord) -> Result<(), LogError> {
        self.records.write().push(record);
        Ok(())
    }

    fn last_index(&self) -> Option<LogIndex> {
        self.records.read().last().map(|r| r.index)
    }
}

/// Reader over a [`MemoryLog`]
#[derive(Debug)]
pub struct MemorySubscription {
    records: Arc<RwLock<Vec<LogRecord>>>,
    position: usize,
    sequencer: Sequencer,
}

impl LogStream for MemorySubscription {
    fn next_record(&mut self) -> Result<Option<LogRecord>, LogError> {
        let records = self.records.read();
        while let Some(record) = records.get(self.position) {
            self.position += 1;
            if self.sequencer.admit(record.index)? {
                return Ok(Some(record.clone()));
            }
        }
        Ok(None)
    }
}
