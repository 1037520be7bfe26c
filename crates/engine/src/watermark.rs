//! Wipe watermark
//!
//! Reads as of an index below the most recent wipe must fail instead of
//! returning an empty graph.

use kglog_core::{HistoryWipedError, LogIndex};

/// Tracks the most recent wipe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatermarkTracker {
    wipe_index: Option<LogIndex>,
}

impl WatermarkTracker {
    /// No wipe seen yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker resumed from a checkpoint
    pub fn restore(wipe_index: Option<LogIndex>) -> Self {
        WatermarkTracker { wipe_index }
    }

    /// Record a wipe at `index`
    pub fn on_wipe(&mut self, index: LogIndex) {
        self.wipe_index = Some(index);
    }

    /// Index of the most recent wipe
    pub fn wipe_index(&self) -> Option<LogIndex> {
        self.wipe_index
    }

    /// Fail if a read as of `as_of` falls below the watermark
    pub fn check_read(&self, as_of: LogIndex) -> Result<(), HistoryWipedError> {
        match self.wipe_index {
            Some(wipe_index) if as_of < wipe_index => Err(HistoryWipedError {
                requested: as_of,
                wipe_index,
            }),
            _ => Ok(()),
        }
    }
}
