//! Engine error type

use kglog_core::{DecodeError, FatalError, HistoryWipedError, LogIndex};
use kglog_durability::{CheckpointError, LogError};
use thiserror::Error;

/// Result alias for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the replay session and replica runner
#[derive(Debug, Error)]
pub enum EngineError {
    /// Replay is halted. Every later call returns the same error.
    #[error(transparent)]
    Fatal(#[from] FatalError),

    /// An entry arrived at or below the last applied index
    #[error("Entry {index} is not after last applied entry {previous}")]
    OutOfOrder {
        /// Last applied index
        previous: LogIndex,
        /// Offending index
        index: LogIndex,
    },

    /// An entry carried an index below the first log index
    #[error("Entry index {index} is below the first log index")]
    InvalidIndex {
        /// Offending index
        index: LogIndex,
    },

    /// An entry's bytes did not decode
    #[error("Entry {index}: {source}")]
    Decode {
        /// Index of the entry
        index: LogIndex,
        /// Decoder diagnostic
        source: DecodeError,
    },

    /// Read below the wipe watermark
    #[error(transparent)]
    HistoryWiped(#[from] HistoryWipedError),

    /// Log stream failure
    #[error("Log error: {0}")]
    Log(#[from] LogError),

    /// Checkpoint read or write failure
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Whether replay must stop permanently
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Fatal(_))
    }
}
