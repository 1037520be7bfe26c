//! Ordered log streams
//!
//! The consensus layer hands the replica an ordered stream of
//! `(index, payload)` records. This module defines that seam:
//!
//! - [`LogStream`]: the read side consumed by the replica
//! - [`LogAppend`]: the write side used by tools and tests
//! - [`LogWriter`]: assigns the next index and encodes commands
//!
//! Streams enforce strictly increasing, gap-free indexes. Anything else is
//! reported as [`LogError::OutOfOrder`] rather than silently delivered.

use crate::codec::{self, EncodeError};
use crate::record::{LogRecord, LogRecordError};
use kglog_core::{Command, LogIndex};
use thiserror::Error;

/// First index of every log. Index 0 is reserved for bootstrap entities.
pub const FIRST_LOG_INDEX: LogIndex = 1;

/// Log stream errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogError {
    /// I/O failure
    #[error("I/O error: {0}")]
    Io(String),

    /// A record failed its integrity check
    #[error("Corrupt record at byte offset {offset}: {source}")]
    Corrupt {
        /// Byte offset of the record
        offset: u64,
        /// Framing error
        source: LogRecordError,
    },

    /// The stream skipped or repeated an index
    #[error("Out-of-order log record: expected index {expected}, found {found}")]
    OutOfOrder {
        /// Index the stream should have produced
        expected: LogIndex,
        /// Index it did produce
        found: LogIndex,
    },

    /// Command could not be encoded for appending
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

impl From<std::io::Error> for LogError {
    fn from(e: std::io::Error) -> Self {
        LogError::Io(e.to_string())
    }
}

/// Read side of an ordered log
pub trait LogStream {
    /// Next record, or `None` when no more data is currently available.
    ///
    /// A stream that returned `None` may produce more records later if the
    /// underlying log grows.
    fn next_record(&mut self) -> Result<Option<LogRecord>, LogError>;
}

/// Write side of an ordered log
pub trait LogAppend {
    /// Append a framed record. The caller assigns the index.
    fn append_record(&mut self, record: LogRecord) -> Result<(), LogError>;

    /// Index of the last record in the log
    fn last_index(&self) -> Option<LogIndex>;
}

/// Gap and regression detection shared by stream implementations
#[derive(Debug, Clone)]
pub(crate) struct Sequencer {
    next: LogIndex,
    started: bool,
}

impl Sequencer {
    pub(crate) fn starting_at(from: LogIndex) -> Self {
        Sequencer {
            next: from.max(FIRST_LOG_INDEX),
            started: false,
        }
    }

    /// Whether the record should be delivered. Records below the start
    /// index are skipped until the first delivery.
    pub(crate) fn admit(&mut self, index: LogIndex) -> Result<bool, LogError> {
        if !self.started && index < self.next {
            return Ok(false);
        }
        if index != self.next {
            return Err(LogError::OutOfOrder {
                expected: self.next,
                found: index,
            });
        }
        self.started = true;
        self.next = index + 1;
        Ok(true)
    }
}

/// Appends commands, assigning consecutive indexes
pub struct LogWriter<A: LogAppend> {
    target: A,
    next_index: LogIndex,
}

impl<A: LogAppend> LogWriter<A> {
    /// Continue after the target's last record
    pub fn new(target: A) -> Self {
        let next_index = target
            .last_index()
            .map(|i| i + 1)
            .unwrap_or(FIRST_LOG_INDEX);
        LogWriter { target, next_index }
    }

    /// Encode and append a command, returning its index
    pub fn append(&mut self, command: &Command) -> Result<LogIndex, LogError> {
        let bytes = codec::encode(command)?;
        self.append_raw(bytes)
    }

    /// Append already-encoded bytes verbatim
    pub fn append_raw(&mut self, payload: Vec<u8>) -> Result<LogIndex, LogError> {
        let index = self.next_index;
        self.target.append_record(LogRecord::new(index, payload))?;
        self.next_index += 1;
        Ok(index)
    }

    /// Index the next append will receive
    pub fn next_index(&self) -> LogIndex {
        self.next_index
    }

    /// The underlying log
    pub fn get_ref(&self) -> &A {
        &self.target
    }

    /// Give back the underlying log
    pub fn into_inner(self) -> A {
        self.target
    }
}
