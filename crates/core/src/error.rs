//! Error types for the command-log core
//!
//! The taxonomy separates four conditions that callers must treat
//! differently:
//!
//! - [`DecodeError`]: bytes that do not form a command. Unknown command kinds
//!   are distinct from malformed payloads so the dispatcher can apply its
//!   forward-compatibility policy.
//! - [`RangeError`]: writer protocol violation. The whole InsertTx is
//!   rejected, nothing is partially applied.
//! - [`UnsupportedVersionError`]: the log requires a newer build. Fatal.
//! - [`HistoryWipedError`]: a read below the wipe watermark. Recoverable by
//!   the caller, never fatal to the replica.
//!
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use crate::types::LogIndex;
use crate::version::ProtocolVersion;
use thiserror::Error;

/// Result type alias for core operations
pub type KgResult<T> = std::result::Result<T, KgError>;

/// Failure to turn bytes into a command
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Zero-length entry
    #[error("Empty command payload")]
    Empty,

    /// The kind tag is not one this build knows
    #[error("Unknown command kind tag 0x{tag:02x}")]
    UnknownKind {
        /// Raw tag byte
        tag: u8,
    },

    /// Known kind, but the payload does not parse
    #[error("Malformed {kind} payload: {detail}")]
    Malformed {
        /// Command kind named by the tag
        kind: &'static str,
        /// Parser diagnostic
        detail: String,
    },
}

impl DecodeError {
    /// Whether this is the forward-compatible "unknown kind" case
    pub fn is_unknown_kind(&self) -> bool {
        matches!(self, DecodeError::UnknownKind { .. })
    }
}

/// Writer protocol violation inside an InsertTx command
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    /// Offset outside the accepted range
    #[error("Offset {offset} outside [{min}, {max}]")]
    OffsetOutOfRange {
        /// Offending offset
        offset: i32,
        /// Inclusive lower bound
        min: i32,
        /// Inclusive upper bound
        max: i32,
    },

    /// Two facts in one batch claim the same fact id offset
    #[error("Duplicate fact id offset {offset}")]
    DuplicateFactOffset {
        /// Repeated offset
        offset: i32,
    },

    /// Annotation attached to an object kind that cannot carry it
    #[error("{annotation} annotation not allowed on {kind} object")]
    InvalidAnnotation {
        /// "unit" or "lang"
        annotation: &'static str,
        /// Object kind name
        kind: &'static str,
    },

    /// The owning log index cannot derive KIDs
    #[error("Log index {index} cannot own offsets")]
    InvalidOwnerIndex {
        /// Offending index
        index: LogIndex,
    },
}

/// The log requires a protocol version newer than this build
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Log entry {index} requires protocol version {requested}, this build supports up to {supported}")]
pub struct UnsupportedVersionError {
    /// Index of the Version command
    pub index: LogIndex,
    /// Version the log asked for
    pub requested: ProtocolVersion,
    /// Highest version this build understands
    pub supported: ProtocolVersion,
}

/// Read below the most recent wipe
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("History before index {wipe_index} was wiped (requested as-of {requested})")]
pub struct HistoryWipedError {
    /// Index the caller asked to read as of
    pub requested: LogIndex,
    /// Index of the most recent wipe
    pub wipe_index: LogIndex,
}

/// Condition that halts replay permanently
///
/// Once a replay session observes a fatal error it refuses all further
/// entries. The only way forward is a newer build replaying from a
/// checkpoint taken before the fatal entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalError {
    /// The log moved to a version this build cannot interpret
    #[error("Fatal: {0}")]
    UnsupportedVersion(#[from] UnsupportedVersionError),

    /// An entry could not be decoded and strict decoding is on
    #[error("Fatal: entry {index} is undecodable: {source}")]
    Undecodable {
        /// Index of the entry
        index: LogIndex,
        /// Decoder diagnostic
        source: DecodeError,
    },
}

/// Crate-wide error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KgError {
    /// Undecodable entry
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Writer protocol violation
    #[error("Range error: {0}")]
    Range(#[from] RangeError),

    /// Replay halted
    #[error(transparent)]
    Fatal(#[from] FatalError),

    /// Read below the watermark
    #[error(transparent)]
    HistoryWiped(#[from] HistoryWipedError),
}

impl From<UnsupportedVersionError> for KgError {
    fn from(e: UnsupportedVersionError) -> Self {
        KgError::Fatal(FatalError::UnsupportedVersion(e))
    }
}

impl KgError {
    /// Whether replay must stop on this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, KgError::Fatal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::UnknownKind { tag: 0x7f };
        assert!(err.to_string().contains("0x7f"));
        assert!(err.is_unknown_kind());

        let err = DecodeError::Malformed {
            kind: "insert_tx",
            detail: "truncated".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("insert_tx"));
        assert!(msg.contains("truncated"));
        assert!(!err.is_unknown_kind());
    }

    #[test]
    fn test_range_error_display() {
        let err = RangeError::OffsetOutOfRange {
            offset: 1000,
            min: 1,
            max: 999,
        };
        let msg = err.to_string();
        assert!(msg.contains("1000"));
        assert!(msg.contains("[1, 999]"));

        let err = RangeError::DuplicateFactOffset { offset: 4 };
        assert!(err.to_string().contains("Duplicate"));
    }

    #[test]
    fn test_unsupported_version_is_fatal() {
        let err: KgError = UnsupportedVersionError {
            index: 10,
            requested: 9,
            supported: 3,
        }
        .into();
        assert!(err.is_fatal());
        let msg = err.to_string();
        assert!(msg.contains("Fatal"));
        assert!(msg.contains("9"));
    }

    #[test]
    fn test_undecodable_display() {
        let err = FatalError::Undecodable {
            index: 12,
            source: DecodeError::Empty,
        };
        let msg = err.to_string();
        assert!(msg.contains("12"));
        assert!(msg.contains("Empty"));
    }

    #[test]
    fn test_history_wiped_not_fatal() {
        let err: KgError = HistoryWipedError {
            requested: 3,
            wipe_index: 8,
        }
        .into();
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("wiped"));
    }
}
