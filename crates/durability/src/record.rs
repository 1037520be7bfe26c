//! Log record framing
//!
//! Each log entry is stored as one self-delimiting record:
//!
//! ```text
//! ┌─────────────────┬──────────────────┬─────────────┬──────────────────┬──────────┐
//! │ Length (4 bytes)│ Format Ver (1)   │ Index (8)   │ Payload (var)    │ CRC32 (4)│
//! └─────────────────┴──────────────────┴─────────────┴──────────────────┴──────────┘
//! ```
//!
//! The length covers everything after itself. The CRC covers the format
//! version, the index and the payload. All integers are little-endian.
//! The payload is an encoded command (see [`crate::codec`]) and is never
//! interpreted here.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use crc32fast::Hasher;
use kglog_core::LogIndex;
use thiserror::Error;

/// Current log record format version
pub const LOG_RECORD_FORMAT_VERSION: u8 = 1;

/// Bytes between the length prefix and the payload
const HEADER_AFTER_LENGTH: usize = 1 + 8;

/// Smallest legal length field: header plus CRC, empty payload
const MIN_RECORD_LENGTH: usize = HEADER_AFTER_LENGTH + 4;

/// Largest length field accepted. A larger value is a damaged prefix.
pub const MAX_RECORD_LENGTH: usize = 64 * 1024 * 1024;

/// One framed log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Position in the log
    pub index: LogIndex,
    /// Encoded command bytes
    pub payload: Vec<u8>,
}

impl LogRecord {
    /// Create a new record
    pub fn new(index: LogIndex, payload: Vec<u8>) -> Self {
        LogRecord { index, payload }
    }

    /// Serialize record to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(HEADER_AFTER_LENGTH + self.payload.len());
        body.push(LOG_RECORD_FORMAT_VERSION);
        // Writes into a Vec cannot fail
        let _ = body.write_u64::<LittleEndian>(self.index);
        body.extend_from_slice(&self.payload);

        let crc = compute_crc(&body);
        let total_len = body.len() + 4;

        let mut record = Vec::with_capacity(4 + total_len);
        let _ = record.write_u32::<LittleEndian>(total_len as u32);
        record.extend_from_slice(&body);
        let _ = record.write_u32::<LittleEndian>(crc);
        record
    }

    /// Deserialize a record from the front of `bytes`.
    ///
    /// Returns (record, bytes_consumed) on success.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), LogRecordError> {
        let length = declared_length(bytes)?;
        if !(MIN_RECORD_LENGTH..=MAX_RECORD_LENGTH).contains(&length) {
            return Err(LogRecordError::InvalidFormat);
        }
        if bytes.len() < 4 + length {
            return Err(LogRecordError::InsufficientData);
        }

        let body = &bytes[4..4 + length - 4];
        let stored_crc = LittleEndian::read_u32(&bytes[4 + length - 4..4 + length]);
        let computed_crc = compute_crc(body);
        if computed_crc != stored_crc {
            return Err(LogRecordError::ChecksumMismatch {
                expected: stored_crc,
                computed: computed_crc,
            });
        }

        let format_version = body[0];
        if format_version != LOG_RECORD_FORMAT_VERSION {
            return Err(LogRecordError::UnsupportedVersion(format_version));
        }

        let index = LittleEndian::read_u64(&body[1..HEADER_AFTER_LENGTH]);
        let payload = body[HEADER_AFTER_LENGTH..].to_vec();

        Ok((LogRecord { index, payload }, 4 + length))
    }

    /// Total size of the record once framed
    pub fn framed_len(&self) -> usize {
        4 + HEADER_AFTER_LENGTH + self.payload.len() + 4
    }
}

/// Length prefix of the record at the front of `bytes`
pub fn declared_length(bytes: &[u8]) -> Result<usize, LogRecordError> {
    if bytes.len() < 4 {
        return Err(LogRecordError::InsufficientData);
    }
    Ok(LittleEndian::read_u32(&bytes[0..4]) as usize)
}

fn compute_crc(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Record parsing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogRecordError {
    /// Not enough data to parse record
    #[error("Insufficient data to parse record")]
    InsufficientData,

    /// Record format is invalid
    #[error("Invalid record format")]
    InvalidFormat,

    /// Checksum verification failed
    #[error("Checksum mismatch: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        /// Expected checksum from record
        expected: u32,
        /// Computed checksum
        computed: u32,
    },

    /// Unsupported format version
    #[error("Unsupported record format version: {0}")]
    UnsupportedVersion(u8),
}
