//! Durability layer for the knowledge-graph command log
//!
//! This crate handles everything that touches bytes or disk:
//!
//! - Codec: `[kind tag][MessagePack map]` command encoding with opaque re-emit
//! - Record: CRC32-framed `(index, payload)` log records
//! - Log streams: the ordered-stream seam, in-memory and file-backed logs
//! - Checkpoints: crash-safe snapshots of resumable replay state

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod codec;
pub mod file_log;
pub mod log;
pub mod memory_log;
pub mod record;

pub use checkpoint::{read_checkpoint, write_checkpoint, CheckpointError, ReplicaCheckpoint};
pub use codec::{decode, encode, kind_tags, peek_kind, EncodeError, EncodedCommand};
pub use file_log::{FileLog, FileLogReader};
pub use log::{LogAppend, LogError, LogStream, LogWriter, FIRST_LOG_INDEX};
pub use memory_log::{MemoryLog, MemorySubscription};
pub use record::{LogRecord, LogRecordError, LOG_RECORD_FORMAT_VERSION};
