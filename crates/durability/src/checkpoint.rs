//! Replica checkpoints
//!
//! A checkpoint captures everything the replay session needs to resume at
//! `applied_through + 1` without re-reading earlier entries: the active
//! protocol version, the wipe watermark and the pending transaction table.
//! Materialized facts belong to the storage collaborator and are not part
//! of it.
//!
//! # File Layout
//!
//! ```text
//! ┌────────────┬──────────────┬────────────┬─────────────────────────┐
//! │ Magic (4)  │ Format (1)   │ CRC32 (4)  │ Body (MessagePack)      │
//! └────────────┴──────────────┴────────────┴─────────────────────────┘
//! ```
//!
//! # Crash Safety
//!
//! 1. Write to a temporary file next to the target
//! 2. fsync the temporary file
//! 3. Atomic rename over the target
//! 4. fsync the parent directory
//!
//! Either the previous checkpoint or the new one is visible, never a mix.

use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher;
use kglog_core::{LogIndex, PendingTransaction, ProtocolVersion};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Magic bytes identifying a checkpoint file: "KGCP"
pub const CHECKPOINT_MAGIC: [u8; 4] = *b"KGCP";

/// Current checkpoint format version
pub const CHECKPOINT_FORMAT_VERSION: u8 = 1;

const HEADER_SIZE: usize = 4 + 1 + 4;

/// Resumable replay state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaCheckpoint {
    /// Last log index the session applied
    pub applied_through: LogIndex,
    /// Protocol version in effect after `applied_through`
    pub active_version: ProtocolVersion,
    /// Index of the most recent wipe, 0 if none
    pub wipe_index: LogIndex,
    /// Undecided transactions, ordered by tx id
    pub pending: Vec<PendingTransaction>,
}

/// Checkpoint errors
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Not a checkpoint file
    #[error("Invalid checkpoint magic")]
    InvalidMagic,

    /// Written by an unknown format version
    #[error("Unsupported checkpoint format version: {0}")]
    UnsupportedVersion(u8),

    /// Content does not match its checksum
    #[error("Checkpoint checksum mismatch: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        /// Stored checksum
        expected: u32,
        /// Computed checksum
        computed: u32,
    },

    /// Body failed to serialize
    #[error("Checkpoint serialization failed: {0}")]
    Serialize(String),

    /// Body failed to parse
    #[error("Checkpoint deserialization failed: {0}")]
    Deserialize(String),
}

impl ReplicaCheckpoint {
    /// Serialize to the on-disk layout
    pub fn to_bytes(&self) -> Result<Vec<u8>, CheckpointError> {
        let body =
            rmp_serde::to_vec_named(self).map_err(|e| CheckpointError::Serialize(e.to_string()))?;

        let mut out = Vec::with_capacity(HEADER_SIZE + body.len());
        out.extend_from_slice(&CHECKPOINT_MAGIC);
        out.push(CHECKPOINT_FORMAT_VERSION);
        out.extend_from_slice(&compute_crc(&body).to_le_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Parse the on-disk layout
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CheckpointError> {
        if bytes.len() < HEADER_SIZE || bytes[0..4] != CHECKPOINT_MAGIC {
            return Err(CheckpointError::InvalidMagic);
        }
        if bytes[4] != CHECKPOINT_FORMAT_VERSION {
            return Err(CheckpointError::UnsupportedVersion(bytes[4]));
        }

        let expected = LittleEndian::read_u32(&bytes[5..9]);
        let body = &bytes[HEADER_SIZE..];
        let computed = compute_crc(body);
        if expected != computed {
            return Err(CheckpointError::ChecksumMismatch { expected, computed });
        }

        rmp_serde::from_slice(body).map_err(|e| CheckpointError::Deserialize(e.to_string()))
    }

    /// Index replay resumes from
    pub fn resume_index(&self) -> LogIndex {
        self.applied_through + 1
    }
}

/// Atomically write a checkpoint to `path`
pub fn write_checkpoint(path: &Path, checkpoint: &ReplicaCheckpoint) -> Result<(), CheckpointError> {
    let bytes = checkpoint.to_bytes()?;
    let temp_path = temp_path_for(path);

    {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }

    std::fs::rename(&temp_path, path)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            File::open(parent)?.sync_all()?;
        }
    }

    debug!(
        path = %path.display(),
        applied_through = checkpoint.applied_through,
        pending = checkpoint.pending.len(),
        "Checkpoint written"
    );
    Ok(())
}

/// Read the checkpoint at `path`, `None` if there is none yet
pub fn read_checkpoint(path: &Path) -> Result<Option<ReplicaCheckpoint>, CheckpointError> {
    match std::fs::read(path) {
        Ok(bytes) => ReplicaCheckpoint::from_bytes(&bytes).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn compute_crc(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}
