//! Typed log commands
//!
//! Every log entry carries exactly one [`Command`]. Payload structs are the
//! units the wire codec serializes; the enum is the closed set of kinds this
//! build understands.

use crate::types::{KgObject, KidOrOffset, LogIndex};
use serde::{Deserialize, Serialize};

/// Declares the protocol version effective strictly after this entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionCommand {
    /// Target version
    pub move_to_version: i32,
}

/// One fact of an uncommitted transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertFact {
    /// Offset the fact's own id is derived from
    pub fact_id_offset: i32,
    /// Subject entity
    pub subject: KidOrOffset,
    /// Predicate entity
    pub predicate: KidOrOffset,
    /// Object literal or reference
    pub object: KgObject,
}

/// An uncommitted transaction. Its own log index is the transaction id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InsertTxCommand {
    /// Facts in writer order
    pub facts: Vec<InsertFact>,
}

/// Commit or abort of an earlier InsertTx
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxDecisionCommand {
    /// Log index of the InsertTx being decided
    pub tx: LogIndex,
    /// `true` commits, `false` aborts
    pub commit: bool,
}

/// Opaque writer-correlation marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingCommand {
    /// Identity of the writer that issued the ping
    #[serde(with = "serde_bytes_compat")]
    pub writer: Vec<u8>,
    /// Writer-local sequence number
    pub seq: u64,
}

/// Closed set of command kinds
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Protocol version move
    Version(VersionCommand),
    /// Uncommitted transaction
    InsertTx(InsertTxCommand),
    /// Transaction outcome
    TxDecision(TxDecisionCommand),
    /// Discard all state
    Wipe,
    /// Placeholder entry with no effect
    Skipped,
    /// Writer latency probe
    Ping(PingCommand),
}

impl Command {
    /// Short name used in logs and diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Command::Version(_) => "version",
            Command::InsertTx(_) => "insert_tx",
            Command::TxDecision(_) => "tx_decision",
            Command::Wipe => "wipe",
            Command::Skipped => "skipped",
            Command::Ping(_) => "ping",
        }
    }
}

/// A command together with the log index it was delivered at
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Position in the log
    pub index: LogIndex,
    /// The decoded command
    pub command: Command,
}

impl LogEntry {
    /// Pair a command with its index
    pub fn new(index: LogIndex, command: Command) -> Self {
        LogEntry { index, command }
    }
}

/// Encode `Vec<u8>` as a binary blob rather than a sequence of integers.
mod serde_bytes_compat {
    use serde::de::{self, SeqAccess, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        struct BytesVisitor;

        impl<'de> Visitor<'de> for BytesVisitor {
            type Value = Vec<u8>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a byte string")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Vec<u8>, E> {
                Ok(v.to_vec())
            }

            fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Vec<u8>, E> {
                Ok(v)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<u8>, A::Error> {
                let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(b) = seq.next_element::<u8>()? {
                    out.push(b);
                }
                Ok(out)
            }
        }

        deserializer.deserialize_byte_buf(BytesVisitor)
    }
}
