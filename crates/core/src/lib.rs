//! Core types for the knowledge-graph command log
//!
//! This crate defines the foundational types every replica and writer shares:
//! - LogIndex / Kid: timeline coordinate and permanent identifiers
//! - KidOrOffset, KgObject, KgTimestamp: the graph data model
//! - Command: the closed set of log command kinds and their payloads
//! - Fact / PendingTransaction: materialized and in-flight transaction data
//! - kid: deterministic offset-to-KID resolution
//! - version: protocol versions and version-gated features
//! - Error: DecodeError, RangeError, UnsupportedVersionError, HistoryWipedError

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod error;
pub mod fact;
pub mod kid;
pub mod limits;
pub mod timestamp;
pub mod types;
pub mod version;

pub use command::{
    Command, InsertFact, InsertTxCommand, LogEntry, PingCommand, TxDecisionCommand,
    VersionCommand,
};
pub use error::{
    DecodeError, FatalError, HistoryWipedError, KgError, KgResult, RangeError,
    UnsupportedVersionError,
};
pub use fact::{Fact, PendingTransaction, ResolvedObject, ResolvedValue};
pub use kid::{derive_kid, resolve, resolve_batch, resolve_fact, validate_batch};
pub use timestamp::{KgTimestamp, TimestampPrecision};
pub use types::{KgObject, Kid, KidOrOffset, LogIndex, ObjectValue};
pub use version::{Feature, ProtocolVersion, INITIAL_VERSION, MAX_SUPPORTED_VERSION};
