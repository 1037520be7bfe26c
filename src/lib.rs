//! kglog - deterministic command-log replay for a knowledge-graph store
//!
//! Every replica of the graph consumes the same totally ordered log of
//! commands and must derive byte-identical state from it. This crate ties
//! the layers together:
//!
//! ```text
//! ┌──────────────┐   records   ┌────────────────┐   facts   ┌─────────────┐
//! │  FileLog /   │ ──────────► │  ReplaySession │ ────────► │ StorageSink │
//! │  MemoryLog   │             │  (dispatcher)  │           │ (FactStore) │
//! └──────────────┘             └────────────────┘           └─────────────┘
//!                                │    │     │
//!                     VersionGate  TxTable  WatermarkTracker
//! ```
//!
//! The member crates are re-exported here so callers only need one
//! dependency.

pub mod render;

pub use kglog_concurrency::{DecisionOutcome, IgnoreReason, TransactionTable};
pub use kglog_core::*;
pub use kglog_durability::{
    codec, read_checkpoint, write_checkpoint, CheckpointError, FileLog, FileLogReader, LogAppend,
    LogError, LogRecord, LogStream, LogWriter, MemoryLog, MemorySubscription, ReplicaCheckpoint,
    FIRST_LOG_INDEX,
};
pub use kglog_engine::{
    Applied, EngineError, EngineResult, FactStore, LatencySink, NoopLatency, RecordingLatency,
    ReplayStats, Replica, ReplicaConfig, ReplaySession, StorageSink, VersionGate, VersionMove,
    WatermarkTracker, CONFIG_FILE_NAME,
};
