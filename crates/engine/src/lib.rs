//! Replay engine for the knowledge-graph command log
//!
//! The engine turns an ordered stream of log records into materialized,
//! as-of-readable graph state:
//! - ReplaySession: the dispatcher and all per-replica derived state
//! - VersionGate / WatermarkTracker: protocol version and wipe tracking
//! - StorageSink / LatencySink: collaborator seams
//! - FactStore: reference in-memory as-of store
//! - Replica: stream runner with statistics and checkpoints
//! - ReplicaConfig: `kglog.toml` configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod fact_store;
pub mod replica;
pub mod session;
pub mod sink;
pub mod version_gate;
pub mod watermark;

pub use config::{ReplicaConfig, CONFIG_FILE_NAME};
pub use error::{EngineError, EngineResult};
pub use fact_store::FactStore;
pub use replica::{ReplayStats, Replica};
pub use session::{Applied, ReplaySession};
pub use sink::{LatencySink, NoopLatency, RecordingLatency, StorageSink};
pub use version_gate::{VersionGate, VersionMove};
pub use watermark::WatermarkTracker;
