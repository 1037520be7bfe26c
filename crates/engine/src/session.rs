//! Replay session (dispatcher)
//!
//! One [`ReplaySession`] owns all derived state of one replica: the active
//! protocol version, the pending transaction table and the wipe watermark.
//! Entries are applied one at a time in strictly increasing index order.
//!
//! ## Routing
//!
//! ```text
//! bytes ─▶ decode ─▶ version gate ─┬─ Version    ─▶ gate
//!                                  ├─ InsertTx   ─▶ transaction table (pending)
//!                                  ├─ TxDecision ─▶ transaction table ─▶ storage
//!                                  ├─ Wipe       ─▶ watermark, table, storage
//!                                  ├─ Skipped    ─▶ (nothing)
//!                                  └─ Ping       ─▶ latency sink if ours
//! ```
//!
//! ## Fatal Latch
//!
//! A Version command beyond what this build supports halts the session, as
//! does an undecodable entry when strict decoding is on. The error is latched: every later call returns it again and no state
//! changes, so a caller cannot replay past it by ignoring the error.

use crate::error::{EngineError, EngineResult};
use crate::sink::{LatencySink, StorageSink};
use crate::version_gate::{VersionGate, VersionMove};
use crate::watermark::WatermarkTracker;
use kglog_concurrency::{DecisionOutcome, IgnoreReason, TransactionTable};
use kglog_core::{
    Command, DecodeError, FatalError, HistoryWipedError, LogIndex, ProtocolVersion, RangeError,
    UnsupportedVersionError, MAX_SUPPORTED_VERSION,
};
use kglog_durability::{codec, ReplicaCheckpoint, FIRST_LOG_INDEX};
use tracing::{debug, error, info, warn};

/// What applying one entry did
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// Active version moved forward
    VersionMoved {
        /// Previous version
        from: ProtocolVersion,
        /// New version
        to: ProtocolVersion,
    },
    /// Version command asked for the current or an older version
    VersionIgnored {
        /// Requested version
        requested: ProtocolVersion,
    },
    /// InsertTx registered as pending
    TxPending {
        /// Transaction id
        tx: LogIndex,
        /// Facts staged
        facts: usize,
    },
    /// InsertTx rejected as a whole
    TxRejected {
        /// Transaction id
        tx: LogIndex,
        /// Why
        error: RangeError,
    },
    /// Transaction committed and its facts emitted
    TxCommitted {
        /// Transaction id, also the visibility index
        tx: LogIndex,
        /// Facts emitted
        facts: usize,
    },
    /// Transaction aborted
    TxAborted {
        /// Transaction id
        tx: LogIndex,
    },
    /// Decision had no effect
    DecisionIgnored {
        /// Transaction id named by the decision
        tx: LogIndex,
        /// Why
        reason: IgnoreReason,
    },
    /// State wiped
    Wiped {
        /// Pending transactions dropped
        dropped_pending: usize,
    },
    /// Command kind not live at the effective version
    NotLive {
        /// Command kind
        kind: &'static str,
    },
    /// Skipped entry
    Skipped,
    /// Command kind this build does not know
    UnknownKind {
        /// Raw tag
        tag: u8,
    },
    /// Ping from this writer forwarded to the latency sink
    PingMatched {
        /// Writer sequence number
        seq: u64,
    },
    /// Ping from another writer
    PingIgnored,
}

/// Deterministic replay state of one replica
#[derive(Debug, Clone, Default)]
pub struct ReplaySession {
    gate: VersionGate,
    transactions: TransactionTable,
    watermark: WatermarkTracker,
    writer_id: Option<Vec<u8>>,
    strict_decode: bool,
    last_index: Option<LogIndex>,
    fatal: Option<FatalError>,
}

impl ReplaySession {
    /// Session for a fresh log
    pub fn new() -> Self {
        Self::default()
    }

    /// Set this process's writer identity for ping matching
    pub fn with_writer_id(mut self, writer_id: Option<Vec<u8>>) -> Self {
        self.writer_id = writer_id;
        self
    }

    /// Halt on undecodable entries instead of consuming them
    pub fn with_strict_decode(mut self, strict: bool) -> Self {
        self.strict_decode = strict;
        self
    }

    /// Resume from a checkpoint
    pub fn from_checkpoint(checkpoint: ReplicaCheckpoint) -> EngineResult<Self> {
        if checkpoint.active_version > MAX_SUPPORTED_VERSION {
            return Err(EngineError::Fatal(FatalError::UnsupportedVersion(
                UnsupportedVersionError {
                    index: checkpoint.applied_through,
                    requested: checkpoint.active_version,
                    supported: MAX_SUPPORTED_VERSION,
                },
            )));
        }

        let wipe_index = (checkpoint.wipe_index > 0).then_some(checkpoint.wipe_index);
        Ok(ReplaySession {
            gate: VersionGate::at(checkpoint.active_version),
            transactions: TransactionTable::restore(checkpoint.pending),
            watermark: WatermarkTracker::restore(wipe_index),
            writer_id: None,
            strict_decode: false,
            last_index: (checkpoint.applied_through > 0).then_some(checkpoint.applied_through),
            fatal: None,
        })
    }

    /// Capture resumable state
    pub fn checkpoint(&self) -> ReplicaCheckpoint {
        ReplicaCheckpoint {
            applied_through: self.last_index.unwrap_or(0),
            active_version: self.gate.active(),
            wipe_index: self.watermark.wipe_index().unwrap_or(0),
            pending: self.transactions.snapshot(),
        }
    }

    /// Decode and apply the entry at `index`.
    ///
    /// Unknown command kinds are consumed and ignored. Any other decode
    /// failure consumes the index and is returned as [`EngineError::Decode`].
    /// With strict decoding it halts the session instead and the index is
    /// not consumed.
    pub fn apply_bytes(
        &mut self,
        index: LogIndex,
        bytes: &[u8],
        storage: &dyn StorageSink,
        latency: &dyn LatencySink,
    ) -> EngineResult<Applied> {
        self.check_entry(index)?;

        match codec::decode(bytes) {
            Ok(encoded) => self.dispatch(index, encoded.command(), storage, latency),
            Err(DecodeError::UnknownKind { tag }) => {
                warn!(index, tag, "Unknown command kind, ignoring");
                self.last_index = Some(index);
                Ok(Applied::UnknownKind { tag })
            }
            Err(source) if self.strict_decode => {
                error!(index, error = %source, "Undecodable entry, halting replay");
                let fatal = FatalError::Undecodable { index, source };
                self.fatal = Some(fatal.clone());
                Err(EngineError::Fatal(fatal))
            }
            Err(source) => {
                self.last_index = Some(index);
                Err(EngineError::Decode { index, source })
            }
        }
    }

    /// Apply an already-decoded command at `index`
    pub fn apply(
        &mut self,
        index: LogIndex,
        command: &Command,
        storage: &dyn StorageSink,
        latency: &dyn LatencySink,
    ) -> EngineResult<Applied> {
        self.check_entry(index)?;
        self.dispatch(index, command, storage, latency)
    }

    fn check_entry(&self, index: LogIndex) -> EngineResult<()> {
        if let Some(fatal) = &self.fatal {
            return Err(EngineError::Fatal(fatal.clone()));
        }
        if index < FIRST_LOG_INDEX {
            return Err(EngineError::InvalidIndex { index });
        }
        if let Some(previous) = self.last_index {
            if index <= previous {
                return Err(EngineError::OutOfOrder { previous, index });
            }
        }
        Ok(())
    }

    fn dispatch(
        &mut self,
        index: LogIndex,
        command: &Command,
        storage: &dyn StorageSink,
        latency: &dyn LatencySink,
    ) -> EngineResult<Applied> {
        let version = self.gate.active();

        if !self.gate.admits(command) {
            warn!(
                index,
                version,
                kind = command.kind_name(),
                "Command kind not live at this version, ignoring"
            );
            self.last_index = Some(index);
            return Ok(Applied::NotLive {
                kind: command.kind_name(),
            });
        }

        let applied = match command {
            Command::Version(cmd) => match self.gate.on_version_command(index, cmd) {
                Ok(VersionMove::Upgraded { from, to }) => {
                    info!(index, from, to, "Protocol version moved");
                    Applied::VersionMoved { from, to }
                }
                Ok(VersionMove::Ignored { active, requested }) => {
                    warn!(
                        index,
                        active, requested, "Version command does not move forward, ignoring"
                    );
                    Applied::VersionIgnored { requested }
                }
                Err(e) => {
                    error!(
                        index,
                        requested = e.requested,
                        supported = e.supported,
                        "Log requires a newer build, halting replay"
                    );
                    let fatal = FatalError::from(e);
                    self.fatal = Some(fatal.clone());
                    return Err(EngineError::Fatal(fatal));
                }
            },

            Command::InsertTx(batch) => {
                let facts = batch.facts.len();
                match self.transactions.register(index, version, batch.clone()) {
                    Ok(()) => Applied::TxPending { tx: index, facts },
                    Err(error) => {
                        warn!(index, error = %error, "Rejecting InsertTx");
                        Applied::TxRejected { tx: index, error }
                    }
                }
            }

            Command::TxDecision(decision) => match self.transactions.decide(index, decision) {
                Ok(DecisionOutcome::Committed {
                    tx,
                    visibility_index,
                    facts,
                }) => {
                    let count = facts.len();
                    debug!(index, tx, facts = count, "Transaction committed");
                    storage.apply_commit(visibility_index, facts);
                    Applied::TxCommitted { tx, facts: count }
                }
                Ok(DecisionOutcome::Aborted { tx, discarded }) => {
                    debug!(index, tx, discarded, "Transaction aborted");
                    storage.apply_abort(tx);
                    Applied::TxAborted { tx }
                }
                Ok(DecisionOutcome::Ignored { tx, reason }) => {
                    Applied::DecisionIgnored { tx, reason }
                }
                Err(error) => {
                    // Batches are validated at registration
                    warn!(index, tx = decision.tx, error = %error, "Commit failed to resolve");
                    Applied::TxRejected {
                        tx: decision.tx,
                        error,
                    }
                }
            },

            Command::Wipe => {
                let dropped_pending = self.transactions.clear();
                self.watermark.on_wipe(index);
                storage.apply_wipe(index);
                info!(index, dropped_pending, "State wiped");
                Applied::Wiped { dropped_pending }
            }

            Command::Skipped => Applied::Skipped,

            Command::Ping(ping) => {
                if self.writer_id.as_deref() == Some(ping.writer.as_slice()) {
                    latency.observe(ping.seq, index);
                    Applied::PingMatched { seq: ping.seq }
                } else {
                    Applied::PingIgnored
                }
            }
        };

        debug!(index, version, kind = command.kind_name(), "Applied entry");
        self.last_index = Some(index);
        Ok(applied)
    }

    /// Fail if a read as of `as_of` falls below the wipe watermark
    pub fn check_read(&self, as_of: LogIndex) -> Result<(), HistoryWipedError> {
        self.watermark.check_read(as_of)
    }

    /// Version that applies to the next entry
    pub fn active_version(&self) -> ProtocolVersion {
        self.gate.active()
    }

    /// Index of the most recent wipe
    pub fn wipe_index(&self) -> Option<LogIndex> {
        self.watermark.wipe_index()
    }

    /// Last index consumed
    pub fn last_index(&self) -> Option<LogIndex> {
        self.last_index
    }

    /// Number of undecided transactions
    pub fn pending_count(&self) -> usize {
        self.transactions.len()
    }

    /// Whether `tx` is undecided
    pub fn is_pending(&self, tx: LogIndex) -> bool {
        self.transactions.contains(tx)
    }

    /// The latched fatal error, if replay halted
    pub fn fatal(&self) -> Option<&FatalError> {
        self.fatal.as_ref()
    }

    /// Whether replay halted
    pub fn is_halted(&self) -> bool {
        self.fatal.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fact_store::FactStore;
    use crate::sink::{NoopLatency, RecordingLatency};
    use kglog_core::{
        InsertFact, InsertTxCommand, KgObject, KidOrOffset, PingCommand, TxDecisionCommand,
        VersionCommand,
    };

    fn insert(facts: Vec<InsertFact>) -> Command {
        Command::InsertTx(InsertTxCommand { facts })
    }

    fn fact(offset: i32) -> InsertFact {
        InsertFact {
            fact_id_offset: offset,
            subject: KidOrOffset::kid(42),
            predicate: KidOrOffset::kid(7),
            object: KgObject::int(offset as i64),
        }
    }

    fn decide(tx: LogIndex, commit: bool) -> Command {
        Command::TxDecision(TxDecisionCommand { tx, commit })
    }

    fn version(v: ProtocolVersion) -> Command {
        Command::Version(VersionCommand { move_to_version: v })
    }

    #[test]
    fn test_indexes_must_increase() {
        let store = FactStore::new();
        let mut session = ReplaySession::new();
        session.apply(3, &Command::Skipped, &store, &NoopLatency).unwrap();

        for index in [3, 2] {
            assert!(matches!(
                session.apply(index, &Command::Skipped, &store, &NoopLatency),
                Err(EngineError::OutOfOrder { previous: 3, .. })
            ));
        }
        session.apply(7, &Command::Skipped, &store, &NoopLatency).unwrap();
        assert_eq!(session.last_index(), Some(7));
    }

    #[test]
    fn test_fatal_is_latched() {
        let store = FactStore::new();
        let mut session = ReplaySession::new();
        session.apply(1, &insert(vec![fact(0)]), &store, &NoopLatency).unwrap();

        let err = session
            .apply(2, &version(MAX_SUPPORTED_VERSION + 1), &store, &NoopLatency)
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(session.is_halted());

        // Nothing after the fatal entry is applied
        let again = session
            .apply(3, &decide(1, true), &store, &NoopLatency)
            .unwrap_err();
        assert!(again.is_fatal());
        assert!(store.is_empty());
        assert!(session.is_pending(1));
        assert_eq!(session.last_index(), Some(1));
    }

    #[test]
    fn test_rejected_insert_leaves_nothing_pending() {
        let store = FactStore::new();
        let mut session = ReplaySession::new();
        let applied = session
            .apply(1, &insert(vec![fact(4), fact(4)]), &store, &NoopLatency)
            .unwrap();
        assert!(matches!(
            applied,
            Applied::TxRejected {
                tx: 1,
                error: RangeError::DuplicateFactOffset { offset: 4 }
            }
        ));
        assert_eq!(session.pending_count(), 0);

        assert!(matches!(
            session.apply(2, &decide(1, true), &store, &NoopLatency).unwrap(),
            Applied::DecisionIgnored { .. }
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_wipe_not_live_at_v1() {
        let store = FactStore::new();
        let mut session = ReplaySession::new();
        session.apply(1, &insert(vec![fact(0)]), &store, &NoopLatency).unwrap();

        assert_eq!(
            session.apply(2, &Command::Wipe, &store, &NoopLatency).unwrap(),
            Applied::NotLive { kind: "wipe" }
        );
        assert!(session.is_pending(1));
        assert_eq!(session.wipe_index(), None);
    }

    #[test]
    fn test_wipe_clears_pending() {
        let store = FactStore::new();
        let mut session = ReplaySession::new();
        session.apply(1, &version(2), &store, &NoopLatency).unwrap();
        session.apply(2, &insert(vec![fact(0)]), &store, &NoopLatency).unwrap();
        session.apply(3, &insert(vec![fact(0)]), &store, &NoopLatency).unwrap();
        session.apply(4, &decide(2, true), &store, &NoopLatency).unwrap();

        assert_eq!(
            session.apply(5, &Command::Wipe, &store, &NoopLatency).unwrap(),
            Applied::Wiped { dropped_pending: 1 }
        );
        assert_eq!(session.pending_count(), 0);
        assert!(session.check_read(4).is_err());
        assert!(session.check_read(5).is_ok());
        assert!(store.is_empty());

        // Decision for a transaction dropped by the wipe
        assert!(matches!(
            session.apply(6, &decide(3, true), &store, &NoopLatency).unwrap(),
            Applied::DecisionIgnored { tx: 3, .. }
        ));
    }

    #[test]
    fn test_ping_matching() {
        let store = FactStore::new();
        let latency = RecordingLatency::new();
        let mut session = ReplaySession::new().with_writer_id(Some(vec![0xaa]));

        let ours = Command::Ping(PingCommand {
            writer: vec![0xaa],
            seq: 9,
        });
        let theirs = Command::Ping(PingCommand {
            writer: vec![0xbb],
            seq: 10,
        });

        assert_eq!(
            session.apply(4, &ours, &store, &latency).unwrap(),
            Applied::PingMatched { seq: 9 }
        );
        assert_eq!(
            session.apply(5, &theirs, &store, &latency).unwrap(),
            Applied::PingIgnored
        );
        assert_eq!(latency.observed(), vec![(9, 4)]);
    }

    #[test]
    fn test_ping_ignored_without_identity() {
        let store = FactStore::new();
        let latency = RecordingLatency::new();
        let mut session = ReplaySession::new();
        let ping = Command::Ping(PingCommand {
            writer: Vec::new(),
            seq: 1,
        });
        assert_eq!(
            session.apply(1, &ping, &store, &latency).unwrap(),
            Applied::PingIgnored
        );
        assert!(latency.observed().is_empty());
    }

    #[test]
    fn test_unknown_kind_consumed() {
        let store = FactStore::new();
        let mut session = ReplaySession::new();
        assert_eq!(
            session
                .apply_bytes(1, &[0x99, 0x80], &store, &NoopLatency)
                .unwrap(),
            Applied::UnknownKind { tag: 0x99 }
        );
        assert_eq!(session.last_index(), Some(1));
    }

    #[test]
    fn test_malformed_entry_consumes_index() {
        let store = FactStore::new();
        let mut session = ReplaySession::new();
        let err = session
            .apply_bytes(1, &[codec::kind_tags::INSERT_TX, 0xc1], &store, &NoopLatency)
            .unwrap_err();
        assert!(matches!(err, EngineError::Decode { index: 1, .. }));
        assert_eq!(session.last_index(), Some(1));

        let ok = codec::encode(&Command::Skipped).unwrap();
        assert_eq!(
            session.apply_bytes(2, &ok, &store, &NoopLatency).unwrap(),
            Applied::Skipped
        );
    }

    #[test]
    fn test_strict_malformed_entry_halts() {
        let store = FactStore::new();
        let mut session = ReplaySession::new().with_strict_decode(true);
        session
            .apply(1, &insert(vec![fact(0)]), &store, &NoopLatency)
            .unwrap();

        let err = session
            .apply_bytes(2, &[codec::kind_tags::TX_DECISION, 0xc1], &store, &NoopLatency)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Fatal(FatalError::Undecodable { index: 2, .. })
        ));
        assert!(session.is_halted());
        assert_eq!(session.last_index(), Some(1));

        let commit = codec::encode(&decide(1, true)).unwrap();
        assert!(session
            .apply_bytes(3, &commit, &store, &NoopLatency)
            .unwrap_err()
            .is_fatal());
        assert!(store.is_empty());
        assert!(session.is_pending(1));
    }

    #[test]
    fn test_strict_still_skips_unknown_kind() {
        let store = FactStore::new();
        let mut session = ReplaySession::new().with_strict_decode(true);
        assert_eq!(
            session
                .apply_bytes(1, &[0x99, 0x80], &store, &NoopLatency)
                .unwrap(),
            Applied::UnknownKind { tag: 0x99 }
        );
        assert!(!session.is_halted());
    }

    #[test]
    fn test_index_zero_rejected() {
        let store = FactStore::new();
        let mut session = ReplaySession::new();
        assert!(matches!(
            session.apply(0, &Command::Wipe, &store, &NoopLatency),
            Err(EngineError::InvalidIndex { index: 0 })
        ));
        assert_eq!(session.last_index(), None);
        assert_eq!(session.wipe_index(), None);
        assert!(session
            .apply_bytes(0, &codec::encode(&Command::Skipped).unwrap(), &store, &NoopLatency)
            .is_err());
    }

    #[test]
    fn test_checkpoint_roundtrip() {
        let store = FactStore::new();
        let mut session = ReplaySession::new();
        session.apply(1, &version(3), &store, &NoopLatency).unwrap();
        session.apply(2, &Command::Wipe, &store, &NoopLatency).unwrap();
        session.apply(3, &insert(vec![fact(0)]), &store, &NoopLatency).unwrap();

        let checkpoint = session.checkpoint();
        assert_eq!(checkpoint.applied_through, 3);
        assert_eq!(checkpoint.active_version, 3);
        assert_eq!(checkpoint.wipe_index, 2);
        assert_eq!(checkpoint.pending.len(), 1);

        let restored = ReplaySession::from_checkpoint(checkpoint).unwrap();
        assert_eq!(restored.active_version(), 3);
        assert_eq!(restored.wipe_index(), Some(2));
        assert!(restored.is_pending(3));
        assert_eq!(restored.last_index(), Some(3));
    }

    #[test]
    fn test_checkpoint_from_newer_build_rejected() {
        let checkpoint = ReplicaCheckpoint {
            applied_through: 10,
            active_version: MAX_SUPPORTED_VERSION + 1,
            wipe_index: 0,
            pending: Vec::new(),
        };
        assert!(ReplaySession::from_checkpoint(checkpoint)
            .unwrap_err()
            .is_fatal());
    }
}
