//! Replica runner
//!
//! Drains an ordered log stream into a [`ReplaySession`], feeds the
//! collaborators, counts what happened and writes checkpoints at the
//! configured interval.
//!
//! ## Decode Policy
//!
//! - Unknown command kinds are always skipped.
//! - Malformed entries are skipped with a warning unless `strict_decode`
//!   is set, in which case the session halts on them like on any other
//!   fatal condition.

use crate::config::ReplicaConfig;
use crate::error::{EngineError, EngineResult};
use crate::session::{Applied, ReplaySession};
use crate::sink::{LatencySink, StorageSink};
use kglog_core::LogIndex;
use kglog_durability::{read_checkpoint, write_checkpoint, LogRecord, LogStream, FIRST_LOG_INDEX};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Counters for one replica
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Entries consumed, whatever their effect
    pub entries_applied: u64,
    /// Transactions committed
    pub commits: u64,
    /// Facts emitted by commits
    pub facts_committed: u64,
    /// Transactions aborted
    pub aborts: u64,
    /// InsertTx commands rejected
    pub inserts_rejected: u64,
    /// Decisions with no effect
    pub decisions_ignored: u64,
    /// Wipes applied
    pub wipes: u64,
    /// Version commands that moved the version
    pub version_moves: u64,
    /// Version commands ignored
    pub versions_ignored: u64,
    /// Skipped entries and kinds not live at the effective version
    pub skipped: u64,
    /// Entries of a kind this build does not know
    pub unknown_kinds: u64,
    /// Malformed entries skipped
    pub decode_failures: u64,
    /// Pings from this writer
    pub pings_matched: u64,
}

impl ReplayStats {
    fn record(&mut self, applied: &Applied) {
        self.entries_applied += 1;
        match applied {
            Applied::VersionMoved { .. } => self.version_moves += 1,
            Applied::VersionIgnored { .. } => self.versions_ignored += 1,
            Applied::TxPending { .. } => {}
            Applied::TxRejected { .. } => self.inserts_rejected += 1,
            Applied::TxCommitted { facts, .. } => {
                self.commits += 1;
                self.facts_committed += *facts as u64;
            }
            Applied::TxAborted { .. } => self.aborts += 1,
            Applied::DecisionIgnored { .. } => self.decisions_ignored += 1,
            Applied::Wiped { .. } => self.wipes += 1,
            Applied::NotLive { .. } | Applied::Skipped => self.skipped += 1,
            Applied::UnknownKind { .. } => self.unknown_kinds += 1,
            Applied::PingMatched { .. } => self.pings_matched += 1,
            Applied::PingIgnored => {}
        }
    }
}

/// A replay session wired to its collaborators
pub struct Replica<S: StorageSink, L: LatencySink> {
    session: ReplaySession,
    storage: S,
    latency: L,
    config: ReplicaConfig,
    checkpoint_path: Option<PathBuf>,
    since_checkpoint: u64,
    stats: ReplayStats,
}

impl<S: StorageSink, L: LatencySink> Replica<S, L> {
    /// Replica for a fresh log
    pub fn new(config: ReplicaConfig, storage: S, latency: L) -> EngineResult<Self> {
        let session = ReplaySession::new()
            .with_writer_id(config.writer_id_bytes()?)
            .with_strict_decode(config.strict_decode);
        Ok(Replica {
            session,
            storage,
            latency,
            config,
            checkpoint_path: None,
            since_checkpoint: 0,
            stats: ReplayStats::default(),
        })
    }

    /// Replica that checkpoints to `path`, resuming from it if it exists.
    ///
    /// `storage` must already hold the facts materialized up to the
    /// checkpoint.
    pub fn resume(
        config: ReplicaConfig,
        storage: S,
        latency: L,
        path: impl AsRef<Path>,
    ) -> EngineResult<Self> {
        let path = path.as_ref().to_path_buf();
        let writer_id = config.writer_id_bytes()?;

        let session = match read_checkpoint(&path)? {
            Some(checkpoint) => {
                info!(
                    path = %path.display(),
                    applied_through = checkpoint.applied_through,
                    version = checkpoint.active_version,
                    pending = checkpoint.pending.len(),
                    "Resuming from checkpoint"
                );
                ReplaySession::from_checkpoint(checkpoint)?
            }
            None => ReplaySession::new(),
        }
        .with_writer_id(writer_id)
        .with_strict_decode(config.strict_decode);

        Ok(Replica {
            session,
            storage,
            latency,
            config,
            checkpoint_path: Some(path),
            since_checkpoint: 0,
            stats: ReplayStats::default(),
        })
    }

    /// Index the log stream should be read from
    pub fn resume_index(&self) -> LogIndex {
        self.session
            .last_index()
            .map(|i| i + 1)
            .unwrap_or(FIRST_LOG_INDEX)
    }

    /// Apply every currently available record.
    ///
    /// Returns the counters accumulated so far.
    pub fn run(&mut self, stream: &mut dyn LogStream) -> EngineResult<ReplayStats> {
        while let Some(record) = stream.next_record()? {
            self.apply_record(&record)?;
        }
        if self.since_checkpoint > 0 {
            self.checkpoint_now()?;
        }
        Ok(self.stats)
    }

    /// Apply one record
    pub fn apply_record(&mut self, record: &LogRecord) -> EngineResult<()> {
        match self.session.apply_bytes(
            record.index,
            &record.payload,
            &self.storage,
            &self.latency,
        ) {
            Ok(applied) => self.stats.record(&applied),
            Err(EngineError::Decode { index, source }) => {
                warn!(index, error = %source, "Skipping undecodable entry");
                self.stats.entries_applied += 1;
                self.stats.decode_failures += 1;
            }
            Err(e) => return Err(e),
        }

        self.since_checkpoint += 1;
        if self.config.checkpoint_interval > 0
            && self.since_checkpoint >= self.config.checkpoint_interval
        {
            self.checkpoint_now()?;
        }
        Ok(())
    }

    /// Write a checkpoint now, if a checkpoint path is configured
    pub fn checkpoint_now(&mut self) -> EngineResult<()> {
        if let Some(path) = &self.checkpoint_path {
            if self.config.checkpoint_interval > 0 {
                write_checkpoint(path, &self.session.checkpoint())?;
            }
        }
        self.since_checkpoint = 0;
        Ok(())
    }

    /// The replay session
    pub fn session(&self) -> &ReplaySession {
        &self.session
    }

    /// The storage collaborator
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// The latency collaborator
    pub fn latency(&self) -> &L {
        &self.latency
    }

    /// Counters so far
    pub fn stats(&self) -> ReplayStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fact_store::FactStore;
    use crate::sink::NoopLatency;
    use kglog_core::{
        Command, FatalError, InsertFact, InsertTxCommand, KgObject, KidOrOffset,
        TxDecisionCommand,
    };
    use kglog_durability::{codec, LogAppend, LogWriter, MemoryLog};

    #[test]
    fn test_lenient_decode_skips() {
        let mut log = MemoryLog::new();
        log.append_record(LogRecord::new(1, vec![codec::kind_tags::VERSION, 0xc1]))
            .unwrap();
        log.append_record(LogRecord::new(2, codec::encode(&Command::Skipped).unwrap()))
            .unwrap();

        let mut replica =
            Replica::new(ReplicaConfig::default(), FactStore::new(), NoopLatency).unwrap();
        let stats = replica.run(&mut log.subscribe_from(1)).unwrap();
        assert_eq!(stats.decode_failures, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.entries_applied, 2);
    }

    #[test]
    fn test_strict_decode_stops() {
        let mut log = MemoryLog::new();
        log.append_record(LogRecord::new(1, vec![codec::kind_tags::VERSION, 0xc1]))
            .unwrap();

        let config = ReplicaConfig {
            strict_decode: true,
            ..ReplicaConfig::default()
        };
        let mut replica = Replica::new(config, FactStore::new(), NoopLatency).unwrap();
        assert!(matches!(
            replica.run(&mut log.subscribe_from(1)),
            Err(EngineError::Fatal(FatalError::Undecodable { index: 1, .. }))
        ));
    }

    #[test]
    fn test_strict_decode_failure_stays_fatal() {
        let log = MemoryLog::new();
        let mut writer = LogWriter::new(log.clone());
        writer
            .append(&Command::InsertTx(InsertTxCommand {
                facts: vec![InsertFact {
                    fact_id_offset: 0,
                    subject: KidOrOffset::kid(42),
                    predicate: KidOrOffset::kid(7),
                    object: KgObject::int(1),
                }],
            }))
            .unwrap();
        writer
            .append_raw(vec![codec::kind_tags::TX_DECISION, 0xc1])
            .unwrap();
        writer
            .append(&Command::TxDecision(TxDecisionCommand { tx: 1, commit: true }))
            .unwrap();

        let config = ReplicaConfig {
            strict_decode: true,
            ..ReplicaConfig::default()
        };
        let mut replica = Replica::new(config, FactStore::new(), NoopLatency).unwrap();
        let mut stream = log.subscribe_from(1);

        assert!(replica.run(&mut stream).unwrap_err().is_fatal());
        // Retrying on the same stream must not move past the bad entry
        assert!(replica.run(&mut stream).unwrap_err().is_fatal());
        assert!(replica.session().is_halted());
        assert_eq!(replica.session().last_index(), Some(1));
        assert!(replica.storage().is_empty());
    }

    #[test]
    fn test_unknown_kind_counted_not_failed() {
        let log = MemoryLog::new();
        let mut writer = LogWriter::new(log.clone());
        writer.append_raw(vec![0x70, 0x80]).unwrap();

        let config = ReplicaConfig {
            strict_decode: true,
            ..ReplicaConfig::default()
        };
        let mut replica = Replica::new(config, FactStore::new(), NoopLatency).unwrap();
        let stats = replica.run(&mut log.subscribe_from(1)).unwrap();
        assert_eq!(stats.unknown_kinds, 1);
    }

    #[test]
    fn test_invalid_writer_id_rejected() {
        let config = ReplicaConfig {
            writer_id: Some("xyz".to_string()),
            ..ReplicaConfig::default()
        };
        assert!(Replica::new(config, FactStore::new(), NoopLatency).is_err());
    }

    #[test]
    fn test_resume_index_fresh() {
        let replica =
            Replica::new(ReplicaConfig::default(), FactStore::new(), NoopLatency).unwrap();
        assert_eq!(replica.resume_index(), FIRST_LOG_INDEX);
    }
}
