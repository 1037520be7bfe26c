//! Pending transaction table
//!
//! Tracks every InsertTx that has not yet seen a decision and turns the
//! first decision for each into exactly one outcome.
//!
//! ## Lifecycle
//!
//! ```text
//! (none) ──InsertTx──▶ Pending ──commit──▶ Committed (removed, facts emitted)
//!                         │
//!                         └────abort────▶ Aborted   (removed, nothing emitted)
//! ```
//!
//! Decisions for transactions that are not pending (never registered,
//! already decided, rejected at registration, or discarded by a wipe) are
//! ignored. A decision can only refer to an earlier entry, so a decision
//! naming its own index or a later one is ignored as well.
//!
//! Committed facts are resolved with the transaction's own index and with
//! the protocol version that was in effect at the InsertTx, never the
//! decision's.

use kglog_core::{
    resolve_batch, validate_batch, Fact, Feature, InsertTxCommand, LogIndex, PendingTransaction,
    ProtocolVersion, RangeError, TxDecisionCommand,
};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Why a decision had no effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// No pending transaction with that id
    NotPending,
    /// The decision names its own index or a later one
    NotEarlier,
}

/// Result of applying one decision
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionOutcome {
    /// The transaction committed; its facts become visible at `visibility_index`
    Committed {
        /// Transaction id
        tx: LogIndex,
        /// As-of index the facts are visible from (the InsertTx index)
        visibility_index: LogIndex,
        /// Resolved facts in writer order
        facts: Vec<Fact>,
    },
    /// The transaction aborted
    Aborted {
        /// Transaction id
        tx: LogIndex,
        /// Number of facts discarded
        discarded: usize,
    },
    /// The decision had no effect
    Ignored {
        /// Transaction id named by the decision
        tx: LogIndex,
        /// Why
        reason: IgnoreReason,
    },
}

/// In-flight transactions keyed by their InsertTx index
#[derive(Debug, Clone, Default)]
pub struct TransactionTable {
    pending: BTreeMap<LogIndex, PendingTransaction>,
}

impl TransactionTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a table from checkpointed pending transactions
    pub fn restore(pending: Vec<PendingTransaction>) -> Self {
        TransactionTable {
            pending: pending.into_iter().map(|p| (p.tx, p)).collect(),
        }
    }

    /// Register the InsertTx at `tx`, interpreted at `version`.
    ///
    /// The batch is validated as a whole. On error nothing is registered
    /// and a later decision for `tx` is ignored.
    pub fn register(
        &mut self,
        tx: LogIndex,
        version: ProtocolVersion,
        batch: InsertTxCommand,
    ) -> Result<(), RangeError> {
        validate_batch(tx, &batch, Feature::ObjectAnnotations.is_live_at(version))?;

        debug!(tx, version, facts = batch.facts.len(), "Transaction pending");
        self.pending.insert(
            tx,
            PendingTransaction {
                tx,
                version,
                facts: batch.facts,
            },
        );
        Ok(())
    }

    /// Apply the decision found at `decision_index`
    pub fn decide(
        &mut self,
        decision_index: LogIndex,
        decision: &TxDecisionCommand,
    ) -> Result<DecisionOutcome, RangeError> {
        let tx = decision.tx;

        if tx >= decision_index {
            warn!(
                index = decision_index,
                tx, "Decision names a transaction at or after itself, ignoring"
            );
            return Ok(DecisionOutcome::Ignored {
                tx,
                reason: IgnoreReason::NotEarlier,
            });
        }

        let Some(pending) = self.pending.remove(&tx) else {
            debug!(
                index = decision_index,
                tx, "Decision for transaction that is not pending, ignoring"
            );
            return Ok(DecisionOutcome::Ignored {
                tx,
                reason: IgnoreReason::NotPending,
            });
        };

        if !decision.commit {
            return Ok(DecisionOutcome::Aborted {
                tx,
                discarded: pending.facts.len(),
            });
        }

        let annotations_live = Feature::ObjectAnnotations.is_live_at(pending.version);
        let facts = resolve_batch(tx, &pending.facts, annotations_live)?;
        Ok(DecisionOutcome::Committed {
            tx,
            visibility_index: tx,
            facts,
        })
    }

    /// Drop every pending transaction, returning how many were dropped
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    /// Whether `tx` is pending
    pub fn contains(&self, tx: LogIndex) -> bool {
        self.pending.contains_key(&tx)
    }

    /// Pending transaction at `tx`
    pub fn get(&self, tx: LogIndex) -> Option<&PendingTransaction> {
        self.pending.get(&tx)
    }

    /// Number of pending transactions
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Pending transactions in tx order, for checkpointing
    pub fn snapshot(&self) -> Vec<PendingTransaction> {
        self.pending.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kglog_core::{InsertFact, KgObject, Kid, KidOrOffset, ResolvedValue};

    fn batch(facts: Vec<InsertFact>) -> InsertTxCommand {
        InsertTxCommand { facts }
    }

    fn alice() -> InsertFact {
        InsertFact {
            fact_id_offset: 0,
            subject: KidOrOffset::kid(42),
            predicate: KidOrOffset::kid(7),
            object: KgObject::string("Alice"),
        }
    }

    fn commit(tx: LogIndex) -> TxDecisionCommand {
        TxDecisionCommand { tx, commit: true }
    }

    fn abort(tx: LogIndex) -> TxDecisionCommand {
        TxDecisionCommand { tx, commit: false }
    }

    #[test]
    fn test_commit_resolves_with_insert_index() {
        let mut table = TransactionTable::new();
        table.register(1, 1, batch(vec![alice()])).unwrap();

        let outcome = table.decide(2, &commit(1)).unwrap();
        match outcome {
            DecisionOutcome::Committed {
                tx,
                visibility_index,
                facts,
            } => {
                assert_eq!(tx, 1);
                assert_eq!(visibility_index, 1);
                assert_eq!(facts.len(), 1);
                assert_eq!(facts[0].fact_id, Kid(1_000));
                assert_eq!(facts[0].subject, Kid(42));
                assert_eq!(facts[0].predicate, Kid(7));
                assert_eq!(
                    facts[0].object.value,
                    ResolvedValue::String("Alice".to_string())
                );
            }
            other => panic!("expected commit, got {:?}", other),
        }
        assert!(table.is_empty());
    }

    #[test]
    fn test_abort_discards() {
        let mut table = TransactionTable::new();
        table.register(3, 1, batch(vec![alice()])).unwrap();

        assert_eq!(
            table.decide(5, &abort(3)).unwrap(),
            DecisionOutcome::Aborted {
                tx: 3,
                discarded: 1
            }
        );
        assert!(!table.contains(3));
    }

    #[test]
    fn test_first_decision_wins() {
        let mut table = TransactionTable::new();
        table.register(1, 1, batch(vec![alice()])).unwrap();

        assert!(matches!(
            table.decide(2, &abort(1)).unwrap(),
            DecisionOutcome::Aborted { .. }
        ));
        assert_eq!(
            table.decide(3, &commit(1)).unwrap(),
            DecisionOutcome::Ignored {
                tx: 1,
                reason: IgnoreReason::NotPending
            }
        );
    }

    #[test]
    fn test_unknown_tx_ignored() {
        let mut table = TransactionTable::new();
        assert_eq!(
            table.decide(10, &commit(4)).unwrap(),
            DecisionOutcome::Ignored {
                tx: 4,
                reason: IgnoreReason::NotPending
            }
        );
    }

    #[test]
    fn test_decision_must_name_earlier_entry() {
        let mut table = TransactionTable::new();
        table.register(5, 1, batch(vec![alice()])).unwrap();

        for tx in [5, 6] {
            assert_eq!(
                table.decide(5, &commit(tx)).unwrap(),
                DecisionOutcome::Ignored {
                    tx,
                    reason: IgnoreReason::NotEarlier
                }
            );
        }
        assert!(table.contains(5));
    }

    #[test]
    fn test_rejected_batch_not_registered() {
        let mut table = TransactionTable::new();
        let mut bad = alice();
        bad.subject = KidOrOffset::offset(1000);

        assert!(table.register(1, 1, batch(vec![bad])).is_err());
        assert!(table.is_empty());
        assert!(matches!(
            table.decide(2, &commit(1)).unwrap(),
            DecisionOutcome::Ignored { .. }
        ));
    }

    #[test]
    fn test_annotation_gate_uses_insert_version() {
        let mut fact = alice();
        fact.object = KgObject::string("Alicia").with_lang(KidOrOffset::kid(900));

        // Registered at v2, committed after the log moved to v3
        let mut table = TransactionTable::new();
        table.register(1, 2, batch(vec![fact.clone()])).unwrap();
        let DecisionOutcome::Committed { facts, .. } = table.decide(3, &commit(1)).unwrap() else {
            panic!("expected commit");
        };
        assert_eq!(facts[0].object.lang, None);

        let mut table = TransactionTable::new();
        table.register(1, 3, batch(vec![fact])).unwrap();
        let DecisionOutcome::Committed { facts, .. } = table.decide(3, &commit(1)).unwrap() else {
            panic!("expected commit");
        };
        assert_eq!(facts[0].object.lang, Some(Kid(900)));
    }

    #[test]
    fn test_clear_and_snapshot_restore() {
        let mut table = TransactionTable::new();
        table.register(4, 1, batch(vec![alice()])).unwrap();
        table.register(2, 1, batch(vec![alice()])).unwrap();

        let snapshot = table.snapshot();
        assert_eq!(snapshot.iter().map(|p| p.tx).collect::<Vec<_>>(), vec![2, 4]);

        let mut restored = TransactionTable::restore(snapshot);
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.get(4).map(|p| p.version), Some(1));

        assert_eq!(restored.clear(), 2);
        assert!(restored.is_empty());
    }
}
