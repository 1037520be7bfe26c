//! Exactly-once decision properties
//!
//! Random interleavings of inserts and decisions never produce more than
//! one effective outcome per transaction, and committed facts always carry
//! their InsertTx index as visibility index.

use kglog_concurrency::{DecisionOutcome, TransactionTable};
use kglog_core::{InsertFact, InsertTxCommand, KgObject, KidOrOffset, TxDecisionCommand};
use proptest::prelude::*;
use std::collections::HashMap;

#[derive(Debug, Clone)]
enum Step {
    Insert,
    Decide { back: u64, commit: bool },
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Insert),
        (0u64..8, any::<bool>()).prop_map(|(back, commit)| Step::Decide { back, commit }),
    ]
}

fn one_fact() -> InsertTxCommand {
    InsertTxCommand {
        facts: vec![InsertFact {
            fact_id_offset: 0,
            subject: KidOrOffset::offset(1),
            predicate: KidOrOffset::kid(3),
            object: KgObject::int(1),
        }],
    }
}

proptest! {
    #[test]
    fn prop_at_most_one_outcome_per_tx(steps in prop::collection::vec(step(), 1..60)) {
        let mut table = TransactionTable::new();
        let mut effective: HashMap<u64, usize> = HashMap::new();
        let mut inserted = Vec::new();

        for (i, s) in steps.into_iter().enumerate() {
            let index = i as u64 + 1;
            match s {
                Step::Insert => {
                    table.register(index, 1, one_fact()).unwrap();
                    inserted.push(index);
                }
                Step::Decide { back, commit } => {
                    let tx = index.saturating_sub(back);
                    let outcome = table.decide(index, &TxDecisionCommand { tx, commit }).unwrap();
                    match outcome {
                        DecisionOutcome::Committed { tx, visibility_index, facts } => {
                            prop_assert_eq!(visibility_index, tx);
                            prop_assert_eq!(facts[0].fact_id.as_u64(), tx * 1000);
                            *effective.entry(tx).or_default() += 1;
                        }
                        DecisionOutcome::Aborted { tx, .. } => {
                            *effective.entry(tx).or_default() += 1;
                        }
                        DecisionOutcome::Ignored { .. } => {}
                    }
                }
            }
        }

        for (tx, count) in &effective {
            prop_assert!(inserted.contains(tx));
            prop_assert_eq!(*count, 1);
        }
        prop_assert_eq!(table.len() + effective.len(), inserted.len());
    }
}
