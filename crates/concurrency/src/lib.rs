//! Transaction layer for the knowledge-graph command log
//!
//! Writers stage facts with an InsertTx entry and settle them later with a
//! TxDecision entry. This crate holds the staged batches between the two and
//! applies each transaction's first decision exactly once.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod table;

pub use table::{DecisionOutcome, IgnoreReason, TransactionTable};
