//! Materialized facts and pending transactions
//!
//! A [`Fact`] only exists once its transaction is known to commit. Until
//! then the writer's batch is held as a [`PendingTransaction`] with all
//! references still in offset form.

use crate::command::InsertFact;
use crate::timestamp::KgTimestamp;
use crate::types::{Kid, LogIndex};
use crate::version::ProtocolVersion;
use serde::{Deserialize, Serialize};

/// Object value with every offset resolved to a KID
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedValue {
    /// UTF-8 text
    String(String),
    /// IEEE-754 double
    Float(f64),
    /// Signed 64-bit integer
    Int(i64),
    /// Instant with precision
    Timestamp(KgTimestamp),
    /// Boolean literal
    Bool(bool),
    /// Entity reference
    Kid(Kid),
}

/// Fully resolved object position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedObject {
    /// The literal or reference
    pub value: ResolvedValue,
    /// Unit entity, if live and present
    pub unit: Option<Kid>,
    /// Language entity, if live and present
    pub lang: Option<Kid>,
}

impl ResolvedObject {
    /// Object without annotations
    pub fn plain(value: ResolvedValue) -> Self {
        ResolvedObject {
            value,
            unit: None,
            lang: None,
        }
    }
}

/// A committed fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// The fact's own identifier
    pub fact_id: Kid,
    /// Subject entity
    pub subject: Kid,
    /// Predicate entity
    pub predicate: Kid,
    /// Object
    pub object: ResolvedObject,
}

/// Transaction registered by an InsertTx and awaiting its decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTransaction {
    /// Log index of the InsertTx, which is also the transaction id
    pub tx: LogIndex,
    /// Protocol version the InsertTx was interpreted at
    pub version: ProtocolVersion,
    /// Facts as written, references unresolved
    pub facts: Vec<InsertFact>,
}
