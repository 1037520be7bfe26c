//! Core identifier and graph-object types
//!
//! This module defines the foundational types every command refers to:
//! - Kid: permanent 64-bit knowledge identifier
//! - KidOrOffset: either an existing Kid or a transaction-local offset
//! - KgObject: typed literal or entity reference with optional annotations
//!
//! Offsets are only meaningful together with the log index of the
//! InsertTx command that carries them. See [`crate::kid`] for resolution.

use crate::timestamp::KgTimestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of an entry in the ordered command log.
///
/// Assigned by the external log service. Strictly increasing, gap-free,
/// and the only timeline coordinate of the system.
pub type LogIndex = u64;

/// Knowledge ID: permanent identifier of an entity or a fact
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Kid(pub u64);

impl Kid {
    /// Wrap a raw identifier
    pub const fn new(raw: u64) -> Self {
        Kid(raw)
    }

    /// Raw numeric value
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for Kid {
    fn from(raw: u64) -> Self {
        Kid(raw)
    }
}

impl fmt::Display for Kid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kid:{}", self.0)
    }
}

/// Reference to an entity that either already exists or is created
/// within the same InsertTx batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KidOrOffset {
    /// An entity that already has a permanent identifier
    ExistingKid(Kid),
    /// A writer-chosen offset, unique within its InsertTx command
    Offset(i32),
}

impl KidOrOffset {
    /// Reference an existing entity
    pub const fn kid(raw: u64) -> Self {
        KidOrOffset::ExistingKid(Kid(raw))
    }

    /// Reference an entity created in the same batch
    pub const fn offset(offset: i32) -> Self {
        KidOrOffset::Offset(offset)
    }

    /// The offset carried by this reference, if any
    pub const fn as_offset(&self) -> Option<i32> {
        match self {
            KidOrOffset::Offset(o) => Some(*o),
            KidOrOffset::ExistingKid(_) => None,
        }
    }
}

/// Literal or reference payload of a [`KgObject`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectValue {
    /// UTF-8 text
    String(String),
    /// IEEE-754 double
    Float(f64),
    /// Signed 64-bit integer
    Int(i64),
    /// Instant with an explicit precision
    Timestamp(KgTimestamp),
    /// Boolean literal
    Bool(bool),
    /// Reference to an existing entity
    Kid(Kid),
    /// Reference to an entity created in the same batch
    KidOffset(i32),
}

impl ObjectValue {
    /// Short name used in diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            ObjectValue::String(_) => "string",
            ObjectValue::Float(_) => "float",
            ObjectValue::Int(_) => "int",
            ObjectValue::Timestamp(_) => "timestamp",
            ObjectValue::Bool(_) => "bool",
            ObjectValue::Kid(_) => "kid",
            ObjectValue::KidOffset(_) => "kid_offset",
        }
    }

    /// Whether a unit annotation may be attached to this kind.
    ///
    /// Units apply to every literal except strings; entity references
    /// never carry units.
    pub fn accepts_unit(&self) -> bool {
        !matches!(
            self,
            ObjectValue::String(_) | ObjectValue::Kid(_) | ObjectValue::KidOffset(_)
        )
    }

    /// Whether a language annotation may be attached to this kind
    pub fn accepts_lang(&self) -> bool {
        matches!(self, ObjectValue::String(_))
    }
}

/// Object position of a fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KgObject {
    /// The literal or reference
    pub value: ObjectValue,
    /// Unit entity (not for strings or references)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<KidOrOffset>,
    /// Language entity (strings only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang_id: Option<KidOrOffset>,
}

impl KgObject {
    /// Object without annotations
    pub fn new(value: ObjectValue) -> Self {
        KgObject {
            value,
            unit_id: None,
            lang_id: None,
        }
    }

    /// String literal
    pub fn string(s: impl Into<String>) -> Self {
        Self::new(ObjectValue::String(s.into()))
    }

    /// Integer literal
    pub fn int(v: i64) -> Self {
        Self::new(ObjectValue::Int(v))
    }

    /// Float literal
    pub fn float(v: f64) -> Self {
        Self::new(ObjectValue::Float(v))
    }

    /// Boolean literal
    pub fn bool(v: bool) -> Self {
        Self::new(ObjectValue::Bool(v))
    }

    /// Reference to an existing entity
    pub fn kid(raw: u64) -> Self {
        Self::new(ObjectValue::Kid(Kid(raw)))
    }

    /// Reference to an entity created in the same batch
    pub fn kid_offset(offset: i32) -> Self {
        Self::new(ObjectValue::KidOffset(offset))
    }

    /// Attach a unit annotation
    pub fn with_unit(mut self, unit: KidOrOffset) -> Self {
        self.unit_id = Some(unit);
        self
    }

    /// Attach a language annotation
    pub fn with_lang(mut self, lang: KidOrOffset) -> Self {
        self.lang_id = Some(lang);
        self
    }
}
