//! KID/Offset resolution
//!
//! Offsets become permanent identifiers through a pure function of
//! `(log index, offset)`:
//!
//! ```text
//! kid = index * KID_SLOTS_PER_INDEX + offset
//! ```
//!
//! ## Properties
//!
//! - **Deterministic**: every replica computes the same KID from the same pair
//! - **Injective**: offsets are below `KID_SLOTS_PER_INDEX`, so distinct pairs
//!   never collide
//! - **Disjoint**: derived KIDs start at `RESERVED_KID_CEILING`, leaving the
//!   range below it to bootstrap entities
//! - **Order-free**: no offset depends on another, so facts in a batch may
//!   be resolved in any order, forward and backward references alike

use crate::command::{InsertFact, InsertTxCommand};
use crate::error::RangeError;
use crate::fact::{Fact, ResolvedObject, ResolvedValue};
use crate::limits::{
    KID_SLOTS_PER_INDEX, MAX_OFFSET, MAX_OFFSET_OWNER_INDEX, MIN_ENTITY_OFFSET, MIN_FACT_OFFSET,
};
use crate::types::{KgObject, Kid, KidOrOffset, LogIndex, ObjectValue};
use std::collections::HashSet;

/// Derive the KID owned by `offset` within the command at `index`.
///
/// Accepts any offset in `[MIN_FACT_OFFSET, MAX_OFFSET]`. Callers that
/// resolve entity references apply the narrower entity range first.
pub fn derive_kid(index: LogIndex, offset: i32) -> Result<Kid, RangeError> {
    check_owner_index(index)?;
    check_offset(offset, MIN_FACT_OFFSET)?;
    Ok(Kid(index * KID_SLOTS_PER_INDEX + offset as u64))
}

/// Resolve an entity reference made by the command at `index`
pub fn resolve(index: LogIndex, reference: &KidOrOffset) -> Result<Kid, RangeError> {
    match reference {
        KidOrOffset::ExistingKid(kid) => Ok(*kid),
        KidOrOffset::Offset(offset) => {
            check_offset(*offset, MIN_ENTITY_OFFSET)?;
            derive_kid(index, *offset)
        }
    }
}

/// Resolve a fact's own id offset
pub fn resolve_fact_id(index: LogIndex, fact_id_offset: i32) -> Result<Kid, RangeError> {
    derive_kid(index, fact_id_offset)
}

/// Check a whole InsertTx batch before it is registered.
///
/// Rejects out-of-range offsets, duplicate fact id offsets and, when
/// annotations are live, annotations on kinds that cannot carry them.
/// Annotations that are not yet live are not inspected at all.
pub fn validate_batch(
    index: LogIndex,
    batch: &InsertTxCommand,
    annotations_live: bool,
) -> Result<(), RangeError> {
    check_owner_index(index)?;

    let mut seen = HashSet::with_capacity(batch.facts.len());
    for fact in &batch.facts {
        check_offset(fact.fact_id_offset, MIN_FACT_OFFSET)?;
        if !seen.insert(fact.fact_id_offset) {
            return Err(RangeError::DuplicateFactOffset {
                offset: fact.fact_id_offset,
            });
        }
        check_reference(&fact.subject)?;
        check_reference(&fact.predicate)?;
        check_object(&fact.object, annotations_live)?;
    }
    Ok(())
}

/// Resolve one fact of the command at `index`
pub fn resolve_fact(
    index: LogIndex,
    fact: &InsertFact,
    annotations_live: bool,
) -> Result<Fact, RangeError> {
    Ok(Fact {
        fact_id: resolve_fact_id(index, fact.fact_id_offset)?,
        subject: resolve(index, &fact.subject)?,
        predicate: resolve(index, &fact.predicate)?,
        object: resolve_object(index, &fact.object, annotations_live)?,
    })
}

/// Resolve every fact of the command at `index`, preserving writer order
pub fn resolve_batch(
    index: LogIndex,
    facts: &[InsertFact],
    annotations_live: bool,
) -> Result<Vec<Fact>, RangeError> {
    facts
        .iter()
        .map(|fact| resolve_fact(index, fact, annotations_live))
        .collect()
}

fn resolve_object(
    index: LogIndex,
    object: &KgObject,
    annotations_live: bool,
) -> Result<ResolvedObject, RangeError> {
    let value = match &object.value {
        ObjectValue::String(s) => ResolvedValue::String(s.clone()),
        ObjectValue::Float(v) => ResolvedValue::Float(*v),
        ObjectValue::Int(v) => ResolvedValue::Int(*v),
        ObjectValue::Timestamp(ts) => ResolvedValue::Timestamp(*ts),
        ObjectValue::Bool(v) => ResolvedValue::Bool(*v),
        ObjectValue::Kid(kid) => ResolvedValue::Kid(*kid),
        ObjectValue::KidOffset(offset) => {
            ResolvedValue::Kid(resolve(index, &KidOrOffset::Offset(*offset))?)
        }
    };

    if !annotations_live {
        return Ok(ResolvedObject::plain(value));
    }

    let unit = object
        .unit_id
        .as_ref()
        .map(|r| resolve(index, r))
        .transpose()?;
    let lang = object
        .lang_id
        .as_ref()
        .map(|r| resolve(index, r))
        .transpose()?;

    Ok(ResolvedObject { value, unit, lang })
}

fn check_owner_index(index: LogIndex) -> Result<(), RangeError> {
    if index == 0 || index > MAX_OFFSET_OWNER_INDEX {
        return Err(RangeError::InvalidOwnerIndex { index });
    }
    Ok(())
}

fn check_offset(offset: i32, min: i32) -> Result<(), RangeError> {
    if offset < min || offset > MAX_OFFSET {
        return Err(RangeError::OffsetOutOfRange {
            offset,
            min,
            max: MAX_OFFSET,
        });
    }
    Ok(())
}

fn check_reference(reference: &KidOrOffset) -> Result<(), RangeError> {
    match reference {
        KidOrOffset::ExistingKid(_) => Ok(()),
        KidOrOffset::Offset(offset) => check_offset(*offset, MIN_ENTITY_OFFSET),
    }
}

fn check_object(object: &KgObject, annotations_live: bool) -> Result<(), RangeError> {
    if let ObjectValue::KidOffset(offset) = object.value {
        check_offset(offset, MIN_ENTITY_OFFSET)?;
    }

    if !annotations_live {
        return Ok(());
    }

    if let Some(unit) = &object.unit_id {
        if !object.value.accepts_unit() {
            return Err(RangeError::InvalidAnnotation {
                annotation: "unit",
                kind: object.value.kind_name(),
            });
        }
        check_reference(unit)?;
    }
    if let Some(lang) = &object.lang_id {
        if !object.value.accepts_lang() {
            return Err(RangeError::InvalidAnnotation {
                annotation: "lang",
                kind: object.value.kind_name(),
            });
        }
        check_reference(lang)?;
    }
    Ok(())
}
