//! Protocol limits
//!
//! Bounds a writer must respect. Violations are writer misbehavior and
//! cause the whole InsertTx command to be rejected.

/// Number of derived KIDs reserved per log index.
///
/// A derived KID is `index * KID_SLOTS_PER_INDEX + offset`, so every
/// offset below this bound maps to a distinct KID.
pub const KID_SLOTS_PER_INDEX: u64 = 1_000;

/// KIDs strictly below this value are never produced by derivation.
///
/// They belong to bootstrap entities (schema predicates, units, languages)
/// assigned outside the log. Log index 0 would derive into this range and
/// is therefore not a valid owner of offsets.
pub const RESERVED_KID_CEILING: u64 = KID_SLOTS_PER_INDEX;

/// Smallest offset accepted for an entity reference
pub const MIN_ENTITY_OFFSET: i32 = 1;

/// Smallest offset accepted as a fact's own `fact_id_offset`
pub const MIN_FACT_OFFSET: i32 = 0;

/// Largest offset accepted anywhere
pub const MAX_OFFSET: i32 = 999;

/// Largest log index that can still own offsets without overflowing u64
pub const MAX_OFFSET_OWNER_INDEX: u64 = (u64::MAX - MAX_OFFSET as u64) / KID_SLOTS_PER_INDEX;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_fit_in_slots() {
        assert!((MAX_OFFSET as u64) < KID_SLOTS_PER_INDEX);
        assert!(MIN_FACT_OFFSET >= 0);
        assert!(MIN_ENTITY_OFFSET > MIN_FACT_OFFSET);
    }

    #[test]
    fn test_max_owner_index_does_not_overflow() {
        let top = MAX_OFFSET_OWNER_INDEX
            .checked_mul(KID_SLOTS_PER_INDEX)
            .and_then(|v| v.checked_add(MAX_OFFSET as u64));
        assert!(top.is_some());
    }
}
