//! Protocol versions understood by this build
//!
//! The log carries its own interpretation version. A fresh log starts at
//! [`INITIAL_VERSION`]; Version commands move it forward. Every behavior
//! introduced after version 1 is listed as a [`Feature`] together with the
//! version in which it became live.
//!
//! ## History
//!
//! | Version | Change |
//! |---------|--------|
//! | 1 | Version, InsertTx, TxDecision, Skipped, Ping |
//! | 2 | Wipe commands take effect |
//! | 3 | Unit and language annotations on objects take effect |

/// Protocol version number as carried on the wire
pub type ProtocolVersion = i32;

/// Version every log implicitly starts at
pub const INITIAL_VERSION: ProtocolVersion = 1;

/// Highest version this build knows how to interpret
pub const MAX_SUPPORTED_VERSION: ProtocolVersion = 3;

/// Behavior gated on the active protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Wipe commands clear state and raise the watermark
    Wipe,
    /// `unit_id` / `lang_id` on objects are materialized
    ObjectAnnotations,
}

impl Feature {
    /// All gated features, oldest first
    pub const ALL: [Feature; 2] = [Feature::Wipe, Feature::ObjectAnnotations];

    /// Version in which the feature became live
    pub const fn introduced_in(&self) -> ProtocolVersion {
        match self {
            Feature::Wipe => 2,
            Feature::ObjectAnnotations => 3,
        }
    }

    /// Whether the feature is live for an entry interpreted at `version`
    #[inline]
    pub const fn is_live_at(&self, version: ProtocolVersion) -> bool {
        version >= self.introduced_in()
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Feature::Wipe => write!(f, "wipe"),
            Feature::ObjectAnnotations => write!(f, "object-annotations"),
        }
    }
}
