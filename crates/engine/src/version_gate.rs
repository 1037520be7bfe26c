//! Protocol version gate
//!
//! The version used to interpret an entry is the active version *before*
//! that entry. A Version command only changes the active version once it
//! has itself been processed, and only ever upward.

use kglog_core::{
    Command, Feature, LogIndex, ProtocolVersion, UnsupportedVersionError, VersionCommand,
    INITIAL_VERSION, MAX_SUPPORTED_VERSION,
};

/// Effect of a Version command on the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionMove {
    /// The active version moved forward
    Upgraded {
        /// Version before the command
        from: ProtocolVersion,
        /// Version after the command
        to: ProtocolVersion,
    },
    /// The command asked for the current version or an older one
    Ignored {
        /// Active version, unchanged
        active: ProtocolVersion,
        /// Version the command asked for
        requested: ProtocolVersion,
    },
}

/// Active protocol version of one replay session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionGate {
    active: ProtocolVersion,
}

impl Default for VersionGate {
    fn default() -> Self {
        VersionGate {
            active: INITIAL_VERSION,
        }
    }
}

impl VersionGate {
    /// Gate for a fresh log
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate resumed at a known version
    pub fn at(version: ProtocolVersion) -> Self {
        VersionGate { active: version }
    }

    /// Version that applies to the next entry
    pub fn active(&self) -> ProtocolVersion {
        self.active
    }

    /// Whether `feature` is live for the next entry
    pub fn is_live(&self, feature: Feature) -> bool {
        feature.is_live_at(self.active)
    }

    /// Whether this command kind is live for the next entry.
    ///
    /// Kinds introduced by a later version are ignored, not rejected.
    pub fn admits(&self, command: &Command) -> bool {
        match command {
            Command::Wipe => self.is_live(Feature::Wipe),
            Command::Version(_)
            | Command::InsertTx(_)
            | Command::TxDecision(_)
            | Command::Skipped
            | Command::Ping(_) => true,
        }
    }

    /// Process the Version command at `index`.
    ///
    /// A version beyond what this build supports is an error and leaves the
    /// gate unchanged.
    pub fn on_version_command(
        &mut self,
        index: LogIndex,
        command: &VersionCommand,
    ) -> Result<VersionMove, UnsupportedVersionError> {
        let requested = command.move_to_version;

        if requested <= self.active {
            return Ok(VersionMove::Ignored {
                active: self.active,
                requested,
            });
        }
        if requested > MAX_SUPPORTED_VERSION {
            return Err(UnsupportedVersionError {
                index,
                requested,
                supported: MAX_SUPPORTED_VERSION,
            });
        }

        let from = self.active;
        self.active = requested;
        Ok(VersionMove::Upgraded {
            from,
            to: requested,
        })
    }
}
