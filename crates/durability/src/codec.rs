//! Command wire codec
//!
//! Every log payload is one kind tag byte followed by a MessagePack map
//! holding the command's named fields:
//!
//! ```text
//! ┌──────────┬──────────────────────────────────────┐
//! │ Kind (1) │ Payload (MessagePack, named fields)  │
//! └──────────┴──────────────────────────────────────┘
//! ```
//!
//! ## Kind Tags
//!
//! | Tag  | Command    |
//! |------|------------|
//! | 0x01 | Version    |
//! | 0x02 | InsertTx   |
//! | 0x03 | TxDecision |
//! | 0x04 | Wipe       |
//! | 0x05 | Skipped    |
//! | 0x06 | Ping       |
//!
//! ## Compatibility
//!
//! - Tags are never reused. A tag this build does not know decodes to
//!   [`DecodeError::UnknownKind`] so the dispatcher can skip the entry.
//! - Payloads are field-named maps. Fields added by newer writers are
//!   ignored by older readers.
//! - [`EncodedCommand`] keeps the exact bytes it was decoded from, so
//!   re-emitting an entry never alters fields this build did not understand.

use kglog_core::{
    Command, DecodeError, InsertTxCommand, PingCommand, TxDecisionCommand, VersionCommand,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind tag constants
pub mod kind_tags {
    /// Protocol version move
    pub const VERSION: u8 = 0x01;
    /// Uncommitted transaction
    pub const INSERT_TX: u8 = 0x02;
    /// Commit or abort
    pub const TX_DECISION: u8 = 0x03;
    /// Discard all state
    pub const WIPE: u8 = 0x04;
    /// No-op placeholder
    pub const SKIPPED: u8 = 0x05;
    /// Writer latency probe
    pub const PING: u8 = 0x06;
}

/// Failure to serialize a command
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to encode {kind} command: {detail}")]
pub struct EncodeError {
    /// Command kind being encoded
    pub kind: &'static str,
    /// Serializer diagnostic
    pub detail: String,
}

/// Kind tag for a command
pub fn kind_tag(command: &Command) -> u8 {
    match command {
        Command::Version(_) => kind_tags::VERSION,
        Command::InsertTx(_) => kind_tags::INSERT_TX,
        Command::TxDecision(_) => kind_tags::TX_DECISION,
        Command::Wipe => kind_tags::WIPE,
        Command::Skipped => kind_tags::SKIPPED,
        Command::Ping(_) => kind_tags::PING,
    }
}

/// Name of a known kind tag
pub fn kind_name(tag: u8) -> Option<&'static str> {
    match tag {
        kind_tags::VERSION => Some("version"),
        kind_tags::INSERT_TX => Some("insert_tx"),
        kind_tags::TX_DECISION => Some("tx_decision"),
        kind_tags::WIPE => Some("wipe"),
        kind_tags::SKIPPED => Some("skipped"),
        kind_tags::PING => Some("ping"),
        _ => None,
    }
}

/// Read the kind tag without decoding the payload
pub fn peek_kind(bytes: &[u8]) -> Result<u8, DecodeError> {
    bytes.first().copied().ok_or(DecodeError::Empty)
}

/// Serialize a command to its wire form
pub fn encode(command: &Command) -> Result<Vec<u8>, EncodeError> {
    let tag = kind_tag(command);
    let mut out = vec![tag];
    let kind = command.kind_name();

    let payload = match command {
        Command::Version(c) => to_named(kind, c)?,
        Command::InsertTx(c) => to_named(kind, c)?,
        Command::TxDecision(c) => to_named(kind, c)?,
        Command::Ping(c) => to_named(kind, c)?,
        Command::Wipe | Command::Skipped => to_named(kind, &EmptyPayload {})?,
    };
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode wire bytes into a command, keeping the original bytes
pub fn decode(bytes: &[u8]) -> Result<EncodedCommand, DecodeError> {
    let tag = peek_kind(bytes)?;
    let payload = &bytes[1..];

    let command = match tag {
        kind_tags::VERSION => Command::Version(from_named::<VersionCommand>("version", payload)?),
        kind_tags::INSERT_TX => {
            Command::InsertTx(from_named::<InsertTxCommand>("insert_tx", payload)?)
        }
        kind_tags::TX_DECISION => {
            Command::TxDecision(from_named::<TxDecisionCommand>("tx_decision", payload)?)
        }
        kind_tags::WIPE => {
            check_empty_payload("wipe", payload)?;
            Command::Wipe
        }
        kind_tags::SKIPPED => {
            check_empty_payload("skipped", payload)?;
            Command::Skipped
        }
        kind_tags::PING => Command::Ping(from_named::<PingCommand>("ping", payload)?),
        tag => return Err(DecodeError::UnknownKind { tag }),
    };

    Ok(EncodedCommand {
        bytes: bytes.to_vec(),
        command,
    })
}

/// A decoded command paired with the exact bytes it came from
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedCommand {
    bytes: Vec<u8>,
    command: Command,
}

impl EncodedCommand {
    /// Encode a fresh command
    pub fn from_command(command: Command) -> Result<Self, EncodeError> {
        let bytes = encode(&command)?;
        Ok(EncodedCommand { bytes, command })
    }

    /// The decoded command
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Original wire bytes, including fields this build ignores
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Kind tag byte
    pub fn kind_tag(&self) -> u8 {
        kind_tag(&self.command)
    }

    /// Take the command, dropping the bytes
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Serialize, Deserialize)]
struct EmptyPayload {}

fn to_named<T: Serialize>(kind: &'static str, value: &T) -> Result<Vec<u8>, EncodeError> {
    rmp_serde::to_vec_named(value).map_err(|e| EncodeError {
        kind,
        detail: e.to_string(),
    })
}

fn from_named<T: DeserializeOwned>(kind: &'static str, payload: &[u8]) -> Result<T, DecodeError> {
    if payload.is_empty() {
        return Err(DecodeError::Malformed {
            kind,
            detail: "missing payload".to_string(),
        });
    }
    rmp_serde::from_slice(payload).map_err(|e| DecodeError::Malformed {
        kind,
        detail: e.to_string(),
    })
}

// Wipe and Skipped carry no fields today; an absent payload is accepted
// and any map a newer writer sends is ignored.
fn check_empty_payload(kind: &'static str, payload: &[u8]) -> Result<(), DecodeError> {
    if payload.is_empty() {
        return Ok(());
    }
    from_named::<EmptyPayload>(kind, payload).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kglog_core::{InsertFact, KgObject, KidOrOffset};

    fn sample_insert() -> Command {
        Command::InsertTx(InsertTxCommand {
            facts: vec![InsertFact {
                fact_id_offset: 0,
                subject: KidOrOffset::offset(1),
                predicate: KidOrOffset::kid(42),
                object: KgObject::float(9.81).with_unit(KidOrOffset::kid(77)),
            }],
        })
    }

    #[test]
    fn test_encode_decode_all_kinds() {
        let commands = vec![
            Command::Version(VersionCommand { move_to_version: 2 }),
            sample_insert(),
            Command::TxDecision(TxDecisionCommand { tx: 5, commit: false }),
            Command::Wipe,
            Command::Skipped,
            Command::Ping(PingCommand {
                writer: vec![0xde, 0xad],
                seq: 17,
            }),
        ];

        for command in commands {
            let bytes = encode(&command).unwrap();
            assert_eq!(bytes[0], kind_tag(&command));
            let decoded = decode(&bytes).unwrap();
            assert_eq!(decoded.command(), &command);
            assert_eq!(decoded.as_bytes(), bytes.as_slice());
        }
    }

    #[test]
    fn test_empty_bytes() {
        assert_eq!(decode(&[]), Err(DecodeError::Empty));
        assert_eq!(peek_kind(&[]), Err(DecodeError::Empty));
    }

    #[test]
    fn test_unknown_kind_distinct_from_malformed() {
        let err = decode(&[0x7f, 0x80]).unwrap_err();
        assert_eq!(err, DecodeError::UnknownKind { tag: 0x7f });

        let err = decode(&[kind_tags::INSERT_TX, 0xc1]).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Malformed {
                kind: "insert_tx",
                ..
            }
        ));
    }

    #[test]
    fn test_missing_payload_is_malformed() {
        let err = decode(&[kind_tags::VERSION]).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { kind: "version", .. }));
    }

    #[test]
    fn test_wipe_without_payload() {
        let decoded = decode(&[kind_tags::WIPE]).unwrap();
        assert_eq!(decoded.command(), &Command::Wipe);
    }

    #[test]
    fn test_unknown_fields_ignored_and_preserved() {
        #[derive(Serialize)]
        struct FutureDecision {
            tx: u64,
            commit: bool,
            reason: String,
        }

        let mut bytes = vec![kind_tags::TX_DECISION];
        bytes.extend(
            rmp_serde::to_vec_named(&FutureDecision {
                tx: 12,
                commit: true,
                reason: "quorum".to_string(),
            })
            .unwrap(),
        );

        let decoded = decode(&bytes).unwrap();
        assert_eq!(
            decoded.command(),
            &Command::TxDecision(TxDecisionCommand { tx: 12, commit: true })
        );
        // Re-emit keeps the field this build does not know about
        assert_eq!(decoded.as_bytes(), bytes.as_slice());
        assert_ne!(encode(decoded.command()).unwrap(), bytes);
    }

    #[test]
    fn test_annotations_roundtrip() {
        let annotated = sample_insert();
        let decoded = decode(&encode(&annotated).unwrap()).unwrap();
        assert_eq!(decoded.into_command(), annotated);
    }

    #[test]
    fn test_kind_names() {
        for tag in 0x01..=0x06u8 {
            assert!(kind_name(tag).is_some());
        }
        assert_eq!(kind_name(0x00), None);
        assert_eq!(kind_name(0x07), None);
    }
}
