//! Replica configuration via `kglog.toml`
//!
//! On first use a commented default `kglog.toml` is written. To change
//! settings, edit the file and restart the replica.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Config file name
pub const CONFIG_FILE_NAME: &str = "kglog.toml";

/// Default number of entries between checkpoints
pub const DEFAULT_CHECKPOINT_INTERVAL: u64 = 1000;

/// Replica configuration loaded from `kglog.toml`.
///
/// # Example
///
/// ```toml
/// strict_decode = false
/// writer_id = "a1b2c3"
/// checkpoint_interval = 1000
/// log_level = "info"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaConfig {
    /// Halt on undecodable entries instead of skipping them
    #[serde(default)]
    pub strict_decode: bool,
    /// This process's writer identity as hex, for matching pings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writer_id: Option<String>,
    /// Entries between checkpoints, 0 disables checkpointing
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,
    /// Default tracing filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_checkpoint_interval() -> u64 {
    DEFAULT_CHECKPOINT_INTERVAL
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            strict_decode: false,
            writer_id: None,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            log_level: default_log_level(),
        }
    }
}

impl ReplicaConfig {
    /// Decoded writer identity
    ///
    /// # Errors
    ///
    /// Returns an error if `writer_id` is not an even-length hex string.
    pub fn writer_id_bytes(&self) -> EngineResult<Option<Vec<u8>>> {
        match &self.writer_id {
            None => Ok(None),
            Some(hex) => hex_decode(hex).map(Some).ok_or_else(|| {
                EngineError::Config(format!(
                    "Invalid writer_id '{}' in kglog.toml. Expected an even-length hex string.",
                    hex
                ))
            }),
        }
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# kglog replica configuration
#
# Strict decode: stop replay on an entry that cannot be decoded (default: false).
# When false, such entries are logged, counted and skipped.
strict_decode = false

# Writer identity of this process as hex. Pings carrying this identity are
# reported to the latency collaborator; all others are ignored.
# writer_id = "00112233"

# Entries applied between checkpoints (default: 1000, 0 = never).
checkpoint_interval = 1000

# Log filter used when RUST_LOG is not set.
log_level = "info"
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or holds an
    /// invalid value.
    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: ReplicaConfig = toml::from_str(&content).map_err(|e| {
            EngineError::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.writer_id_bytes()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> EngineResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                EngineError::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> EngineResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            EngineError::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}

fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    hex.as_bytes()
        .chunks(2)
        .map(|chunk| {
            let s = std::str::from_utf8(chunk).ok()?;
            u8::from_str_radix(s, 16).ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn hex_encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    #[test]
    fn default_config_values() {
        let config = ReplicaConfig::default();
        assert!(!config.strict_decode);
        assert_eq!(config.writer_id, None);
        assert_eq!(config.checkpoint_interval, 1000);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn default_toml_parses_to_default() {
        let config: ReplicaConfig = toml::from_str(ReplicaConfig::default_toml()).unwrap();
        assert_eq!(config, ReplicaConfig::default());
    }

    #[test]
    fn writer_id_hex() {
        let config: ReplicaConfig = toml::from_str("writer_id = \"0aFF10\"").unwrap();
        assert_eq!(
            config.writer_id_bytes().unwrap(),
            Some(vec![0x0a, 0xff, 0x10])
        );
        assert_eq!(hex_encode(&[0x0a, 0xff, 0x10]), "0aff10");
    }

    #[test]
    fn invalid_writer_id_rejected() {
        for bad in ["abc", "zz", "0x12"] {
            let config = ReplicaConfig {
                writer_id: Some(bad.to_string()),
                ..ReplicaConfig::default()
            };
            assert!(config.writer_id_bytes().is_err(), "{} accepted", bad);
        }
    }

    #[test]
    fn from_file_rejects_invalid_writer_id() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "writer_id = \"nothex\"\n").unwrap();

        let err = ReplicaConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn write_default_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        assert!(!path.exists());

        ReplicaConfig::write_default_if_missing(&path).unwrap();
        assert!(path.exists());
        assert_eq!(
            ReplicaConfig::from_file(&path).unwrap(),
            ReplicaConfig::default()
        );
    }

    #[test]
    fn write_default_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "strict_decode = true\n").unwrap();

        ReplicaConfig::write_default_if_missing(&path).unwrap();

        let config = ReplicaConfig::from_file(&path).unwrap();
        assert!(config.strict_decode);
        assert_eq!(config.checkpoint_interval, 1000);
    }

    #[test]
    fn write_to_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let config = ReplicaConfig {
            strict_decode: true,
            writer_id: Some("beef".to_string()),
            checkpoint_interval: 0,
            log_level: "debug".to_string(),
        };

        config.write_to_file(&path).unwrap();
        assert_eq!(ReplicaConfig::from_file(&path).unwrap(), config);
    }
}
