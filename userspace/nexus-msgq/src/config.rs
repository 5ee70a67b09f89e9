// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Queue handle options and their TOML loader
//! DEPS: serde, toml, std::fs
//! TESTS: defaults; partial tables; missing file; malformed document

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Options applied to a [`crate::QueueHandle`] at attach time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueConfig {
    /// Wait for space/messages instead of failing immediately.
    pub blocking: bool,
    /// Encode payloads with serde_json before sending.
    pub serialize: bool,
    /// Type used when an operation omits one.
    pub message_type: i64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { blocking: true, serialize: true, message_type: 1 }
    }
}

/// Contents of a queue configuration file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFile {
    /// Queue key, when the file names one.
    pub key: Option<i32>,
    /// Handle options.
    pub config: QueueConfig,
}

/// Errors raised while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read queue config {path}: {source}")]
    Read {
        /// Offending file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not a valid queue config document.
    #[error("failed to parse queue config {path}: {source}")]
    Parse {
        /// Offending file.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFile {
    #[serde(default)]
    queue: RawQueue,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawQueue {
    key: Option<i32>,
    blocking: Option<bool>,
    serialize: Option<bool>,
    #[serde(default, deserialize_with = "positive_type")]
    message_type: Option<i64>,
}

fn positive_type<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let ty = i64::deserialize(deserializer)?;
    if ty <= 0 {
        return Err(serde::de::Error::custom(format!(
            "message_type must be greater than 0 (got {ty})"
        )));
    }
    Ok(Some(ty))
}

impl RawQueue {
    fn into_file(self) -> QueueFile {
        let defaults = QueueConfig::default();
        QueueFile {
            key: self.key,
            config: QueueConfig {
                blocking: self.blocking.unwrap_or(defaults.blocking),
                serialize: self.serialize.unwrap_or(defaults.serialize),
                message_type: self.message_type.unwrap_or(defaults.message_type),
            },
        }
    }
}

impl QueueFile {
    /// Parses a TOML document with an optional `[queue]` table.
    pub fn from_toml_str(input: &str) -> Result<Self, toml::de::Error> {
        let raw: RawFile = toml::from_str(input)?;
        Ok(raw.queue.into_file())
    }

    /// Reads and parses `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&data)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn empty_document_uses_defaults() {
        let file = QueueFile::from_toml_str("").unwrap();
        assert_eq!(file, QueueFile::default());
        assert!(file.config.blocking && file.config.serialize);
        assert_eq!(file.config.message_type, 1);
    }

    #[test]
    fn partial_table_overrides_only_named_fields() {
        let file = QueueFile::from_toml_str("[queue]\nkey = 4242\nblocking = false\n").unwrap();
        assert_eq!(file.key, Some(4242));
        assert!(!file.config.blocking);
        assert!(file.config.serialize);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(QueueFile::from_toml_str("[queue]\nblock = true\n").is_err());
    }

    #[test]
    fn non_positive_message_type_is_rejected() {
        for input in ["[queue]\nmessage_type = 0\n", "[queue]\nmessage_type = -2\n"] {
            let err = QueueFile::from_toml_str(input).unwrap_err();
            assert!(err.to_string().contains("message_type must be greater than 0"));
        }
    }

    #[test]
    fn load_reports_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = QueueFile::load(&temp.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn load_reports_parse_errors_with_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("queue.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[queue]\nmessage_type = \"one\"").unwrap();
        let err = QueueFile::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("queue.toml"));
    }

    #[test]
    fn load_reads_full_table() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("queue.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[queue]\nkey = 7\nserialize = false\nmessage_type = 3").unwrap();
        let loaded = QueueFile::load(&path).unwrap();
        assert_eq!(loaded.key, Some(7));
        assert_eq!(
            loaded.config,
            QueueConfig { blocking: true, serialize: false, message_type: 3 }
        );
    }
}
