// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Message payloads and the serialization boundary
//! OWNERS: @runtime
//!
//! INVARIANTS:
//!   - Serialized mode encodes the whole [`Payload`] so decode yields the pushed variant
//!   - Raw mode transmits `Bytes` untouched and never accepts structured values

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::Value;

const DESCRIBE_LIMIT: usize = 96;

/// Body of a queued message.
///
/// In serialized mode `Bytes` travels as a JSON array of numbers, up to four encoded bytes
/// per payload byte. Keep serialized byte payloads under roughly 4 KiB so the encoded form
/// stays within [`crate::MAX_MESSAGE_BYTES`]; larger binary bodies belong on a raw-mode
/// handle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// Opaque bytes.
    Bytes(Vec<u8>),
    /// Structured value (scalars, sequences, mappings).
    Value(Value),
}

impl Payload {
    /// Returns the raw bytes when this is a `Bytes` payload.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            Self::Value(_) => None,
        }
    }

    /// Returns the structured value when this is a `Value` payload.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Bytes(_) => None,
        }
    }

    /// Returns the string when the payload is a string value or UTF-8 bytes.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Value(Value::String(s)) => Some(s),
            Self::Bytes(bytes) => core::str::from_utf8(bytes).ok(),
            Self::Value(_) => None,
        }
    }

    /// Bounded human readable rendering used in diagnostics.
    pub fn describe(&self) -> String {
        let mut rendered = match self {
            Self::Bytes(bytes) => format!("b\"{}\"", bytes.escape_ascii()),
            Self::Value(value) => value.to_string(),
        };
        if rendered.len() > DESCRIBE_LIMIT {
            let mut cut = DESCRIBE_LIMIT;
            while !rendered.is_char_boundary(cut) {
                cut -= 1;
            }
            rendered.truncate(cut);
            rendered.push_str("...");
        }
        rendered
    }

    /// Produces the bytes handed to the facility.
    pub(crate) fn encode(&self, serialize: bool) -> Result<Cow<'_, [u8]>, String> {
        if serialize {
            return serde_json::to_vec(self).map(Cow::Owned).map_err(|err| err.to_string());
        }
        match self {
            Self::Bytes(bytes) => Ok(Cow::Borrowed(bytes)),
            Self::Value(_) => Err("structured payload requires serialization".to_string()),
        }
    }

    /// Rebuilds a payload from received bytes.
    pub(crate) fn decode(bytes: Vec<u8>, serialize: bool) -> Result<Self, serde_json::Error> {
        if serialize {
            serde_json::from_slice(&bytes)
        } else {
            Ok(Self::Bytes(bytes))
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<&[u8]> for Payload {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Payload {
    fn from(value: &[u8; N]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self::Value(Value::String(value.to_string()))
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self::Value(Value::String(value))
    }
}
