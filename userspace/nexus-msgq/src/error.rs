// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Error taxonomy for queue handle operations

use crate::facility::Errno;
use crate::stats::StatField;

/// Result alias for queue handle operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors produced by [`crate::QueueHandle`].
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Queue keys must be strictly positive.
    #[error("attach: key must be greater than 0 (got {0})")]
    InvalidKey(i32),
    /// Default message types must be strictly positive.
    #[error("message type must be greater than 0 (got {0})")]
    InvalidMessageType(i64),
    /// The facility could not produce a usable queue id.
    #[error("attach: failed to attach to message queue {key}: {errno}")]
    AttachFailed {
        /// Key that was requested.
        key: i32,
        /// Facility error.
        errno: Errno,
    },
    /// The handle holds no queue (failed attach or after detach).
    #[error("queue handle is not attached")]
    NotAttached,
    /// The facility rejected a send; nothing was enqueued.
    #[error("push: {errno} trying to send {description}")]
    Send {
        /// Facility error.
        errno: Errno,
        /// Rendering of the rejected payload.
        description: String,
    },
    /// Non-blocking receive found no matching message.
    #[error("pop: no message available")]
    WouldBlock,
    /// The oldest matching message exceeds the receive size bound.
    #[error("pop: message exceeds the {limit} byte receive limit")]
    MessageTooLarge {
        /// Receive size bound in bytes.
        limit: usize,
    },
    /// Any other receive failure, including payload decode failure.
    #[error("pop: {reason}")]
    Receive {
        /// Facility error; `None` for decode failures.
        errno: Option<Errno>,
        /// Human readable cause.
        reason: String,
    },
    /// The facility refused to remove the queue.
    #[error("detach: {0}")]
    Remove(Errno),
    /// The facility refused the metadata query.
    #[error("stats: {0}")]
    Stat(Errno),
    /// The facility refused a set-attributes request.
    #[error("set {field}: {errno}")]
    SetAttribute {
        /// Field that was being written.
        field: StatField,
        /// Facility error.
        errno: Errno,
    },
    /// Requested metadata field does not exist.
    #[error("unknown queue stat field `{0}`")]
    UnknownStatField(String),
}

impl Error {
    /// Raw errno carried by the error, if any.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            Self::AttachFailed { errno, .. }
            | Self::Send { errno, .. }
            | Self::SetAttribute { errno, .. } => Some(*errno),
            Self::Remove(errno) | Self::Stat(errno) => Some(*errno),
            Self::Receive { errno, .. } => *errno,
            Self::InvalidKey(_)
            | Self::InvalidMessageType(_)
            | Self::NotAttached
            | Self::WouldBlock
            | Self::MessageTooLarge { .. }
            | Self::UnknownStatField(_) => None,
        }
    }
}
