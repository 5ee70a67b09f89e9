// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Seam between the queue handle and the kernel message-queue facility
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//!
//! PUBLIC API:
//!   - Facility trait: msgget/msgsnd/msgrcv/msgctl primitives addressed by key and id
//!   - MsgFlags: IPC flag bits (Linux ABI values)
//!   - TypeFilter: exact-type or any-type receive selection
//!   - QueueId, QueueAttr, Errno
//!
//! INVARIANTS:
//!   - Backends report raw errno values; translation into [`crate::Error`] happens in the handle
//!   - Type filter 0 is only reachable through [`TypeFilter::Any`]

use core::fmt;

use bitflags::bitflags;

use crate::stats::{QueueStats, StatField};

/// Result of a raw facility call.
pub type SysResult<T> = core::result::Result<T, Errno>;

/// Raw OS error number reported by the facility.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Errno(pub i32);

impl Errno {
    /// Captures `errno` of the calling thread.
    pub fn last() -> Self {
        Self(std::io::Error::last_os_error().raw_os_error().unwrap_or(0))
    }

    /// Returns the raw error number.
    pub const fn raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "errno={} errstr={}", self.0, std::io::Error::from_raw_os_error(self.0))
    }
}

bitflags! {
    /// Flag bits accepted by the facility primitives.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct MsgFlags: i32 {
        /// Create the queue when the key is unknown.
        const CREATE = 0o1000;
        /// Fail when the key already exists (only with `CREATE`).
        const EXCLUSIVE = 0o2000;
        /// Return immediately instead of waiting for space or a message.
        const NOWAIT = 0o4000;
        /// Truncate oversized messages on receive instead of failing.
        const NOERROR = 0o10000;
    }
}

impl MsgFlags {
    /// Flags for a send or receive honouring the handle's blocking mode.
    pub fn for_wait(blocking: bool) -> Self {
        if blocking {
            Self::empty()
        } else {
            Self::NOWAIT
        }
    }
}

/// Receive selection rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeFilter {
    /// Oldest message regardless of its type.
    Any,
    /// Oldest message carrying exactly this type.
    Exact(i64),
}

impl TypeFilter {
    /// Value passed as `msgtyp` to the kernel.
    pub const fn raw(self) -> i64 {
        match self {
            Self::Any => 0,
            Self::Exact(ty) => ty,
        }
    }

    /// Returns whether a stored message of type `ty` is selected.
    pub const fn matches(self, ty: i64) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(want) => want == ty,
        }
    }
}

/// Kernel identifier of an attached queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct QueueId(i32);

impl QueueId {
    /// Wraps an identifier returned by `msgget`.
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier.
    pub const fn raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msqid={}", self.0)
    }
}

/// Single-field set-attributes request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueAttr {
    /// Owner user id.
    Uid(u32),
    /// Owner group id.
    Gid(u32),
    /// Permission bits; only the low nine bits are kept by the kernel.
    Mode(u32),
}

impl QueueAttr {
    /// Stat field touched by this request.
    pub const fn field(self) -> StatField {
        match self {
            Self::Uid(_) => StatField::Uid,
            Self::Gid(_) => StatField::Gid,
            Self::Mode(_) => StatField::Mode,
        }
    }
}

/// Kernel message-queue primitives.
///
/// Implementations must be atomic per call: a failed `send` enqueues nothing and a failed
/// `recv` dequeues nothing.
pub trait Facility {
    /// Opens the queue for `key`, creating it with `mode` when `flags` contains `CREATE`.
    fn get(&self, key: i32, flags: MsgFlags, mode: u32) -> SysResult<QueueId>;

    /// Enqueues `payload` tagged with `mtype`.
    fn send(&self, id: QueueId, mtype: i64, payload: &[u8], flags: MsgFlags) -> SysResult<()>;

    /// Dequeues the oldest message selected by `filter`, returning its type and body.
    fn recv(
        &self,
        id: QueueId,
        filter: TypeFilter,
        max_bytes: usize,
        flags: MsgFlags,
    ) -> SysResult<(i64, Vec<u8>)>;

    /// Destroys the queue for every process sharing it.
    fn remove(&self, id: QueueId) -> SysResult<()>;

    /// Returns the metadata snapshot.
    fn stat(&self, id: QueueId) -> SysResult<QueueStats>;

    /// Updates one ownership or permission field.
    fn set(&self, id: QueueId, attr: QueueAttr) -> SysResult<()>;
}
