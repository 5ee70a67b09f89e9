// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Queue metadata snapshot and field names
//! OWNERS: @runtime
//!
//! Field names follow the kernel `msqid_ds` layout (`msg_perm.uid`, `msg_qnum`, ...).

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeMap;

use crate::Error;

/// Metadata snapshot of a queue as reported by `IPC_STAT`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Owner user id.
    pub uid: u32,
    /// Owner group id.
    pub gid: u32,
    /// Permission bits.
    pub mode: u32,
    /// Time of the last send, seconds since the epoch (0 when never).
    pub stime: i64,
    /// Time of the last receive, seconds since the epoch (0 when never).
    pub rtime: i64,
    /// Time of the last change.
    pub ctime: i64,
    /// Messages currently queued.
    pub qnum: u64,
    /// Byte capacity of the queue.
    pub qbytes: u64,
    /// Pid of the last sender.
    pub lspid: i32,
    /// Pid of the last receiver.
    pub lrpid: i32,
}

impl QueueStats {
    /// Returns one field widened to `i64`.
    pub fn get(&self, field: StatField) -> i64 {
        match field {
            StatField::Uid => i64::from(self.uid),
            StatField::Gid => i64::from(self.gid),
            StatField::Mode => i64::from(self.mode),
            StatField::Stime => self.stime,
            StatField::Rtime => self.rtime,
            StatField::Ctime => self.ctime,
            StatField::Qnum => i64::try_from(self.qnum).unwrap_or(i64::MAX),
            StatField::Qbytes => i64::try_from(self.qbytes).unwrap_or(i64::MAX),
            StatField::Lspid => i64::from(self.lspid),
            StatField::Lrpid => i64::from(self.lrpid),
        }
    }

    /// Full snapshot keyed by kernel field name.
    pub fn to_map(&self) -> BTreeMap<&'static str, i64> {
        StatField::ALL.iter().map(|field| (field.name(), self.get(*field))).collect()
    }
}

/// Named field of [`QueueStats`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatField {
    /// `msg_perm.uid`
    Uid,
    /// `msg_perm.gid`
    Gid,
    /// `msg_perm.mode`
    Mode,
    /// `msg_stime`
    Stime,
    /// `msg_rtime`
    Rtime,
    /// `msg_ctime`
    Ctime,
    /// `msg_qnum`
    Qnum,
    /// `msg_qbytes`
    Qbytes,
    /// `msg_lspid`
    Lspid,
    /// `msg_lrpid`
    Lrpid,
}

impl StatField {
    /// Every field in kernel declaration order.
    pub const ALL: [StatField; 10] = [
        Self::Uid,
        Self::Gid,
        Self::Mode,
        Self::Stime,
        Self::Rtime,
        Self::Ctime,
        Self::Qnum,
        Self::Qbytes,
        Self::Lspid,
        Self::Lrpid,
    ];

    /// Kernel name of the field.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Uid => "msg_perm.uid",
            Self::Gid => "msg_perm.gid",
            Self::Mode => "msg_perm.mode",
            Self::Stime => "msg_stime",
            Self::Rtime => "msg_rtime",
            Self::Ctime => "msg_ctime",
            Self::Qnum => "msg_qnum",
            Self::Qbytes => "msg_qbytes",
            Self::Lspid => "msg_lspid",
            Self::Lrpid => "msg_lrpid",
        }
    }
}

impl fmt::Display for StatField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StatField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|field| field.name() == s)
            .ok_or_else(|| Error::UnknownStatField(s.to_string()))
    }
}
