// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Kernel-backed facility over SysV message-queue syscalls (Linux)
//! OWNERS: @runtime
//! PUBLIC API: SysV
//! DEPENDS_ON: libc (msgget/msgsnd/msgrcv/msgctl)
//! INVARIANTS:
//!   - Unsafe is limited to the syscall boundary; buffers are built and decoded in safe code
//!   - Message buffers are `c_long` aligned with `mtype` in the first word

// libc field widths differ between targets; the casts are identities on some of them.
#![allow(clippy::unnecessary_cast)]

use core::mem::size_of;

use libc::{c_int, c_long, c_void};

use crate::facility::{Errno, Facility, MsgFlags, QueueAttr, QueueId, SysResult, TypeFilter};
use crate::stats::QueueStats;

const WORD: usize = size_of::<c_long>();

/// Facility backed by the host kernel's SysV message queues.
#[derive(Clone, Copy, Debug, Default)]
pub struct SysV;

/// `struct msgbuf` laid out as whole words: `mtype` followed by the body.
struct MsgBuf {
    words: Vec<c_long>,
}

impl MsgBuf {
    fn with_capacity(body_len: usize) -> Self {
        Self { words: vec![0; 1 + body_len.div_ceil(WORD)] }
    }

    fn with_body(mtype: i64, body: &[u8]) -> Self {
        let mut buf = Self::with_capacity(body.len());
        buf.words[0] = mtype as c_long;
        for (word, chunk) in buf.words[1..].iter_mut().zip(body.chunks(WORD)) {
            let mut raw = [0u8; WORD];
            raw[..chunk.len()].copy_from_slice(chunk);
            *word = c_long::from_ne_bytes(raw);
        }
        buf
    }

    fn mtype(&self) -> i64 {
        i64::from(self.words[0])
    }

    fn body(&self, len: usize) -> Vec<u8> {
        self.words[1..].iter().flat_map(|word| word.to_ne_bytes()).take(len).collect()
    }

    fn as_ptr(&self) -> *const c_void {
        self.words.as_ptr().cast()
    }

    fn as_mut_ptr(&mut self) -> *mut c_void {
        self.words.as_mut_ptr().cast()
    }
}

fn stat_raw(id: QueueId) -> SysResult<libc::msqid_ds> {
    // SAFETY: msqid_ds is a plain C struct for which all-zero bytes are a valid value.
    let mut ds: libc::msqid_ds = unsafe { core::mem::zeroed() };
    // SAFETY: `ds` is a valid, writable msqid_ds for the duration of the call.
    let rc = unsafe { libc::msgctl(id.raw(), libc::IPC_STAT, &mut ds) };
    if rc < 0 {
        return Err(Errno::last());
    }
    Ok(ds)
}

impl Facility for SysV {
    fn get(&self, key: i32, flags: MsgFlags, mode: u32) -> SysResult<QueueId> {
        let msgflg = flags.bits() | (mode & 0o777) as c_int;
        // SAFETY: msgget takes plain integers and touches no caller memory.
        let id = unsafe { libc::msgget(key as libc::key_t, msgflg) };
        if id < 0 {
            return Err(Errno::last());
        }
        Ok(QueueId::from_raw(id))
    }

    fn send(&self, id: QueueId, mtype: i64, payload: &[u8], flags: MsgFlags) -> SysResult<()> {
        let buf = MsgBuf::with_body(mtype, payload);
        // SAFETY: `buf` holds the mtype word followed by at least `payload.len()` body bytes.
        let rc = unsafe { libc::msgsnd(id.raw(), buf.as_ptr(), payload.len(), flags.bits()) };
        if rc < 0 {
            return Err(Errno::last());
        }
        Ok(())
    }

    fn recv(
        &self,
        id: QueueId,
        filter: TypeFilter,
        max_bytes: usize,
        flags: MsgFlags,
    ) -> SysResult<(i64, Vec<u8>)> {
        let mut buf = MsgBuf::with_capacity(max_bytes);
        // SAFETY: `buf` has room for the mtype word plus `max_bytes` body bytes, which is the
        // most the kernel writes for this `msgsz`.
        let received = unsafe {
            libc::msgrcv(
                id.raw(),
                buf.as_mut_ptr(),
                max_bytes,
                filter.raw() as c_long,
                flags.bits(),
            )
        };
        if received < 0 {
            return Err(Errno::last());
        }
        let len = usize::try_from(received).unwrap_or(0);
        Ok((buf.mtype(), buf.body(len)))
    }

    fn remove(&self, id: QueueId) -> SysResult<()> {
        // SAFETY: IPC_RMID ignores the buffer argument, so a null pointer is permitted.
        let rc = unsafe { libc::msgctl(id.raw(), libc::IPC_RMID, core::ptr::null_mut()) };
        if rc < 0 {
            return Err(Errno::last());
        }
        Ok(())
    }

    fn stat(&self, id: QueueId) -> SysResult<QueueStats> {
        let ds = stat_raw(id)?;
        Ok(QueueStats {
            uid: ds.msg_perm.uid as u32,
            gid: ds.msg_perm.gid as u32,
            mode: ds.msg_perm.mode as u32,
            stime: ds.msg_stime as i64,
            rtime: ds.msg_rtime as i64,
            ctime: ds.msg_ctime as i64,
            qnum: ds.msg_qnum as u64,
            qbytes: ds.msg_qbytes as u64,
            lspid: ds.msg_lspid as i32,
            lrpid: ds.msg_lrpid as i32,
        })
    }

    fn set(&self, id: QueueId, attr: QueueAttr) -> SysResult<()> {
        let mut ds = stat_raw(id)?;
        match attr {
            QueueAttr::Uid(uid) => ds.msg_perm.uid = uid as _,
            QueueAttr::Gid(gid) => ds.msg_perm.gid = gid as _,
            QueueAttr::Mode(mode) => ds.msg_perm.mode = (mode & 0o777) as _,
        }
        // SAFETY: `ds` is a fully initialised msqid_ds obtained from IPC_STAT.
        let rc = unsafe { libc::msgctl(id.raw(), libc::IPC_SET, &mut ds) };
        if rc < 0 {
            return Err(Errno::last());
        }
        Ok(())
    }
}
