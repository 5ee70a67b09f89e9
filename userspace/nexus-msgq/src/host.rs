// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: In-process message-queue facility for host-based testing
//!
//! OWNERS: @runtime
//!
//! PUBLIC API:
//!   - struct HostFacility: key-addressed queues shared by every clone
//!   - HostFacility::new(): facility owned by uid/gid 0 with the default byte capacity
//!   - HostFacility::with_owner(): facility creating queues for a given uid/gid
//!   - HostFacility::with_capacity(): facility with a custom per-queue byte capacity
//!
//! SECURITY INVARIANTS:
//!   - No unsafe code
//!   - A failed send or receive leaves the queue untouched
//!
//! ERROR CONDITIONS (same errno values as the kernel):
//!   - ENOENT: key unknown and CREATE not requested
//!   - EEXIST: key known and CREATE|EXCLUSIVE requested
//!   - EINVAL: unknown queue id, send type <= 0, message larger than capacity
//!   - EIDRM: queue removed while the caller was waiting
//!   - EAGAIN: queue full with NOWAIT
//!   - ENOMSG: no matching message with NOWAIT
//!   - E2BIG: matching message larger than the receive bound without NOERROR
//!
//! DEPENDENCIES:
//!   - parking_lot::{Mutex, Condvar}: shared state and blocked waiters

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::facility::{Errno, Facility, MsgFlags, QueueAttr, QueueId, SysResult, TypeFilter};
use crate::stats::QueueStats;

/// Default byte capacity of a queue (Linux `MSGMNB`).
pub const DEFAULT_QUEUE_BYTES: usize = 16384;

/// In-memory stand-in for the kernel facility. Clones share the same queues, the way
/// processes share a key.
#[derive(Clone)]
pub struct HostFacility {
    inner: Arc<Shared>,
}

struct Shared {
    state: Mutex<HostState>,
    changed: Condvar,
    uid: u32,
    gid: u32,
    capacity: usize,
}

#[derive(Default)]
struct HostState {
    next_id: i32,
    keys: HashMap<i32, i32>,
    queues: HashMap<i32, HostQueue>,
}

struct HostQueue {
    key: i32,
    stats: QueueStats,
    used_bytes: usize,
    messages: VecDeque<(i64, Vec<u8>)>,
}

impl HostQueue {
    fn position(&self, filter: TypeFilter) -> Option<usize> {
        self.messages.iter().position(|(ty, _)| filter.matches(*ty))
    }
}

impl Default for HostFacility {
    fn default() -> Self {
        Self::new()
    }
}

impl HostFacility {
    /// Creates a facility whose queues are owned by uid/gid 0.
    pub fn new() -> Self {
        Self::build(0, 0, DEFAULT_QUEUE_BYTES)
    }

    /// Creates a facility whose queues are owned by `uid`/`gid`.
    pub fn with_owner(uid: u32, gid: u32) -> Self {
        Self::build(uid, gid, DEFAULT_QUEUE_BYTES)
    }

    /// Creates a facility whose queues hold at most `capacity` payload bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::build(0, 0, capacity)
    }

    fn build(uid: u32, gid: u32, capacity: usize) -> Self {
        Self {
            inner: Arc::new(Shared {
                state: Mutex::new(HostState::default()),
                changed: Condvar::new(),
                uid,
                gid,
                capacity,
            }),
        }
    }

    /// Number of live queues.
    pub fn queue_count(&self) -> usize {
        self.inner.state.lock().queues.len()
    }

    fn wait(&self, state: &mut MutexGuard<'_, HostState>) {
        self.inner.changed.wait(state);
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

fn pid() -> i32 {
    i32::try_from(std::process::id()).unwrap_or(i32::MAX)
}

fn lookup(state: &mut HostState, id: QueueId) -> SysResult<&mut HostQueue> {
    state.queues.get_mut(&id.raw()).ok_or(Errno(libc::EINVAL))
}

impl Facility for HostFacility {
    fn get(&self, key: i32, flags: MsgFlags, mode: u32) -> SysResult<QueueId> {
        let mut state = self.inner.state.lock();
        if let Some(id) = state.keys.get(&key) {
            if flags.contains(MsgFlags::CREATE | MsgFlags::EXCLUSIVE) {
                return Err(Errno(libc::EEXIST));
            }
            return Ok(QueueId::from_raw(*id));
        }
        if !flags.contains(MsgFlags::CREATE) {
            return Err(Errno(libc::ENOENT));
        }
        let id = state.next_id;
        state.next_id += 1;
        let queue = HostQueue {
            key,
            stats: QueueStats {
                uid: self.inner.uid,
                gid: self.inner.gid,
                mode: mode & 0o777,
                ctime: now_secs(),
                qbytes: self.inner.capacity as u64,
                ..QueueStats::default()
            },
            used_bytes: 0,
            messages: VecDeque::new(),
        };
        state.keys.insert(key, id);
        state.queues.insert(id, queue);
        Ok(QueueId::from_raw(id))
    }

    fn send(&self, id: QueueId, mtype: i64, payload: &[u8], flags: MsgFlags) -> SysResult<()> {
        if mtype < 1 {
            return Err(Errno(libc::EINVAL));
        }
        let mut state = self.inner.state.lock();
        loop {
            let queue = lookup(&mut state, id).map_err(|_| Errno(libc::EIDRM))?;
            let capacity = usize::try_from(queue.stats.qbytes).unwrap_or(usize::MAX);
            if payload.len() > capacity {
                return Err(Errno(libc::EINVAL));
            }
            if queue.used_bytes + payload.len() <= capacity {
                queue.messages.push_back((mtype, payload.to_vec()));
                queue.used_bytes += payload.len();
                queue.stats.qnum += 1;
                queue.stats.stime = now_secs();
                queue.stats.lspid = pid();
                self.inner.changed.notify_all();
                return Ok(());
            }
            if flags.contains(MsgFlags::NOWAIT) {
                return Err(Errno(libc::EAGAIN));
            }
            self.wait(&mut state);
        }
    }

    fn recv(
        &self,
        id: QueueId,
        filter: TypeFilter,
        max_bytes: usize,
        flags: MsgFlags,
    ) -> SysResult<(i64, Vec<u8>)> {
        let mut state = self.inner.state.lock();
        loop {
            let queue = lookup(&mut state, id).map_err(|_| Errno(libc::EIDRM))?;
            if let Some(index) = queue.position(filter) {
                let oversized = queue.messages[index].1.len() > max_bytes;
                if oversized && !flags.contains(MsgFlags::NOERROR) {
                    return Err(Errno(libc::E2BIG));
                }
                let Some((ty, mut body)) = queue.messages.remove(index) else {
                    return Err(Errno(libc::EINVAL));
                };
                queue.used_bytes -= body.len();
                queue.stats.qnum -= 1;
                queue.stats.rtime = now_secs();
                queue.stats.lrpid = pid();
                body.truncate(max_bytes);
                self.inner.changed.notify_all();
                return Ok((ty, body));
            }
            if flags.contains(MsgFlags::NOWAIT) {
                return Err(Errno(libc::ENOMSG));
            }
            self.wait(&mut state);
        }
    }

    fn remove(&self, id: QueueId) -> SysResult<()> {
        let mut state = self.inner.state.lock();
        let queue = state.queues.remove(&id.raw()).ok_or(Errno(libc::EINVAL))?;
        state.keys.remove(&queue.key);
        self.inner.changed.notify_all();
        Ok(())
    }

    fn stat(&self, id: QueueId) -> SysResult<QueueStats> {
        let mut state = self.inner.state.lock();
        Ok(lookup(&mut state, id)?.stats)
    }

    fn set(&self, id: QueueId, attr: QueueAttr) -> SysResult<()> {
        let mut state = self.inner.state.lock();
        let queue = lookup(&mut state, id)?;
        match attr {
            QueueAttr::Uid(uid) => queue.stats.uid = uid,
            QueueAttr::Gid(gid) => queue.stats.gid = gid,
            QueueAttr::Mode(mode) => queue.stats.mode = mode & 0o777,
        }
        queue.stats.ctime = now_secs();
        Ok(())
    }
}
