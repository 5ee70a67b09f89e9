// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Handle over one attached key-addressed message queue
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//!
//! PUBLIC API:
//!   - QueueHandle::attach_with(): attach (creating if absent) through any facility
//!   - QueueHandle::attach(): attach through the kernel facility (Linux)
//!   - push/pop: typed send/receive honouring the blocking and serialize options
//!   - purge/reset: non-blocking drains by type / of everything
//!   - detach: destroys the queue for every process sharing the key
//!   - stats/stat/stat_by_name and typed accessors over the metadata snapshot
//!
//! INVARIANTS:
//!   - A queue id is held iff the last attach succeeded and no detach happened since
//!   - Drains never block and stop on the first receive failure
//!   - No client-side buffering: every call is one facility round trip

use log::{debug, trace, warn};

use crate::config::QueueConfig;
use crate::facility::{Errno, Facility, MsgFlags, QueueAttr, QueueId, TypeFilter};
use crate::payload::Payload;
use crate::stats::{QueueStats, StatField};
use crate::{Error, Result};

/// Largest payload, in bytes, a handle accepts on receive.
pub const MAX_MESSAGE_BYTES: usize = 16384;

/// Permission bits requested when attaching.
pub const QUEUE_MODE: u32 = 0o666;

/// Type filter for `message_type`: 0 selects any type, negatives are unsupported.
fn filter_for(message_type: i64) -> Option<TypeFilter> {
    match message_type {
        0 => Some(TypeFilter::Any),
        ty if ty > 0 => Some(TypeFilter::Exact(ty)),
        _ => None,
    }
}

/// Client handle for a single kernel message queue.
pub struct QueueHandle<F: Facility> {
    facility: F,
    key: i32,
    id: Option<QueueId>,
    config: QueueConfig,
}

#[cfg(target_os = "linux")]
impl QueueHandle<crate::SysV> {
    /// Attaches to `key` through the kernel with default options.
    pub fn attach(key: i32) -> Result<Self> {
        Self::attach_with(crate::SysV, key, QueueConfig::default())
    }
}

impl<F: Facility> QueueHandle<F> {
    /// Attaches to `key` through `facility`, creating the queue when absent.
    ///
    /// Fails with [`Error::InvalidMessageType`] when `config.message_type` is not positive.
    pub fn attach_with(facility: F, key: i32, config: QueueConfig) -> Result<Self> {
        check_message_type(config.message_type)?;
        let mut handle = Self { facility, key, id: None, config };
        handle.attach_to(key)?;
        Ok(handle)
    }

    /// Re-targets the handle to `key`.
    ///
    /// An invalid key leaves the current attachment untouched. A facility failure stores
    /// the key but leaves the handle unattached, so [`Self::reattach`] can retry.
    pub fn attach_to(&mut self, key: i32) -> Result<()> {
        if key <= 0 {
            return Err(Error::InvalidKey(key));
        }
        self.key = key;
        match self.facility.get(key, MsgFlags::CREATE, QUEUE_MODE) {
            Ok(id) => {
                debug!("msgq: attached key {key} ({id})");
                self.id = Some(id);
                Ok(())
            }
            Err(errno) => {
                self.id = None;
                Err(Error::AttachFailed { key, errno })
            }
        }
    }

    /// Attaches again to the stored key.
    pub fn reattach(&mut self) -> Result<()> {
        self.attach_to(self.key)
    }

    /// Returns whether the handle currently holds a queue.
    pub fn is_attached(&self) -> bool {
        self.id.is_some()
    }

    fn id(&self) -> Result<QueueId> {
        self.id.ok_or(Error::NotAttached)
    }

    /// Sends `message` tagged with `message_type` (default type when `None`).
    pub fn push(&self, message: impl Into<Payload>, message_type: Option<i64>) -> Result<()> {
        let id = self.id()?;
        let message = message.into();
        let mtype = message_type.unwrap_or(self.config.message_type);
        let body = message.encode(self.config.serialize).map_err(|reason| Error::Send {
            errno: Errno(libc::EINVAL),
            description: format!("{} ({reason})", message.describe()),
        })?;
        self.facility
            .send(id, mtype, &body, MsgFlags::for_wait(self.config.blocking))
            .map_err(|errno| Error::Send { errno, description: message.describe() })?;
        trace!("msgq: pushed {} bytes type {mtype} to key {}", body.len(), self.key);
        Ok(())
    }

    /// Receives the oldest message of `message_type` (default type when `None`, any type
    /// for 0).
    pub fn pop(&self, message_type: Option<i64>) -> Result<Payload> {
        let id = self.id()?;
        let mtype = message_type.unwrap_or(self.config.message_type);
        let filter = filter_for(mtype).ok_or_else(|| Error::Receive {
            errno: Some(Errno(libc::EINVAL)),
            reason: format!("unsupported type filter {mtype}"),
        })?;
        let (_, body) = self
            .facility
            .recv(id, filter, MAX_MESSAGE_BYTES, MsgFlags::for_wait(self.config.blocking))
            .map_err(map_recv_err)?;
        trace!("msgq: popped {} bytes type {mtype} from key {}", body.len(), self.key);
        Payload::decode(body, self.config.serialize).map_err(|err| Error::Receive {
            errno: None,
            reason: format!("failed to decode payload: {err}"),
        })
    }

    /// Drops every queued message of `message_type` (default type when `None`) and returns
    /// how many were removed.
    pub fn purge(&self, message_type: Option<i64>) -> usize {
        let mtype = message_type.unwrap_or(self.config.message_type);
        match filter_for(mtype) {
            Some(filter) => self.drain(filter),
            None => {
                warn!("msgq: purge ignored unsupported type filter {mtype}");
                0
            }
        }
    }

    /// Drops every queued message regardless of type and returns how many were removed.
    pub fn reset(&self) -> usize {
        self.drain(TypeFilter::Any)
    }

    fn drain(&self, filter: TypeFilter) -> usize {
        let Some(id) = self.id else {
            debug!("msgq: drain skipped, handle not attached");
            return 0;
        };
        let flags = MsgFlags::NOWAIT | MsgFlags::NOERROR;
        let mut drained = 0;
        loop {
            match self.facility.recv(id, filter, MAX_MESSAGE_BYTES, flags) {
                Ok(_) => drained += 1,
                Err(errno) if errno.raw() == libc::ENOMSG => break,
                Err(errno) => {
                    warn!("msgq: drain of key {} stopped: {errno}", self.key);
                    break;
                }
            }
        }
        debug!("msgq: drained {drained} messages ({filter:?}) from key {}", self.key);
        drained
    }

    /// Destroys the queue for every process attached to the key.
    ///
    /// Unlike a plain `IPC_RMID`, this also drops the held id: the handle becomes
    /// unattached instead of keeping a stale id, and [`Self::reattach`] creates a fresh
    /// queue under the same key.
    pub fn detach(&mut self) -> Result<()> {
        let id = self.id()?;
        self.facility.remove(id).map_err(Error::Remove)?;
        self.id = None;
        debug!("msgq: removed queue for key {}", self.key);
        Ok(())
    }

    /// Returns the metadata snapshot.
    pub fn stats(&self) -> Result<QueueStats> {
        let id = self.id()?;
        self.facility.stat(id).map_err(Error::Stat)
    }

    /// Returns one metadata field.
    pub fn stat(&self, field: StatField) -> Result<i64> {
        Ok(self.stats()?.get(field))
    }

    /// Returns one metadata field by kernel name, e.g. `msg_qnum`.
    pub fn stat_by_name(&self, name: &str) -> Result<i64> {
        let field: StatField = name.parse()?;
        self.stat(field)
    }

    /// Messages currently queued.
    pub fn size(&self) -> Result<u64> {
        Ok(self.stats()?.qnum)
    }

    /// Alias of [`Self::size`].
    pub fn qnum(&self) -> Result<u64> {
        self.size()
    }

    /// Byte capacity of the queue.
    pub fn bytes(&self) -> Result<u64> {
        Ok(self.stats()?.qbytes)
    }

    /// Alias of [`Self::bytes`].
    pub fn qbytes(&self) -> Result<u64> {
        self.bytes()
    }

    /// Owner user id.
    pub fn uid(&self) -> Result<u32> {
        Ok(self.stats()?.uid)
    }

    /// Owner group id.
    pub fn gid(&self) -> Result<u32> {
        Ok(self.stats()?.gid)
    }

    /// Permission bits.
    pub fn mode(&self) -> Result<u32> {
        Ok(self.stats()?.mode)
    }

    /// Time of the last send.
    pub fn stime(&self) -> Result<i64> {
        Ok(self.stats()?.stime)
    }

    /// Time of the last receive.
    pub fn rtime(&self) -> Result<i64> {
        Ok(self.stats()?.rtime)
    }

    /// Time of the last change.
    pub fn ctime(&self) -> Result<i64> {
        Ok(self.stats()?.ctime)
    }

    /// Pid of the last sender.
    pub fn lspid(&self) -> Result<i32> {
        Ok(self.stats()?.lspid)
    }

    /// Pid of the last receiver.
    pub fn lrpid(&self) -> Result<i32> {
        Ok(self.stats()?.lrpid)
    }

    /// Changes the owner user id.
    pub fn set_uid(&self, uid: u32) -> Result<()> {
        self.set_attr(QueueAttr::Uid(uid))
    }

    /// Changes the owner group id.
    pub fn set_gid(&self, gid: u32) -> Result<()> {
        self.set_attr(QueueAttr::Gid(gid))
    }

    /// Changes the permission bits.
    pub fn set_mode(&self, mode: u32) -> Result<()> {
        self.set_attr(QueueAttr::Mode(mode))
    }

    fn set_attr(&self, attr: QueueAttr) -> Result<()> {
        let id = self.id()?;
        self.facility
            .set(id, attr)
            .map_err(|errno| Error::SetAttribute { field: attr.field(), errno })?;
        debug!("msgq: key {} set {attr:?}", self.key);
        Ok(())
    }

    /// Attached key.
    pub fn key(&self) -> i32 {
        self.key
    }

    /// Current handle options.
    pub fn config(&self) -> QueueConfig {
        self.config
    }

    /// Whether push/pop wait for space or messages.
    pub fn blocking(&self) -> bool {
        self.config.blocking
    }

    /// Switches between blocking and non-blocking push/pop.
    pub fn set_blocking(&mut self, blocking: bool) {
        self.config.blocking = blocking;
    }

    /// Whether payloads are serialized.
    pub fn serialize(&self) -> bool {
        self.config.serialize
    }

    /// Switches payload serialization.
    pub fn set_serialize(&mut self, serialize: bool) {
        self.config.serialize = serialize;
    }

    /// Type used when an operation omits one.
    pub fn message_type(&self) -> i64 {
        self.config.message_type
    }

    /// Changes the default message type; it must be positive.
    pub fn set_message_type(&mut self, message_type: i64) -> Result<()> {
        check_message_type(message_type)?;
        self.config.message_type = message_type;
        Ok(())
    }

    /// Underlying facility.
    pub fn facility(&self) -> &F {
        &self.facility
    }
}

fn check_message_type(message_type: i64) -> Result<()> {
    if message_type <= 0 {
        return Err(Error::InvalidMessageType(message_type));
    }
    Ok(())
}

fn map_recv_err(errno: Errno) -> Error {
    match errno.raw() {
        libc::ENOMSG | libc::EAGAIN => Error::WouldBlock,
        libc::E2BIG => Error::MessageTooLarge { limit: MAX_MESSAGE_BYTES },
        _ => Error::Receive { errno: Some(errno), reason: errno.to_string() },
    }
}
