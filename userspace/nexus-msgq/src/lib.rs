// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Client abstraction over key-addressed kernel message queues
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: Unit tests per module + integration scenarios (tests/)
//!
//! PUBLIC API:
//!   - QueueHandle: attach/push/pop/purge/reset/detach/stats over one queue
//!   - Facility trait: kernel primitives the handle calls into
//!   - SysV: kernel-backed facility (Linux)
//!   - HostFacility: in-process facility for host-first tests
//!   - Payload, QueueStats, StatField, QueueConfig, QueueFile
//!   - Error: handle error taxonomy
//!
//! DEPENDENCIES:
//!   - libc: SysV syscalls and errno values
//!   - serde/serde_json: payload serialization
//!   - parking_lot: host facility state
//!   - log: diagnostics
//!
//! Processes rendezvous on a positive integer key. Queues are shared kernel objects: a
//! handle caches nothing, and [`QueueHandle::detach`] destroys the queue for every process
//! attached to the key.

#![deny(clippy::all, missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod facility;
pub mod host;
pub mod payload;
pub mod queue;
pub mod stats;

#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
mod sysv;

pub use config::{ConfigError, QueueConfig, QueueFile};
pub use error::{Error, Result};
pub use facility::{Errno, Facility, MsgFlags, QueueAttr, QueueId, SysResult, TypeFilter};
pub use host::HostFacility;
pub use payload::Payload;
pub use queue::{QueueHandle, MAX_MESSAGE_BYTES, QUEUE_MODE};
pub use stats::{QueueStats, StatField};
#[cfg(target_os = "linux")]
pub use sysv::SysV;
