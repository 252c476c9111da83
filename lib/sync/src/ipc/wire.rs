// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Riptide Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Fixed-layout wire codec for exported event handles.
//!
//! Layout, 32 bytes total, big-endian integers:
//! `event_id: u64 | device_ordinal: u32 | context_fingerprint: [u8; 16] | flags: u32`.
//! Bit 0 of flags = timing enabled, bit 1 = interprocess sharable; any other
//! bit fails decoding.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::context::ContextFingerprint;
use crate::error::{EventError, EventResult};
use crate::events::{EventFlags, EventId};

/// Exact size of an encoded handle.
pub const HANDLE_LEN: usize = 32;

/// Opaque, immutable identity of an exported event.
///
/// Produced only by [`Event::export_handle`](crate::Event::export_handle);
/// consumed only by [`SyncRuntime::import_handle`](crate::SyncRuntime::import_handle).
/// The bytes are moved between processes by an out-of-band transport this
/// subsystem does not provide; any number of cooperating processes may import
/// the same handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportedHandle {
    event: EventId,
    device_ordinal: u32,
    fingerprint: ContextFingerprint,
    flags: EventFlags,
}

impl ExportedHandle {
    pub(crate) fn new(
        event: EventId,
        device_ordinal: u32,
        fingerprint: ContextFingerprint,
        flags: EventFlags,
    ) -> Self {
        Self {
            event,
            device_ordinal,
            fingerprint,
            flags,
        }
    }

    /// Origin event id inside the exporting context.
    pub fn event(&self) -> EventId {
        self.event
    }

    pub fn device_ordinal(&self) -> u32 {
        self.device_ordinal
    }

    /// Fingerprint of the exporting context.
    pub fn fingerprint(&self) -> ContextFingerprint {
        self.fingerprint
    }

    pub fn flags(&self) -> EventFlags {
        self.flags
    }

    /// Encode into the fixed 32-byte wire layout.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HANDLE_LEN);
        buf.put_u64(self.event.raw());
        buf.put_u32(self.device_ordinal);
        buf.put_slice(self.fingerprint.as_bytes());
        buf.put_u32(self.flags.bits());
        buf.freeze()
    }

    /// Decode and structurally validate a handle.
    pub fn from_bytes(bytes: &[u8]) -> EventResult<Self> {
        if bytes.len() != HANDLE_LEN {
            return Err(EventError::InvalidHandle(format!(
                "expected {HANDLE_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut buf = bytes;
        let event = EventId::from_raw(buf.get_u64());
        let device_ordinal = buf.get_u32();
        let mut fingerprint = [0u8; 16];
        buf.copy_to_slice(&mut fingerprint);
        let raw_flags = buf.get_u32();
        let flags = EventFlags::from_bits(raw_flags).ok_or_else(|| {
            EventError::InvalidHandle(format!("unknown flag bits {raw_flags:#x}"))
        })?;
        Ok(Self {
            event,
            device_ordinal,
            fingerprint: ContextFingerprint::from_bytes(fingerprint),
            flags,
        })
    }
}
