// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Riptide Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Context identity: the binding of a process to a device instance.
//!
//! Every [`SyncRuntime`](crate::SyncRuntime) samples a fresh
//! [`ContextFingerprint`] at initialization. The fingerprint travels inside
//! exported handles and is how import validation tells "a different process"
//! from "the process that exported this".

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 16-byte fingerprint identifying the context that created an event.
///
/// Sampled once per runtime initialization; two runtimes never share a
/// fingerprint, even inside one OS process.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextFingerprint([u8; 16]);

impl ContextFingerprint {
    /// Sample a fresh fingerprint.
    pub fn generate() -> Self {
        Self(*Uuid::new_v4().as_bytes())
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl Display for ContextFingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&Uuid::from_bytes(self.0), f)
    }
}

impl fmt::Debug for ContextFingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ContextFingerprint({self})")
    }
}

/// The binding of a process to a specific device instance.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceContext {
    device_ordinal: u32,
    fingerprint: ContextFingerprint,
}

impl DeviceContext {
    pub fn new(device_ordinal: u32) -> Self {
        Self {
            device_ordinal,
            fingerprint: ContextFingerprint::generate(),
        }
    }

    pub fn device_ordinal(&self) -> u32 {
        self.device_ordinal
    }

    pub fn fingerprint(&self) -> ContextFingerprint {
        self.fingerprint
    }
}

impl Display for DeviceContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DeviceContext(device={}, fingerprint={})",
            self.device_ordinal, self.fingerprint
        )
    }
}
