// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Riptide Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Stream scheduler seam and the driver-side marker directory.
//!
//! The command-stream scheduler itself is an external collaborator; this
//! module defines the narrow trait the sync subsystem consumes plus the
//! process-shared [`SharedMarkerDirectory`] through which import proxies
//! resolve the origin event's current marker.

pub mod testing;

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::context::ContextFingerprint;
use crate::events::EventId;

/// Identifier of a device execution stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(u64);

impl StreamId {
    /// The default ("null") stream every scheduler exposes.
    pub const DEFAULT: StreamId = StreamId(0);

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Display for StreamId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Stream({})", self.0)
    }
}

/// Scheduler-level completion token inserted by `record`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarkerId(u64);

impl MarkerId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Display for MarkerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Marker({})", self.0)
    }
}

/// Non-blocking marker completion status.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MarkerStatus {
    Pending,
    Complete,
}

/// Narrow interface onto the device command-stream scheduler.
///
/// The scheduler orders work and markers on device streams and executes them
/// asynchronously relative to all host threads. Both operations are
/// non-blocking.
pub trait StreamScheduler: Send + Sync {
    /// Insert a completion marker at the current tail of `stream`.
    fn enqueue_marker(&self, stream: StreamId) -> anyhow::Result<MarkerId>;

    /// Poll a previously enqueued marker for completion.
    fn poll_marker(&self, marker: MarkerId) -> anyhow::Result<MarkerStatus>;
}

/// Key identifying an origin event across process boundaries.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct OriginKey {
    pub fingerprint: ContextFingerprint,
    pub event: EventId,
}

impl Display for OriginKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Origin({}/{})", self.fingerprint, self.event)
    }
}

/// Driver-side directory mapping origin events to their current marker.
///
/// Registries publish a binding when a sharable event is created, rebind it on
/// every `record`, and withdraw it on destroy. Import proxies resolve through
/// the directory on every poll, so they always track the origin's latest
/// marker. A missing entry means the origin is gone.
///
/// Cloning shares the underlying table; cooperating runtimes (standing in for
/// processes attached to the same driver) are handed clones of one directory.
#[derive(Clone, Default)]
pub struct SharedMarkerDirectory {
    inner: Arc<DashMap<OriginKey, Option<MarkerId>>>,
}

impl SharedMarkerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish or rebind an origin event's marker. `None` means created but
    /// not yet recorded.
    pub fn publish(&self, key: OriginKey, marker: Option<MarkerId>) {
        self.inner.insert(key, marker);
    }

    /// Withdraw an origin event entirely; subsequent lookups report it gone.
    pub fn withdraw(&self, key: &OriginKey) {
        self.inner.remove(key);
    }

    /// Withdraw every binding published by `fingerprint` (context teardown).
    pub fn withdraw_context(&self, fingerprint: ContextFingerprint) {
        self.inner.retain(|key, _| key.fingerprint != fingerprint);
    }

    /// Resolve an origin event. `None` = gone; `Some(None)` = not yet
    /// recorded; `Some(Some(marker))` = current marker.
    pub fn lookup(&self, key: &OriginKey) -> Option<Option<MarkerId>> {
        self.inner.get(key).map(|entry| *entry.value())
    }
}
