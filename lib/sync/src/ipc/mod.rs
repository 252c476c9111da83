// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Riptide Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Cross-process handle export and import validation.
//!
//! Export serializes an event's identity plus the creating context; import
//! validates the handle structurally, rejects same-context use, and produces
//! a proxy event bound to the origin's marker.

mod wire;

pub use wire::{ExportedHandle, HANDLE_LEN};

use std::sync::Arc;

use tracing::debug;

use crate::error::{EventError, EventResult};
use crate::events::{Event, EventRegistry, EventSlot};
use crate::scheduler::OriginKey;

/// Serialize an event's identity for transport to another process.
///
/// Requires the interprocess flag; recording state is irrelevant, so a handle
/// may be exported before the event is first recorded. Re-exporting a proxy
/// yields a handle for the *origin* event, keeping handles composable across
/// more than two processes.
pub(crate) fn export_handle(
    slot: &Arc<EventSlot>,
    registry: &Arc<EventRegistry>,
) -> EventResult<ExportedHandle> {
    if !slot.flags().interprocess_sharable {
        return Err(EventError::NotSharable { event: slot.id() });
    }
    let (fingerprint, event) = match slot.origin_key() {
        Some(origin) => (origin.fingerprint, origin.event),
        None => (registry.context().fingerprint(), slot.id()),
    };
    debug!(event = %slot.id(), origin = %event, "exported event handle");
    Ok(ExportedHandle::new(
        event,
        registry.context().device_ordinal(),
        fingerprint,
        slot.flags(),
    ))
}

/// Validate a handle against the importing context and build a proxy event.
///
/// Importing inside the context that exported the handle fails with
/// `ContextMismatch`; a handle without the interprocess bit can only have been
/// forged and is rejected as invalid. The proxy carries its own copy of the
/// flags from the handle and resolves the origin's current marker on every
/// poll, so a handle exported before `record` becomes live once the origin
/// records.
pub(crate) fn import_handle(
    handle: &ExportedHandle,
    registry: &Arc<EventRegistry>,
) -> EventResult<Event> {
    if !handle.flags().interprocess_sharable {
        return Err(EventError::InvalidHandle(
            "handle flags missing the interprocess bit".to_string(),
        ));
    }
    if handle.fingerprint() == registry.context().fingerprint() {
        return Err(EventError::ContextMismatch);
    }
    let origin = OriginKey {
        fingerprint: handle.fingerprint(),
        event: handle.event(),
    };
    let slot = registry.import(handle.flags(), origin)?;
    Ok(Event::new(slot, registry.clone()))
}
