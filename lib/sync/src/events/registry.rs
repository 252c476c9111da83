// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Riptide Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Event registry: the single source of truth for event identity and state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::{EventFlags, EventId, EventSlot, EventState, EventWaiter};
use crate::clock::DeviceClock;
use crate::context::DeviceContext;
use crate::error::{EventError, EventResult};
use crate::scheduler::{MarkerStatus, OriginKey, SharedMarkerDirectory, StreamId, StreamScheduler};

/// Owns the set of live event slots for one context.
///
/// Created by [`SyncRuntime`](crate::SyncRuntime); all event operations flow
/// through here. The id-to-slot map is the only shared mutable structure; the
/// per-slot state behind its own short-held lock makes `query`'s
/// read-then-update atomic.
pub struct EventRegistry {
    context: DeviceContext,
    scheduler: Arc<dyn StreamScheduler>,
    clock: Arc<dyn DeviceClock>,
    directory: SharedMarkerDirectory,
    slots: DashMap<EventId, Arc<EventSlot>>,
    next_id: AtomicU64,
    // feeds the background marker poller owned by the runtime
    poll_tx: mpsc::UnboundedSender<Arc<EventSlot>>,
    shutdown: AtomicBool,
}

impl EventRegistry {
    pub(crate) fn new(
        context: DeviceContext,
        scheduler: Arc<dyn StreamScheduler>,
        clock: Arc<dyn DeviceClock>,
        directory: SharedMarkerDirectory,
        poll_tx: mpsc::UnboundedSender<Arc<EventSlot>>,
    ) -> Self {
        Self {
            context,
            scheduler,
            clock,
            directory,
            slots: DashMap::new(),
            next_id: AtomicU64::new(1),
            poll_tx,
            shutdown: AtomicBool::new(false),
        }
    }

    pub(crate) fn context(&self) -> DeviceContext {
        self.context
    }

    pub(crate) fn directory(&self) -> &SharedMarkerDirectory {
        &self.directory
    }

    fn origin_key(&self, event: EventId) -> OriginKey {
        OriginKey {
            fingerprint: self.context.fingerprint(),
            event,
        }
    }

    fn allocate_id(&self) -> EventId {
        EventId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocate a fresh origin event in state `Unrecorded`.
    pub(crate) fn create(&self, flags: EventFlags) -> EventResult<Arc<EventSlot>> {
        if self.is_shutdown() {
            return Err(EventError::Shutdown);
        }
        let id = self.allocate_id();
        let slot = Arc::new(EventSlot::origin(id, flags));
        self.slots.insert(id, slot.clone());
        if flags.interprocess_sharable {
            // visible to importers before the first record
            self.directory.publish(self.origin_key(id), None);
        }
        trace!(event = %id, ?flags, "event created");
        Ok(slot)
    }

    /// Allocate a proxy slot bound to an origin event in another context.
    pub(crate) fn import(&self, flags: EventFlags, origin: OriginKey) -> EventResult<Arc<EventSlot>> {
        if self.is_shutdown() {
            return Err(EventError::Shutdown);
        }
        let id = self.allocate_id();
        let slot = Arc::new(EventSlot::proxy(id, flags, origin));
        self.slots.insert(id, slot.clone());
        debug!(event = %id, %origin, "imported proxy event");
        Ok(slot)
    }

    /// Enqueue a marker at the tail of `stream` and bind the event to it.
    pub(crate) fn record(&self, slot: &Arc<EventSlot>, stream: StreamId) -> EventResult<()> {
        if self.is_shutdown() {
            return Err(EventError::Shutdown);
        }
        if slot.origin_key().is_some() {
            return Err(EventError::ProxyNotRecordable { event: slot.id() });
        }
        let marker = self.scheduler.enqueue_marker(stream)?;
        slot.bind(marker, stream)?;
        if slot.flags().interprocess_sharable {
            self.directory
                .publish(self.origin_key(slot.id()), Some(marker));
        }
        debug!(event = %slot.id(), %marker, %stream, "event recorded");
        // hand to the background poller so completion is observed promptly
        let _ = self.poll_tx.send(slot.clone());
        Ok(())
    }

    /// Non-blocking completion poll; finalizes the slot (capturing a
    /// timestamp when timing is enabled) if its marker finished.
    ///
    /// For proxies, first resolves the origin's current marker through the
    /// directory: a missing binding means the origin was destroyed.
    pub(crate) fn poll_slot(&self, slot: &Arc<EventSlot>) -> EventResult<EventState> {
        if let Some(origin) = slot.origin_key() {
            match self.directory.lookup(&origin) {
                None => {
                    slot.mark_gone();
                    return Err(EventError::ResourceGone { event: slot.id() });
                }
                Some(None) => return Ok(EventState::Unrecorded),
                Some(Some(marker)) => slot.track_marker(marker),
            }
        }

        let (state, pending) = slot.snapshot()?;
        let Some(marker) = pending else {
            return Ok(state);
        };

        match self.scheduler.poll_marker(marker)? {
            MarkerStatus::Pending => Ok(EventState::RecordedPending),
            MarkerStatus::Complete => {
                let timestamp = slot
                    .flags()
                    .timing_enabled
                    .then(|| self.clock.device_time_ns());
                slot.finalize(marker, timestamp);
                trace!(event = %slot.id(), %marker, "event completed");
                Ok(EventState::RecordedComplete)
            }
        }
    }

    /// Wait until the slot completes; immediate on complete or never-recorded.
    pub(crate) async fn synchronize(&self, slot: &Arc<EventSlot>) -> EventResult<()> {
        match self.poll_slot(slot)? {
            EventState::Unrecorded | EventState::RecordedComplete => Ok(()),
            EventState::RecordedPending => {
                if self.poll_tx.send(slot.clone()).is_err() {
                    return Err(EventError::Shutdown);
                }
                EventWaiter::new(slot.clone()).await
            }
        }
    }

    /// Release the slot and wake its waiters with `ResourceGone`.
    ///
    /// Destroying an origin also withdraws its directory binding, so proxies
    /// in other contexts fail on their next access. Destroying a proxy only
    /// releases the local slot. Idempotent.
    pub(crate) fn destroy(&self, slot: &Arc<EventSlot>) {
        self.slots.remove(&slot.id());
        if slot.origin_key().is_none() && slot.flags().interprocess_sharable {
            self.directory.withdraw(&self.origin_key(slot.id()));
        }
        slot.mark_gone();
        debug!(event = %slot.id(), "event destroyed");
    }

    /// Tear down: fail new operations, release every slot, and withdraw this
    /// context's directory bindings. Idempotent.
    pub(crate) fn force_shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        let slots: Vec<_> = self.slots.iter().map(|entry| entry.value().clone()).collect();
        self.slots.clear();
        for slot in slots {
            slot.mark_gone();
        }
        self.directory.withdraw_context(self.context.fingerprint());
        debug!(context = %self.context, "event registry shut down");
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}
