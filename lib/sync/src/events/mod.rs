// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Riptide Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Event identity, flags, state machine, and the completion waiter.

mod registry;

pub use registry::EventRegistry;

use std::fmt::{self, Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{EventError, EventResult};
use crate::ipc::{self, ExportedHandle};
use crate::scheduler::{MarkerId, OriginKey, StreamId};

const FLAG_TIMING_ENABLED: u32 = 1 << 0;
const FLAG_INTERPROCESS: u32 = 1 << 1;
const FLAG_KNOWN_MASK: u32 = FLAG_TIMING_ENABLED | FLAG_INTERPROCESS;

/// Process-unique event identifier.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(u64);

impl EventId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Display for EventId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Event({})", self.0)
    }
}

/// Creation-time event flags; fixed for the lifetime of the event.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFlags {
    /// Capture a device timestamp at completion, enabling elapsed-time queries.
    pub timing_enabled: bool,
    /// Allow the event to be exported across the process boundary.
    pub interprocess_sharable: bool,
}

impl EventFlags {
    /// Wire encoding: bit 0 = timing, bit 1 = interprocess.
    pub fn bits(&self) -> u32 {
        let mut bits = 0;
        if self.timing_enabled {
            bits |= FLAG_TIMING_ENABLED;
        }
        if self.interprocess_sharable {
            bits |= FLAG_INTERPROCESS;
        }
        bits
    }

    /// Decode a flags bitmask, rejecting unknown bits.
    pub fn from_bits(bits: u32) -> Option<Self> {
        if bits & !FLAG_KNOWN_MASK != 0 {
            return None;
        }
        Some(Self {
            timing_enabled: bits & FLAG_TIMING_ENABLED != 0,
            interprocess_sharable: bits & FLAG_INTERPROCESS != 0,
        })
    }
}

/// Externally observable event state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EventState {
    /// Never recorded into a stream; queries report "not submitted".
    Unrecorded,
    /// Recorded; the marker has not yet completed on the device.
    RecordedPending,
    /// The marker completed.
    RecordedComplete,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum SlotKind {
    Origin,
    Proxy { origin: OriginKey },
}

#[derive(Copy, Clone, Debug)]
enum SlotPhase {
    Unrecorded,
    Pending {
        marker: MarkerId,
    },
    Complete {
        marker: MarkerId,
        timestamp_ns: Option<u64>,
    },
}

struct SlotState {
    phase: SlotPhase,
    // owning stream, set while recorded (origin events only)
    stream: Option<StreamId>,
    destroyed: bool,
    wakers: Vec<Waker>,
}

/// Owner-side event slot; shared between the registry, the background poller,
/// and any number of `Event` handles.
///
/// Completion state and the waker list live under a single lock so `query`'s
/// read-then-update is atomic and wakeups cannot be lost.
pub(crate) struct EventSlot {
    id: EventId,
    flags: EventFlags,
    kind: SlotKind,
    state: Mutex<SlotState>,
}

impl EventSlot {
    pub(crate) fn origin(id: EventId, flags: EventFlags) -> Self {
        Self::new(id, flags, SlotKind::Origin)
    }

    pub(crate) fn proxy(id: EventId, flags: EventFlags, origin: OriginKey) -> Self {
        Self::new(id, flags, SlotKind::Proxy { origin })
    }

    fn new(id: EventId, flags: EventFlags, kind: SlotKind) -> Self {
        Self {
            id,
            flags,
            kind,
            state: Mutex::new(SlotState {
                phase: SlotPhase::Unrecorded,
                stream: None,
                destroyed: false,
                wakers: Vec::new(),
            }),
        }
    }

    pub(crate) fn id(&self) -> EventId {
        self.id
    }

    pub(crate) fn flags(&self) -> EventFlags {
        self.flags
    }

    pub(crate) fn origin_key(&self) -> Option<OriginKey> {
        match self.kind {
            SlotKind::Origin => None,
            SlotKind::Proxy { origin } => Some(origin),
        }
    }

    /// Bind to a freshly enqueued marker, invalidating any prior completion
    /// timestamp. Re-entrant: last enqueue wins.
    pub(crate) fn bind(&self, marker: MarkerId, stream: StreamId) -> EventResult<()> {
        let mut state = self.state.lock();
        if state.destroyed {
            return Err(EventError::ResourceGone { event: self.id });
        }
        state.phase = SlotPhase::Pending { marker };
        state.stream = Some(stream);
        Ok(())
    }

    /// Proxy-side rebind: follow the origin's current marker if it moved.
    pub(crate) fn track_marker(&self, marker: MarkerId) {
        let mut state = self.state.lock();
        if state.destroyed {
            return;
        }
        let stale = match state.phase {
            SlotPhase::Unrecorded => true,
            SlotPhase::Pending { marker: m } | SlotPhase::Complete { marker: m, .. } => m != marker,
        };
        if stale {
            state.phase = SlotPhase::Pending { marker };
        }
    }

    /// Snapshot the externally visible state plus the marker still pending.
    pub(crate) fn snapshot(&self) -> EventResult<(EventState, Option<MarkerId>)> {
        let state = self.state.lock();
        if state.destroyed {
            return Err(EventError::ResourceGone { event: self.id });
        }
        Ok(match state.phase {
            SlotPhase::Unrecorded => (EventState::Unrecorded, None),
            SlotPhase::Pending { marker } => (EventState::RecordedPending, Some(marker)),
            SlotPhase::Complete { .. } => (EventState::RecordedComplete, None),
        })
    }

    /// Transition to complete for `marker`, waking all waiters.
    ///
    /// Ignored if the slot was rebound to a different marker in the meantime
    /// (last enqueue wins) or already finalized.
    pub(crate) fn finalize(&self, marker: MarkerId, timestamp_ns: Option<u64>) {
        let wakers = {
            let mut state = self.state.lock();
            if state.destroyed {
                return;
            }
            match state.phase {
                SlotPhase::Pending { marker: m } if m == marker => {}
                _ => return,
            }
            state.phase = SlotPhase::Complete {
                marker,
                timestamp_ns,
            };
            std::mem::take(&mut state.wakers)
        };
        for waker in wakers {
            waker.wake();
        }
    }

    /// Release the slot; pending waiters resolve with `ResourceGone`.
    pub(crate) fn mark_gone(&self) {
        let wakers = {
            let mut state = self.state.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.stream = None;
            std::mem::take(&mut state.wakers)
        };
        for waker in wakers {
            waker.wake();
        }
    }

    /// Stream the event is currently recorded into, if any.
    pub(crate) fn bound_stream(&self) -> Option<StreamId> {
        self.state.lock().stream
    }

    /// Completion timestamp, readable only once complete with a captured
    /// sample. Timing gating on the flag happens in the elapsed-time layer.
    pub(crate) fn completed_timestamp_ns(&self) -> EventResult<u64> {
        let state = self.state.lock();
        if state.destroyed {
            return Err(EventError::ResourceGone { event: self.id });
        }
        match state.phase {
            SlotPhase::Complete {
                timestamp_ns: Some(ts),
                ..
            } => Ok(ts),
            _ => Err(EventError::EventNotComplete { event: self.id }),
        }
    }
}

/// Future resolving when the slot completes (or its backing goes away).
///
/// Cancellation safe: dropping the waiter leaves only a stale waker behind,
/// which the slot overwrites on the next registration from the same task.
pub(crate) struct EventWaiter {
    slot: Arc<EventSlot>,
}

impl EventWaiter {
    pub(crate) fn new(slot: Arc<EventSlot>) -> Self {
        Self { slot }
    }
}

impl Future for EventWaiter {
    type Output = EventResult<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.slot.state.lock();
        if state.destroyed {
            return Poll::Ready(Err(EventError::ResourceGone {
                event: self.slot.id,
            }));
        }
        match state.phase {
            // Never-recorded events synchronize as a success no-op.
            SlotPhase::Unrecorded | SlotPhase::Complete { .. } => Poll::Ready(Ok(())),
            SlotPhase::Pending { .. } => {
                let waker = cx.waker();
                if let Some(existing) = state.wakers.iter_mut().find(|w| w.will_wake(waker)) {
                    existing.clone_from(waker);
                } else {
                    state.wakers.push(waker.clone());
                }
                Poll::Pending
            }
        }
    }
}

/// Handle to a live event.
///
/// Cheap to clone; all clones share the same slot. Created by
/// [`SyncRuntime::create_event`](crate::SyncRuntime::create_event) or by
/// importing an exported handle, in which case the event is a proxy for an
/// event owned by another process.
#[derive(Clone)]
pub struct Event {
    slot: Arc<EventSlot>,
    registry: Arc<EventRegistry>,
}

impl Event {
    pub(crate) fn new(slot: Arc<EventSlot>, registry: Arc<EventRegistry>) -> Self {
        Self { slot, registry }
    }

    pub(crate) fn slot(&self) -> &Arc<EventSlot> {
        &self.slot
    }

    pub fn id(&self) -> EventId {
        self.slot.id()
    }

    pub fn flags(&self) -> EventFlags {
        self.slot.flags()
    }

    /// True for events produced by importing an exported handle.
    pub fn is_proxy(&self) -> bool {
        self.slot.origin_key().is_some()
    }

    /// The stream this event is currently recorded into, if any.
    pub fn stream(&self) -> Option<StreamId> {
        self.slot.bound_stream()
    }

    /// Record the event at the current tail of `stream`.
    ///
    /// Re-entrant: an already-recorded event is rebound to a fresh marker and
    /// its previous completion timestamp is invalidated.
    pub fn record(&self, stream: StreamId) -> EventResult<()> {
        self.registry.record(&self.slot, stream)
    }

    /// Non-blocking completion query; transitions the event to complete (and
    /// captures a timestamp when timing is enabled) if its marker finished.
    pub fn query(&self) -> EventResult<EventState> {
        self.registry.poll_slot(&self.slot)
    }

    /// Wait until the event completes.
    ///
    /// Returns immediately when already complete, and as a success no-op when
    /// the event was never recorded. Blocks indefinitely on a marker that
    /// never completes; use [`Event::synchronize_timeout`] for a bounded wait.
    pub async fn synchronize(&self) -> EventResult<()> {
        self.registry.synchronize(&self.slot).await
    }

    /// [`Event::synchronize`] bounded by `timeout`.
    pub async fn synchronize_timeout(&self, timeout: Duration) -> EventResult<()> {
        match tokio::time::timeout(timeout, self.synchronize()).await {
            Ok(result) => result,
            Err(_) => Err(EventError::SynchronizeTimeout { timeout }),
        }
    }

    /// Serialize the event's identity into a transportable opaque handle.
    ///
    /// Requires the event to have been created interprocess-sharable; the
    /// event does not need to be recorded yet.
    pub fn export_handle(&self) -> EventResult<ExportedHandle> {
        ipc::export_handle(&self.slot, &self.registry)
    }

    /// Release the event's slot.
    ///
    /// Pending waiters and import proxies backed by this event observe
    /// `ResourceGone` on their next access. Destroying a proxy never affects
    /// the origin event. Idempotent.
    pub fn destroy(&self) {
        self.registry.destroy(&self.slot);
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.slot.id())
            .field("flags", &self.slot.flags())
            .field("proxy", &self.is_proxy())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_bits_round_trip() {
        let flags = EventFlags {
            timing_enabled: true,
            interprocess_sharable: true,
        };
        assert_eq!(flags.bits(), 0b11);
        assert_eq!(EventFlags::from_bits(0b11), Some(flags));
        assert_eq!(EventFlags::from_bits(0), Some(EventFlags::default()));
    }

    #[test]
    fn unknown_flag_bits_rejected() {
        assert_eq!(EventFlags::from_bits(0b100), None);
        assert_eq!(EventFlags::from_bits(u32::MAX), None);
    }

    #[tokio::test]
    async fn waiter_is_immediate_on_unrecorded_slot() {
        let slot = Arc::new(EventSlot::origin(EventId::from_raw(1), EventFlags::default()));
        EventWaiter::new(slot).await.unwrap();
    }

    #[tokio::test]
    async fn waiter_resolves_on_finalize() {
        let slot = Arc::new(EventSlot::origin(EventId::from_raw(1), EventFlags::default()));
        let marker = MarkerId::from_raw(7);
        slot.bind(marker, StreamId::DEFAULT).unwrap();

        let waiter = {
            let slot = slot.clone();
            tokio::spawn(async move { EventWaiter::new(slot).await })
        };
        tokio::task::yield_now().await;

        slot.finalize(marker, None);
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn waiter_sees_resource_gone_on_destroy() {
        let slot = Arc::new(EventSlot::origin(EventId::from_raw(1), EventFlags::default()));
        slot.bind(MarkerId::from_raw(7), StreamId::DEFAULT).unwrap();

        let waiter = {
            let slot = slot.clone();
            tokio::spawn(async move { EventWaiter::new(slot).await })
        };
        tokio::task::yield_now().await;

        slot.mark_gone();
        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, EventError::ResourceGone { .. }));
    }

    #[test]
    fn finalize_for_stale_marker_is_ignored() {
        let slot = EventSlot::origin(
            EventId::from_raw(1),
            EventFlags {
                timing_enabled: true,
                interprocess_sharable: false,
            },
        );
        slot.bind(MarkerId::from_raw(1), StreamId::DEFAULT).unwrap();
        slot.bind(MarkerId::from_raw(2), StreamId::DEFAULT).unwrap();

        slot.finalize(MarkerId::from_raw(1), Some(123));
        assert!(matches!(
            slot.snapshot(),
            Ok((EventState::RecordedPending, Some(m))) if m == MarkerId::from_raw(2)
        ));

        slot.finalize(MarkerId::from_raw(2), Some(456));
        assert_eq!(slot.completed_timestamp_ns().unwrap(), 456);
    }

    #[test]
    fn rebind_invalidates_timestamp() {
        let slot = EventSlot::origin(
            EventId::from_raw(1),
            EventFlags {
                timing_enabled: true,
                interprocess_sharable: false,
            },
        );
        let first = MarkerId::from_raw(1);
        slot.bind(first, StreamId::DEFAULT).unwrap();
        slot.finalize(first, Some(42));
        assert_eq!(slot.completed_timestamp_ns().unwrap(), 42);

        slot.bind(MarkerId::from_raw(2), StreamId::DEFAULT).unwrap();
        assert!(matches!(
            slot.completed_timestamp_ns(),
            Err(EventError::EventNotComplete { .. })
        ));
    }
}
