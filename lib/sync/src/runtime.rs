// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Riptide Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Process-wide sync runtime: explicit initialization and teardown.
//!
//! A [`SyncRuntime`] binds one process to one device (the [`DeviceContext`]),
//! owns the [`EventRegistry`], and runs the background marker poller that
//! observes completions promptly. There is no ambient singleton; cooperating
//! runtimes are wired together by handing each a clone of one
//! [`SharedMarkerDirectory`] and the same scheduler.

use std::sync::Arc;
use std::time::Duration;

use derive_builder::Builder;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, trace};

use crate::clock::{DeviceClock, MonotonicClock};
use crate::context::DeviceContext;
use crate::error::{EventError, EventResult};
use crate::events::{Event, EventFlags, EventRegistry, EventState};
use crate::ipc::{self, ExportedHandle};
use crate::scheduler::{SharedMarkerDirectory, StreamScheduler};

#[derive(Builder)]
#[builder(pattern = "owned", build_fn(private, name = "build_internal"), public)]
#[allow(dead_code)] // fields are consumed in build(), which confuses dead code analysis
pub struct SyncRuntimeConfig {
    /// Device command-stream scheduler this runtime records markers into.
    scheduler: Arc<dyn StreamScheduler>,

    /// Monotonic device clock used to capture completion timestamps.
    #[builder(default = "Arc::new(MonotonicClock::new()) as Arc<dyn DeviceClock>")]
    clock: Arc<dyn DeviceClock>,

    #[builder(default = "0")]
    device_ordinal: u32,

    /// Driver-side marker directory. Cooperating runtimes must be built with
    /// clones of the same directory for handle import to resolve.
    #[builder(default = "SharedMarkerDirectory::new()")]
    directory: SharedMarkerDirectory,

    /// Cadence of the background marker poller.
    #[builder(default = "Duration::from_millis(1)")]
    poll_interval: Duration,
}

impl SyncRuntimeConfigBuilder {
    pub fn build(self) -> anyhow::Result<SyncRuntime> {
        let config = self.build_internal()?;
        SyncRuntime::new(config)
    }
}

/// Process-wide event synchronization runtime.
pub struct SyncRuntime {
    registry: Arc<EventRegistry>,
    #[allow(dead_code)] // keeps a self-built runtime alive for the poller
    tokio_runtime: TokioRuntime,
    tasks: TaskTracker,
    cancel: CancellationToken,
}

impl SyncRuntime {
    pub fn builder() -> SyncRuntimeConfigBuilder {
        SyncRuntimeConfigBuilder::default()
    }

    fn new(config: SyncRuntimeConfig) -> anyhow::Result<Self> {
        let context = DeviceContext::new(config.device_ordinal);
        let (poll_tx, poll_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(EventRegistry::new(
            context,
            config.scheduler,
            config.clock,
            config.directory,
            poll_tx,
        ));

        let tokio_runtime = get_tokio_runtime();
        let tasks = TaskTracker::new();
        let cancel = CancellationToken::new();
        tasks.spawn_on(
            run_marker_poller(
                registry.clone(),
                poll_rx,
                config.poll_interval,
                cancel.clone(),
            ),
            tokio_runtime.handle(),
        );

        Ok(Self {
            registry,
            tokio_runtime,
            tasks,
            cancel,
        })
    }

    /// This runtime's device/process binding.
    pub fn context(&self) -> DeviceContext {
        self.registry.context()
    }

    /// Clone of the marker directory, for wiring up a cooperating runtime.
    pub fn directory(&self) -> SharedMarkerDirectory {
        self.registry.directory().clone()
    }

    /// Allocate a fresh event in state `Unrecorded`.
    pub fn create_event(&self, flags: EventFlags) -> EventResult<Event> {
        let slot = self.registry.create(flags)?;
        Ok(Event::new(slot, self.registry.clone()))
    }

    /// Import a handle exported by another context, producing a proxy event.
    pub fn import_handle(&self, handle: &ExportedHandle) -> EventResult<Event> {
        ipc::import_handle(handle, &self.registry)
    }

    /// [`SyncRuntime::import_handle`] straight from wire bytes.
    pub fn import_handle_bytes(&self, bytes: &[u8]) -> EventResult<Event> {
        self.import_handle(&ExportedHandle::from_bytes(bytes)?)
    }

    /// Tear the runtime down: fail new operations, release every live event
    /// (pending waiters observe `ResourceGone`), withdraw this context's
    /// directory bindings, and stop the poller. Idempotent.
    pub async fn shutdown(&self) {
        self.registry.force_shutdown();
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }
}

impl Drop for SyncRuntime {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Background task polling recorded markers so completions (and their
/// timestamps) are observed without the caller having to `query`.
async fn run_marker_poller(
    registry: Arc<EventRegistry>,
    mut rx: mpsc::UnboundedReceiver<Arc<crate::events::EventSlot>>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut pending: Vec<Arc<crate::events::EventSlot>> = Vec::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            slot = rx.recv() => match slot {
                Some(slot) => {
                    if !pending.iter().any(|existing| existing.id() == slot.id()) {
                        pending.push(slot);
                    }
                }
                None => break,
            },
            _ = tokio::time::sleep(interval), if !pending.is_empty() => {
                pending.retain(|slot| match registry.poll_slot(slot) {
                    Ok(EventState::RecordedPending) => true,
                    Ok(_) => false,
                    Err(EventError::Scheduler(err)) => {
                        error!(event = %slot.id(), %err, "marker poll failed; will retry");
                        true
                    }
                    Err(_) => false,
                });
            }
        }
    }
    trace!("marker poller stopped");
}

fn get_tokio_runtime() -> TokioRuntime {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => TokioRuntime::Handle(handle),
        Err(_) => {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .worker_threads(1)
                .build()
                .expect("failed to build tokio runtime");
            TokioRuntime::Shared(Arc::new(rt))
        }
    }
}

/// Caller-provided tokio handle, or a small runtime of our own when built
/// outside any async context.
#[derive(Clone)]
enum TokioRuntime {
    Handle(tokio::runtime::Handle),
    Shared(Arc<tokio::runtime::Runtime>),
}

impl TokioRuntime {
    fn handle(&self) -> &tokio::runtime::Handle {
        match self {
            TokioRuntime::Handle(handle) => handle,
            TokioRuntime::Shared(runtime) => runtime.handle(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::testing::{ManualClock, SimScheduler};
    use crate::scheduler::StreamId;
    use crate::timing::elapsed_time;

    fn manual_runtime() -> (SyncRuntime, Arc<ManualClock>, Arc<SimScheduler>) {
        let clock = Arc::new(ManualClock::new());
        let scheduler = SimScheduler::new(clock.clone());
        let runtime = SyncRuntime::builder()
            .scheduler(scheduler.clone())
            .clock(clock.clone())
            .build()
            .unwrap();
        (runtime, clock, scheduler)
    }

    #[tokio::test]
    async fn query_on_unrecorded_event_reports_not_submitted() {
        let (runtime, _clock, _sched) = manual_runtime();
        let event = runtime.create_event(EventFlags::default()).unwrap();
        assert_eq!(event.query().unwrap(), EventState::Unrecorded);
    }

    #[tokio::test]
    async fn synchronize_on_unrecorded_event_is_noop() {
        let (runtime, _clock, _sched) = manual_runtime();
        let event = runtime.create_event(EventFlags::default()).unwrap();
        event.synchronize().await.unwrap();
    }

    #[tokio::test]
    async fn record_then_query_tracks_marker_completion() {
        let (runtime, clock, sched) = manual_runtime();
        let event = runtime.create_event(EventFlags::default()).unwrap();

        sched
            .enqueue_work(StreamId::DEFAULT, Duration::from_millis(5))
            .unwrap();
        event.record(StreamId::DEFAULT).unwrap();
        assert_eq!(event.query().unwrap(), EventState::RecordedPending);
        assert_eq!(event.stream(), Some(StreamId::DEFAULT));

        clock.advance(Duration::from_millis(5));
        assert_eq!(event.query().unwrap(), EventState::RecordedComplete);
    }

    #[tokio::test]
    async fn synchronize_resolves_when_marker_completes() {
        let (runtime, clock, sched) = manual_runtime();
        let event = runtime
            .create_event(EventFlags {
                timing_enabled: true,
                interprocess_sharable: false,
            })
            .unwrap();

        sched
            .enqueue_work(StreamId::DEFAULT, Duration::from_millis(5))
            .unwrap();
        event.record(StreamId::DEFAULT).unwrap();

        let waiter = {
            let event = event.clone();
            tokio::spawn(async move { event.synchronize().await })
        };
        tokio::task::yield_now().await;

        clock.advance(Duration::from_millis(5));
        waiter.await.unwrap().unwrap();
        assert_eq!(event.query().unwrap(), EventState::RecordedComplete);
    }

    #[tokio::test]
    async fn synchronize_timeout_fires_on_stuck_marker() {
        let (runtime, _clock, sched) = manual_runtime();
        let event = runtime.create_event(EventFlags::default()).unwrap();

        // clock never advances, so the marker never completes
        sched
            .enqueue_work(StreamId::DEFAULT, Duration::from_millis(5))
            .unwrap();
        event.record(StreamId::DEFAULT).unwrap();

        let err = event
            .synchronize_timeout(Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, EventError::SynchronizeTimeout { .. }));
    }

    #[tokio::test]
    async fn rerecord_rebinds_to_new_marker() {
        let (runtime, clock, sched) = manual_runtime();
        let event = runtime
            .create_event(EventFlags {
                timing_enabled: true,
                interprocess_sharable: false,
            })
            .unwrap();

        event.record(StreamId::DEFAULT).unwrap();
        assert_eq!(event.query().unwrap(), EventState::RecordedComplete);

        sched
            .enqueue_work(StreamId::DEFAULT, Duration::from_millis(5))
            .unwrap();
        event.record(StreamId::DEFAULT).unwrap();
        assert_eq!(event.query().unwrap(), EventState::RecordedPending);

        clock.advance(Duration::from_millis(5));
        assert_eq!(event.query().unwrap(), EventState::RecordedComplete);
    }

    #[tokio::test]
    async fn elapsed_time_measures_device_interval() {
        let (runtime, clock, sched) = manual_runtime();
        let flags = EventFlags {
            timing_enabled: true,
            interprocess_sharable: false,
        };
        let start = runtime.create_event(flags).unwrap();
        let stop = runtime.create_event(flags).unwrap();

        start.record(StreamId::DEFAULT).unwrap();
        start.query().unwrap();

        clock.advance(Duration::from_millis(30));
        sched
            .enqueue_work(StreamId::DEFAULT, Duration::from_millis(10))
            .unwrap();
        stop.record(StreamId::DEFAULT).unwrap();
        clock.advance(Duration::from_millis(10));
        stop.query().unwrap();

        let ms = elapsed_time(&start, &stop).unwrap();
        assert!((ms - 40.0).abs() < 1e-6, "unexpected elapsed {ms}");

        // swapped arguments yield the negated duration
        let swapped = elapsed_time(&stop, &start).unwrap();
        assert!((swapped + 40.0).abs() < 1e-6, "unexpected elapsed {swapped}");
    }

    #[tokio::test]
    async fn elapsed_time_requires_timing_flag() {
        let (runtime, clock, _sched) = manual_runtime();
        let timed = runtime
            .create_event(EventFlags {
                timing_enabled: true,
                interprocess_sharable: false,
            })
            .unwrap();
        let untimed = runtime.create_event(EventFlags::default()).unwrap();

        timed.record(StreamId::DEFAULT).unwrap();
        untimed.record(StreamId::DEFAULT).unwrap();
        clock.advance(Duration::from_millis(1));
        timed.synchronize().await.unwrap();
        untimed.synchronize().await.unwrap();

        let err = elapsed_time(&untimed, &timed).unwrap_err();
        assert!(matches!(err, EventError::TimingDisabled { .. }));
        let err = elapsed_time(&timed, &untimed).unwrap_err();
        assert!(matches!(err, EventError::TimingDisabled { .. }));
    }

    #[tokio::test]
    async fn elapsed_time_requires_completion() {
        let (runtime, _clock, sched) = manual_runtime();
        let flags = EventFlags {
            timing_enabled: true,
            interprocess_sharable: false,
        };
        let start = runtime.create_event(flags).unwrap();
        let stop = runtime.create_event(flags).unwrap();

        start.record(StreamId::DEFAULT).unwrap();
        sched
            .enqueue_work(StreamId::DEFAULT, Duration::from_millis(5))
            .unwrap();
        stop.record(StreamId::DEFAULT).unwrap();

        let err = elapsed_time(&start, &stop).unwrap_err();
        assert!(matches!(err, EventError::EventNotComplete { .. }));
    }

    #[tokio::test]
    async fn destroy_wakes_waiters_with_resource_gone() {
        let (runtime, _clock, sched) = manual_runtime();
        let event = runtime.create_event(EventFlags::default()).unwrap();

        sched
            .enqueue_work(StreamId::DEFAULT, Duration::from_millis(5))
            .unwrap();
        event.record(StreamId::DEFAULT).unwrap();

        let waiter = {
            let event = event.clone();
            tokio::spawn(async move { event.synchronize().await })
        };
        tokio::task::yield_now().await;

        event.destroy();
        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, EventError::ResourceGone { .. }));
    }

    #[tokio::test]
    async fn operations_fail_after_destroy() {
        let (runtime, _clock, _sched) = manual_runtime();
        let event = runtime.create_event(EventFlags::default()).unwrap();
        event.destroy();

        assert!(matches!(
            event.query(),
            Err(EventError::ResourceGone { .. })
        ));
        assert!(matches!(
            event.record(StreamId::DEFAULT),
            Err(EventError::ResourceGone { .. })
        ));
    }

    #[tokio::test]
    async fn shutdown_poisons_pending_waiters() {
        let (runtime, _clock, sched) = manual_runtime();
        let event = runtime.create_event(EventFlags::default()).unwrap();

        sched
            .enqueue_work(StreamId::DEFAULT, Duration::from_millis(5))
            .unwrap();
        event.record(StreamId::DEFAULT).unwrap();

        let waiter = {
            let event = event.clone();
            tokio::spawn(async move { event.synchronize().await })
        };
        tokio::task::yield_now().await;

        runtime.shutdown().await;
        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, EventError::ResourceGone { .. }));
    }

    #[tokio::test]
    async fn shutdown_fails_new_events_and_releases_live_ones() {
        let (runtime, _clock, _sched) = manual_runtime();
        let event = runtime.create_event(EventFlags::default()).unwrap();

        runtime.shutdown().await;
        runtime.shutdown().await; // idempotent

        assert!(matches!(
            runtime.create_event(EventFlags::default()),
            Err(EventError::Shutdown)
        ));
        assert!(matches!(
            event.query(),
            Err(EventError::ResourceGone { .. })
        ));
    }
}
