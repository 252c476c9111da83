// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Riptide Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Simulated scheduler and clock for tests.
//!
//! [`SimScheduler`] models each stream as a virtual timeline: enqueued work
//! pushes the stream tail forward in device time, and a marker completes once
//! the clock passes the tail it was enqueued at. Paired with [`ManualClock`]
//! this gives fully deterministic completion; paired with
//! [`MonotonicClock`](crate::MonotonicClock) it behaves like a device that
//! really takes wall-clock time.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::bail;
use parking_lot::Mutex;

use super::{MarkerId, MarkerStatus, StreamId, StreamScheduler};
use crate::clock::DeviceClock;

/// Manually advanced clock for deterministic tests.
#[derive(Default)]
pub struct ManualClock {
    now_ns: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now_ns.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl DeviceClock for ManualClock {
    fn device_time_ns(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }
}

struct SimState {
    next_stream: u64,
    next_marker: u64,
    // device time at which each stream drains
    stream_tails: HashMap<StreamId, u64>,
    // device time at which each marker completes
    markers: HashMap<MarkerId, u64>,
}

/// Deterministic in-process stand-in for the device command-stream scheduler.
pub struct SimScheduler {
    clock: Arc<dyn DeviceClock>,
    state: Mutex<SimState>,
}

impl SimScheduler {
    /// Create a scheduler with the default stream already open.
    pub fn new(clock: Arc<dyn DeviceClock>) -> Arc<Self> {
        let mut stream_tails = HashMap::new();
        stream_tails.insert(StreamId::DEFAULT, 0);
        Arc::new(Self {
            clock,
            state: Mutex::new(SimState {
                next_stream: 1,
                next_marker: 0,
                stream_tails,
                markers: HashMap::new(),
            }),
        })
    }

    /// Open an additional stream.
    pub fn open_stream(&self) -> StreamId {
        let mut state = self.state.lock();
        let stream = StreamId::from_raw(state.next_stream);
        state.next_stream += 1;
        state.stream_tails.insert(stream, 0);
        stream
    }

    /// Enqueue simulated device work taking `duration` of device time.
    ///
    /// The work starts when the stream drains (or now, whichever is later),
    /// matching in-order stream execution.
    pub fn enqueue_work(&self, stream: StreamId, duration: Duration) -> anyhow::Result<()> {
        let now = self.clock.device_time_ns();
        let mut state = self.state.lock();
        let Some(tail) = state.stream_tails.get_mut(&stream) else {
            bail!("unknown stream {stream}");
        };
        *tail = (*tail).max(now) + duration.as_nanos() as u64;
        Ok(())
    }
}

impl StreamScheduler for SimScheduler {
    fn enqueue_marker(&self, stream: StreamId) -> anyhow::Result<MarkerId> {
        let now = self.clock.device_time_ns();
        let mut state = self.state.lock();
        let Some(&tail) = state.stream_tails.get(&stream) else {
            bail!("unknown stream {stream}");
        };
        let marker = MarkerId::from_raw(state.next_marker);
        state.next_marker += 1;
        state.markers.insert(marker, tail.max(now));
        Ok(marker)
    }

    fn poll_marker(&self, marker: MarkerId) -> anyhow::Result<MarkerStatus> {
        let ready_at = {
            let state = self.state.lock();
            let Some(&ready_at) = state.markers.get(&marker) else {
                bail!("unknown marker {marker}");
            };
            ready_at
        };
        if self.clock.device_time_ns() >= ready_at {
            Ok(MarkerStatus::Complete)
        } else {
            Ok(MarkerStatus::Pending)
        }
    }
}
