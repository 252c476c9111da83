// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Riptide Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! # Riptide Sync
//!
//! Event synchronization and cross-process handle sharing for the Riptide
//! command-stream runtime.
//!
//! Callers create lightweight [`Event`]s, record them into a device execution
//! stream, poll or await their completion, measure elapsed device time between
//! two completed events, and export an event as an opaque [`ExportedHandle`]
//! that a cooperating process can import to observe completion of work enqueued
//! by the exporting process.
//!
//! The device side is consumed through two narrow traits: [`StreamScheduler`]
//! (marker enqueue + poll) and [`DeviceClock`] (monotonic device time). A
//! deterministic simulated scheduler for tests lives in [`scheduler::testing`].

pub mod clock;
pub mod context;
pub mod error;
pub mod events;
pub mod ipc;
pub mod runtime;
pub mod scheduler;
pub mod timing;

pub use clock::{DeviceClock, MonotonicClock};
pub use context::{ContextFingerprint, DeviceContext};
pub use error::{EventError, EventResult};
pub use events::{Event, EventFlags, EventId, EventState};
pub use ipc::{ExportedHandle, HANDLE_LEN};
pub use runtime::{SyncRuntime, SyncRuntimeConfigBuilder};
pub use scheduler::{MarkerId, MarkerStatus, SharedMarkerDirectory, StreamId, StreamScheduler};
pub use timing::elapsed_time;
