// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Riptide Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)] // each test binary uses its own subset of helpers

use std::sync::Arc;

use riptide_sync::scheduler::testing::SimScheduler;
use riptide_sync::{MonotonicClock, SyncRuntime};

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One simulated device shared by a single runtime.
pub fn single_runtime() -> (SyncRuntime, Arc<SimScheduler>) {
    init_logging();
    let clock = Arc::new(MonotonicClock::new());
    let scheduler = SimScheduler::new(clock.clone());
    let runtime = SyncRuntime::builder()
        .scheduler(scheduler.clone())
        .clock(clock)
        .build()
        .expect("failed to build runtime");
    (runtime, scheduler)
}

/// Two runtimes standing in for two processes attached to the same device:
/// they share the scheduler, the device clock, and the marker directory.
pub fn runtime_pair() -> (SyncRuntime, SyncRuntime, Arc<SimScheduler>) {
    init_logging();
    let clock = Arc::new(MonotonicClock::new());
    let scheduler = SimScheduler::new(clock.clone());
    let exporter = SyncRuntime::builder()
        .scheduler(scheduler.clone())
        .clock(clock.clone())
        .build()
        .expect("failed to build exporter runtime");
    let importer = SyncRuntime::builder()
        .scheduler(scheduler.clone())
        .clock(clock)
        .directory(exporter.directory())
        .build()
        .expect("failed to build importer runtime");
    (exporter, importer, scheduler)
}
