// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Riptide Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Monotonic device time source.

use std::time::Instant;

/// Monotonic device clock sampled when event completions are observed.
///
/// Implementations must be monotonic; timestamps from the same clock are
/// directly comparable and differences are meaningful as device time.
pub trait DeviceClock: Send + Sync {
    /// Current device time in nanoseconds since an arbitrary origin.
    fn device_time_ns(&self) -> u64;
}

/// Host-monotonic clock, the default when no device clock is wired in.
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceClock for MonotonicClock {
    fn device_time_ns(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}
