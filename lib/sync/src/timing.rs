// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Riptide Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Elapsed device time between two completed events.

use crate::error::{EventError, EventResult};
use crate::events::Event;

/// Device time elapsed between `start` and `stop`, in milliseconds.
///
/// Both events must have been created with timing enabled and have reached
/// completion; otherwise this fails with `TimingDisabled` or
/// `EventNotComplete` respectively. Arguments are not reordered: swapping
/// them relative to recording order yields a negative duration.
pub fn elapsed_time(start: &Event, stop: &Event) -> EventResult<f64> {
    for event in [start, stop] {
        if !event.flags().timing_enabled {
            return Err(EventError::TimingDisabled { event: event.id() });
        }
    }
    // A non-blocking poll first, so completions the caller never observed via
    // query/synchronize still count.
    start.query()?;
    stop.query()?;

    let start_ns = start.slot().completed_timestamp_ns()?;
    let stop_ns = stop.slot().completed_timestamp_ns()?;
    Ok((stop_ns as i128 - start_ns as i128) as f64 / 1e6)
}
