// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Riptide Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the sync subsystem.
//!
//! All errors are synchronous return-style results; nothing is retried
//! internally. Callers that want retry semantics re-poll via
//! [`Event::query`](crate::Event::query).

use std::time::Duration;

use crate::events::EventId;

/// Errors surfaced by event operations.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// Elapsed-time was requested against an event created with timing disabled.
    #[error("timing disabled on event {event}")]
    TimingDisabled { event: EventId },

    /// Elapsed-time was requested before both events reached completion.
    #[error("event {event} has not completed")]
    EventNotComplete { event: EventId },

    /// Export was attempted on an event not created interprocess-sharable.
    #[error("event {event} was not created interprocess-sharable")]
    NotSharable { event: EventId },

    /// A handle was imported inside the context that exported it.
    #[error("handle was exported by the importing context")]
    ContextMismatch,

    /// A handle failed structural validation.
    #[error("invalid event handle: {0}")]
    InvalidHandle(String),

    /// Record was attempted through an imported proxy event.
    #[error("event {event} is an imported proxy and cannot be recorded")]
    ProxyNotRecordable { event: EventId },

    /// The event (or the origin backing a proxy) was destroyed.
    #[error("backing resource for event {event} is gone")]
    ResourceGone { event: EventId },

    /// The owning runtime has been shut down.
    #[error("sync runtime shutdown in progress")]
    Shutdown,

    /// A bounded wait elapsed before the event completed.
    #[error("synchronize timed out after {timeout:?}")]
    SynchronizeTimeout { timeout: Duration },

    /// The stream scheduler reported a failure.
    #[error("stream scheduler failure")]
    Scheduler(#[from] anyhow::Error),
}

/// Result alias used throughout the crate.
pub type EventResult<T> = std::result::Result<T, EventError>;
