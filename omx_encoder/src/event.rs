// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Notifications sent back to the framework.

use crate::buffer::BufferFlags;
use crate::buffer::BufferId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentEvent {
    /// The input buffer is owned by the framework again.
    InputBufferReturned { id: BufferId },
    /// The output buffer is owned by the framework again and holds `filled_len` bytes.
    OutputBufferFilled {
        id: BufferId,
        filled_len: u32,
        flags: BufferFlags,
        timestamp: i64,
    },
    /// The component cannot make progress until it is reset.
    FatalError { reason: String },
}

/// Receiver of [`ComponentEvent`]s.
///
/// Events are delivered without any component lock held, so a sink may call back into the
/// component, for instance to queue the buffer it was just handed.
pub trait EventSink: Send + Sync {
    fn notify(&self, event: ComponentEvent);
}

impl<F> EventSink for F
where
    F: Fn(ComponentEvent) + Send + Sync,
{
    fn notify(&self, event: ComponentEvent) {
        self(event)
    }
}
