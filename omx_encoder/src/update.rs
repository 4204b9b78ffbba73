// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Coalescing queue for runtime encoder reconfiguration.
//!
//! Control threads post updates here at any time. The engine drains them in one step at the
//! start of each frame, so a burst of bitrate changes collapses into the last value and any
//! number of key frame requests collapses into one.

use std::sync::Mutex;

use bitflags::bitflags;

use crate::lock;

bitflags! {
    /// Kinds of update waiting to be applied.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct UpdateFlags: u32 {
        const BITRATE = 1 << 0;
        const KEY_FRAME = 1 << 1;
    }
}

/// Snapshot of the updates taken by one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingUpdates {
    pub flags: UpdateFlags,
    /// Only meaningful when `flags` contains `BITRATE`.
    pub bitrate: u32,
}

impl PendingUpdates {
    /// The bitrate to apply, if a change is pending.
    pub fn bitrate_change(&self) -> Option<u32> {
        self.flags
            .contains(UpdateFlags::BITRATE)
            .then_some(self.bitrate)
    }

    pub fn key_frame_requested(&self) -> bool {
        self.flags.contains(UpdateFlags::KEY_FRAME)
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

/// Thread-safe holder of [`PendingUpdates`].
#[derive(Debug, Default)]
pub struct UpdateQueue {
    pending: Mutex<PendingUpdates>,
}

impl UpdateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a bitrate change. A later call before the next drain replaces the value.
    pub fn set_bitrate(&self, bitrate: u32) {
        let mut pending = lock(&self.pending);
        pending.bitrate = bitrate;
        pending.flags |= UpdateFlags::BITRATE;
    }

    /// Asks for the next encoded frame to be a key frame.
    pub fn request_key_frame(&self) {
        lock(&self.pending).flags |= UpdateFlags::KEY_FRAME;
    }

    /// Takes every pending update and clears the queue.
    pub fn drain_pending(&self) -> PendingUpdates {
        std::mem::take(&mut *lock(&self.pending))
    }

    /// Drops any pending update without applying it.
    pub fn clear(&self) {
        *lock(&self.pending) = PendingUpdates::default();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn last_bitrate_wins() {
        let queue = UpdateQueue::new();
        queue.set_bitrate(1000);
        queue.set_bitrate(2000);
        let pending = queue.drain_pending();
        assert_eq!(pending.bitrate_change(), Some(2000));
        assert!(!pending.key_frame_requested());
        assert!(queue.drain_pending().is_empty());
    }

    #[test]
    fn key_frame_requests_coalesce() {
        let queue = UpdateQueue::new();
        queue.request_key_frame();
        queue.request_key_frame();
        queue.set_bitrate(500);
        let pending = queue.drain_pending();
        assert!(pending.key_frame_requested());
        assert_eq!(pending.bitrate_change(), Some(500));
        assert_eq!(queue.drain_pending(), PendingUpdates::default());
    }

    #[test]
    fn clear_discards_updates() {
        let queue = UpdateQueue::new();
        queue.set_bitrate(64_000);
        queue.request_key_frame();
        queue.clear();
        assert!(queue.drain_pending().is_empty());
    }

    #[test]
    fn concurrent_posts_are_not_lost() {
        let queue = Arc::new(UpdateQueue::new());
        let workers: Vec<_> = (0..4)
            .map(|i| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    if i % 2 == 0 {
                        queue.request_key_frame();
                    } else {
                        queue.set_bitrate(1000 * i);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        let pending = queue.drain_pending();
        assert!(pending.key_frame_requested());
        assert!(matches!(pending.bitrate_change(), Some(1000) | Some(3000)));
    }
}
