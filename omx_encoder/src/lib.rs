// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! OpenMAX-style H.264 encoder component backed by a hardware codec library.
//!
//! The framework owns the component lifecycle and hands buffers over through
//! [`AvcEncoder::push_input_buffer`] and [`AvcEncoder::push_output_buffer`]. Every push triggers
//! drain cycles that pair the head input buffer with the head output buffer, run them through an
//! [`backend::Encoder`] and hand the buffers back through [`ComponentEvent`] notifications.

pub mod backend;
mod buffer;
mod component;
mod engine;
mod error;
mod event;
pub mod metadata;
mod params;
mod port;
mod update;

use std::sync::Mutex;
use std::sync::MutexGuard;

pub use buffer::BufferFlags;
pub use buffer::BufferHeader;
pub use buffer::BufferId;
pub use buffer::BufferPool;
pub use buffer::Owner;
pub use buffer::PortIndex;
pub use component::AvcEncoder;
pub use engine::CycleOutcome;
pub use engine::Engine;
pub use engine::EngineState;
pub use engine::InputError;
pub use error::VideoError;
pub use error::VideoResult;
pub use event::ComponentEvent;
pub use event::EventSink;
pub use params::AvcLevel;
pub use params::AvcParams;
pub use params::AvcProfile;
pub use params::BitrateParams;
pub use params::ComponentOptions;
pub use params::ConfigRequest;
pub use params::ControlRate;
pub use params::EncoderParams;
pub use params::IntraRefresh;
pub use params::ParamError;
pub use params::ParamResult;
pub use params::PictureTypes;
pub use params::PortDefinition;
pub use params::ProfileLevel;
pub use params::DEFAULT_BITRATE;
pub use params::DEFAULT_BUFFER_COUNT;
pub use params::DEFAULT_FRAME_RATE;
pub use params::DEFAULT_HEIGHT;
pub use params::DEFAULT_WIDTH;
pub use port::PortError;
pub use port::PortQueue;
pub use port::Ports;
pub use update::PendingUpdates;
pub use update::UpdateFlags;
pub use update::UpdateQueue;

/// Locks `mutex`, panicking if a previous holder panicked: buffer ownership cannot be trusted
/// after a panic in the middle of a drain cycle.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(_) => panic!("encoder component lock poisoned"),
    }
}
