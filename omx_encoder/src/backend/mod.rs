// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Interface between the drain engine and the codec doing the actual encoding.

pub mod fake;
pub mod media_codec;

use std::ffi::c_void;
use std::ptr::NonNull;

use crate::error::VideoResult;

/// Parameters a session is opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub width: u32,
    pub height: u32,
    pub bitrate: u32,
    pub frame_rate: u32,
    /// Whether frames are passed as graphics buffer handles instead of raw bytes.
    pub metadata_mode: bool,
}

/// Opaque graphics buffer handle extracted from a metadata descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceHandle(NonNull<c_void>);

impl SourceHandle {
    pub fn new(handle: NonNull<c_void>) -> Self {
        Self(handle)
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// The picture handed to one encode call.
#[derive(Debug, Clone, Copy)]
pub enum FrameSource<'a> {
    /// Raw I420 bytes taken from the input buffer payload.
    Raw(&'a [u8]),
    /// A graphics buffer referenced by a metadata descriptor.
    Graphic(SourceHandle),
}

impl FrameSource<'_> {
    /// Address passed to codec libraries that take either form through one pointer.
    pub fn as_ptr(&self) -> *const c_void {
        match self {
            FrameSource::Raw(bytes) => bytes.as_ptr() as *const c_void,
            FrameSource::Graphic(handle) => handle.as_ptr(),
        }
    }
}

pub trait EncoderSession {
    /// Encodes `source` synchronously into `output` and returns the number of bytes written.
    ///
    /// Zero is a valid result: the codec may hold on to frames before producing output.
    fn encode_frame(&mut self, source: FrameSource, output: &mut [u8]) -> VideoResult<usize>;

    /// Makes the next encoded frame a key frame.
    fn request_key_frame(&mut self) -> VideoResult<()>;

    /// Changes the target bitrate of the stream.
    fn set_bitrate(&mut self, bitrate: u32) -> VideoResult<()>;

    /// Returns how many raw frames, in submission order, the codec stopped referencing since the
    /// last call.
    fn take_released_inputs(&mut self) -> usize;

    /// Whether the codec has emitted everything it received. Only consulted after end of stream.
    fn output_drained(&self) -> bool {
        false
    }
}

pub trait Encoder {
    type Session: EncoderSession;

    fn start_session(&mut self, config: &SessionConfig) -> VideoResult<Self::Session>;
    fn stop_session(&mut self, session: Self::Session) -> VideoResult<()>;
}
