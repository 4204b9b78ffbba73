// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Encoder backed by the vendor `libmedia_codec.so`.

use std::ffi::CString;
use std::path::PathBuf;

use anyhow::Context;
use log::info;
use media_codec::CodecContext;
use media_codec::CodecType;
use media_codec::MediaCodecLibrary;
use media_codec::DEFAULT_LIBRARY_NAME;

use crate::backend::Encoder;
use crate::backend::EncoderSession;
use crate::backend::FrameSource;
use crate::backend::SessionConfig;
use crate::error::VideoError;
use crate::error::VideoResult;

pub struct MediaCodecEncoder {
    library_path: PathBuf,
    node: Option<CString>,
}

impl MediaCodecEncoder {
    pub fn new<P: Into<PathBuf>>(library_path: P) -> Self {
        Self {
            library_path: library_path.into(),
            node: None,
        }
    }

    /// Binds new contexts to the device node `node` instead of the library default.
    pub fn with_node(mut self, node: CString) -> Self {
        self.node = Some(node);
        self
    }
}

impl Default for MediaCodecEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_LIBRARY_NAME)
    }
}

impl Encoder for MediaCodecEncoder {
    type Session = MediaCodecSession;

    fn start_session(&mut self, config: &SessionConfig) -> VideoResult<MediaCodecSession> {
        let library = MediaCodecLibrary::open(&self.library_path)
            .with_context(|| format!("loading {}", self.library_path.display()))
            .map_err(VideoError::BackendUnavailable)?;
        let context = library
            .alloc_context(CodecType::H264Encode, self.node.as_deref())
            .context("allocating H.264 encoder context")
            .map_err(VideoError::BackendUnavailable)?;
        info!(
            "opened {} for {}x{} @ {} fps, {} bps",
            self.library_path.display(),
            config.width,
            config.height,
            config.frame_rate,
            config.bitrate
        );
        Ok(MediaCodecSession {
            context,
            submitted: 0,
        })
    }

    fn stop_session(&mut self, mut session: MediaCodecSession) -> VideoResult<()> {
        session
            .context
            .free()
            .context("freeing encoder context")
            .map_err(VideoError::BackendFailure)
    }
}

pub struct MediaCodecSession {
    context: CodecContext,
    // Raw frames submitted since the last `take_released_inputs`.
    submitted: usize,
}

impl EncoderSession for MediaCodecSession {
    fn encode_frame(&mut self, source: FrameSource, output: &mut [u8]) -> VideoResult<usize> {
        // The library only documents graphics buffer handles in this slot. Raw frames are passed
        // as the address of the I420 payload, which assumes the library accepts plain memory.
        let written = self
            .context
            .encode_frame(source.as_ptr(), output)
            .context("while encoding frame")
            .map_err(VideoError::BackendFailure)?;
        if let FrameSource::Raw(_) = source {
            self.submitted += 1;
        }
        Ok(written)
    }

    fn request_key_frame(&mut self) -> VideoResult<()> {
        self.context
            .request_key_frame()
            .context("while requesting key frame")
            .map_err(VideoError::BackendFailure)
    }

    fn set_bitrate(&mut self, _bitrate: u32) -> VideoResult<()> {
        Err(VideoError::Unsupported("bitrate change"))
    }

    fn take_released_inputs(&mut self) -> usize {
        // encode_frame copies raw frames before returning.
        std::mem::take(&mut self.submitted)
    }
}
