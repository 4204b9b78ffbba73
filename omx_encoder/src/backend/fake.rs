// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! In-memory encoder that records every call it receives.
//!
//! Used by the tests and by `avcenc --fake-backend` to exercise the component without the vendor
//! library. Each encoded frame becomes a short Annex B NAL unit.

use std::sync::Arc;
use std::sync::Mutex;

use anyhow::anyhow;

use crate::backend::Encoder;
use crate::backend::EncoderSession;
use crate::backend::FrameSource;
use crate::backend::SessionConfig;
use crate::error::VideoError;
use crate::error::VideoResult;
use crate::lock;

const START_CODE: [u8; 4] = [0, 0, 0, 1];
const NAL_IDR_SLICE: u8 = 0x65;
const NAL_SLICE: u8 = 0x41;

/// What an encode call was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordedSource {
    /// Raw frame of this many bytes.
    Raw(usize),
    /// Graphics buffer handle at this address.
    Graphic(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
    Open(SessionConfig),
    Encode {
        source: RecordedSource,
        capacity: usize,
    },
    RequestKeyFrame,
    SetBitrate(u32),
    Close,
}

/// Behavior knobs of [`FakeEncoder`].
#[derive(Debug, Clone)]
pub struct FakeSettings {
    /// Bytes produced per encoded frame, capped by the output capacity.
    pub output_bytes: usize,
    /// Number of leading frames for which the encoder produces no output.
    pub silent_frames: usize,
    /// Number of raw frames the encoder keeps referencing after encoding them.
    pub release_delay: usize,
    /// Whether `output_drained` reports true.
    pub drain_on_eos: bool,
    pub supports_bitrate: bool,
}

impl Default for FakeSettings {
    fn default() -> Self {
        Self {
            output_bytes: 64,
            silent_frames: 0,
            release_delay: 0,
            drain_on_eos: false,
            supports_bitrate: true,
        }
    }
}

#[derive(Debug, Default)]
struct FakeState {
    calls: Vec<FakeCall>,
    unavailable: bool,
    fail_encode: bool,
    open_sessions: usize,
}

/// Handle for inspecting and steering a [`FakeEncoder`] from outside the component.
#[derive(Debug, Clone, Default)]
pub struct FakeControl(Arc<Mutex<FakeState>>);

impl FakeControl {
    /// Every call received so far, oldest first.
    pub fn calls(&self) -> Vec<FakeCall> {
        lock(&self.0).calls.clone()
    }

    /// Number of encode calls received so far.
    pub fn encode_count(&self) -> usize {
        lock(&self.0)
            .calls
            .iter()
            .filter(|call| matches!(call, FakeCall::Encode { .. }))
            .count()
    }

    pub fn clear_calls(&self) {
        lock(&self.0).calls.clear();
    }

    /// Makes the next `start_session` calls fail as if the library were missing.
    pub fn set_unavailable(&self, unavailable: bool) {
        lock(&self.0).unavailable = unavailable;
    }

    /// Makes encode calls fail.
    pub fn set_fail_encode(&self, fail: bool) {
        lock(&self.0).fail_encode = fail;
    }

    pub fn open_sessions(&self) -> usize {
        lock(&self.0).open_sessions
    }

    fn record(&self, call: FakeCall) {
        lock(&self.0).calls.push(call);
    }
}

pub struct FakeEncoder {
    settings: FakeSettings,
    control: FakeControl,
}

impl FakeEncoder {
    pub fn new(settings: FakeSettings) -> Self {
        Self {
            settings,
            control: FakeControl::default(),
        }
    }

    pub fn control(&self) -> FakeControl {
        self.control.clone()
    }
}

impl Default for FakeEncoder {
    fn default() -> Self {
        Self::new(FakeSettings::default())
    }
}

impl Encoder for FakeEncoder {
    type Session = FakeSession;

    fn start_session(&mut self, config: &SessionConfig) -> VideoResult<FakeSession> {
        {
            let mut state = lock(&self.control.0);
            if state.unavailable {
                return Err(VideoError::BackendUnavailable(anyhow!(
                    "fake encoder is unavailable"
                )));
            }
            state.open_sessions += 1;
        }
        self.control.record(FakeCall::Open(*config));
        Ok(FakeSession {
            settings: self.settings.clone(),
            control: self.control.clone(),
            frames: 0,
            key_frame_pending: true,
            unreleased: 0,
        })
    }

    fn stop_session(&mut self, _session: FakeSession) -> VideoResult<()> {
        lock(&self.control.0).open_sessions -= 1;
        self.control.record(FakeCall::Close);
        Ok(())
    }
}

pub struct FakeSession {
    settings: FakeSettings,
    control: FakeControl,
    frames: usize,
    key_frame_pending: bool,
    unreleased: usize,
}

impl EncoderSession for FakeSession {
    fn encode_frame(&mut self, source: FrameSource, output: &mut [u8]) -> VideoResult<usize> {
        let recorded = match source {
            FrameSource::Raw(bytes) => RecordedSource::Raw(bytes.len()),
            FrameSource::Graphic(handle) => RecordedSource::Graphic(handle.as_ptr() as usize),
        };
        self.control.record(FakeCall::Encode {
            source: recorded,
            capacity: output.len(),
        });
        if lock(&self.control.0).fail_encode {
            return Err(VideoError::BackendFailure(anyhow!("fake encode failure")));
        }
        if let FrameSource::Raw(_) = source {
            self.unreleased += 1;
        }

        self.frames += 1;
        if self.frames <= self.settings.silent_frames {
            return Ok(0);
        }

        let len = self.settings.output_bytes.min(output.len());
        let nal_type = if std::mem::take(&mut self.key_frame_pending) {
            NAL_IDR_SLICE
        } else {
            NAL_SLICE
        };
        let header = START_CODE.iter().copied().chain(std::iter::once(nal_type));
        let frames = self.frames;
        let body = (0..).map(|i: usize| frames.wrapping_add(i) as u8);
        for (dst, src) in output[..len].iter_mut().zip(header.chain(body)) {
            *dst = src;
        }
        Ok(len)
    }

    fn request_key_frame(&mut self) -> VideoResult<()> {
        self.control.record(FakeCall::RequestKeyFrame);
        self.key_frame_pending = true;
        Ok(())
    }

    fn set_bitrate(&mut self, bitrate: u32) -> VideoResult<()> {
        self.control.record(FakeCall::SetBitrate(bitrate));
        if self.settings.supports_bitrate {
            Ok(())
        } else {
            Err(VideoError::Unsupported("bitrate change"))
        }
    }

    fn take_released_inputs(&mut self) -> usize {
        let released = self.unreleased.saturating_sub(self.settings.release_delay);
        self.unreleased -= released;
        released
    }

    fn output_drained(&self) -> bool {
        self.settings.drain_on_eos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SessionConfig {
        SessionConfig {
            width: 16,
            height: 16,
            bitrate: 1000,
            frame_rate: 30,
            metadata_mode: false,
        }
    }

    #[test]
    fn first_frame_is_idr() {
        let mut encoder = FakeEncoder::new(FakeSettings {
            output_bytes: 8,
            ..Default::default()
        });
        let mut session = encoder.start_session(&config()).unwrap();
        let mut output = [0u8; 16];
        assert_eq!(
            session
                .encode_frame(FrameSource::Raw(&[0; 10]), &mut output)
                .unwrap(),
            8
        );
        assert_eq!(&output[..5], &[0, 0, 0, 1, NAL_IDR_SLICE]);
        session
            .encode_frame(FrameSource::Raw(&[0; 10]), &mut output)
            .unwrap();
        assert_eq!(output[4], NAL_SLICE);
        session.request_key_frame().unwrap();
        session
            .encode_frame(FrameSource::Raw(&[0; 10]), &mut output)
            .unwrap();
        assert_eq!(output[4], NAL_IDR_SLICE);
    }

    #[test]
    fn release_delay_holds_frames() {
        let mut encoder = FakeEncoder::new(FakeSettings {
            release_delay: 1,
            ..Default::default()
        });
        let control = encoder.control();
        let mut session = encoder.start_session(&config()).unwrap();
        let mut output = [0u8; 128];
        session
            .encode_frame(FrameSource::Raw(&[0; 4]), &mut output)
            .unwrap();
        assert_eq!(session.take_released_inputs(), 0);
        session
            .encode_frame(FrameSource::Raw(&[0; 4]), &mut output)
            .unwrap();
        assert_eq!(session.take_released_inputs(), 1);
        assert_eq!(control.open_sessions(), 1);
        encoder.stop_session(session).unwrap();
        assert_eq!(control.open_sessions(), 0);
        assert_eq!(control.calls().last(), Some(&FakeCall::Close));
    }
}
