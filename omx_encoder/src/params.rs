// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Typed encoder parameters and runtime configs exposed to the framework.

use std::cmp::max;

use bitflags::bitflags;
use log::warn;
use remain::sorted;
use thiserror::Error as ThisError;

use crate::backend::SessionConfig;
use crate::buffer::PortIndex;
use crate::metadata;
use crate::update::UpdateQueue;

pub const DEFAULT_WIDTH: u32 = 176;
pub const DEFAULT_HEIGHT: u32 = 144;
pub const DEFAULT_BITRATE: u32 = 192_000;
pub const DEFAULT_FRAME_RATE: u32 = 30;
pub const DEFAULT_BUFFER_COUNT: usize = 4;

/// Smallest output buffer the component advertises, whatever the frame size.
pub const MIN_OUTPUT_BUFFER_SIZE: usize = 38_016;
/// Expected compression ratio used to size output buffers from the raw frame size.
pub const MIN_COMPRESSION_RATIO: usize = 2;

pub const RAW_MIME_TYPE: &str = "video/raw";
pub const AVC_MIME_TYPE: &str = "video/avc";

/// OMX-style status for parameter and config calls.
#[sorted]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
pub enum ParamError {
    #[error("bad parameter")]
    BadParameter,
    #[error("bad port index")]
    BadPortIndex,
    #[error("call not allowed in the current state")]
    IncorrectState,
    #[error("no more entries")]
    NoMore,
    #[error("undefined error")]
    Undefined,
    #[error("unsupported index")]
    UnsupportedIndex,
}

pub type ParamResult<T> = Result<T, ParamError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ControlRate {
    Disable = 0,
    Variable = 1,
    Constant = 2,
    VariableSkipFrames = 3,
    ConstantSkipFrames = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitrateParams {
    pub port: PortIndex,
    pub control_rate: ControlRate,
    pub target_bitrate: u32,
}

/// H.264 profiles, with their `OMX_VIDEO_AVCPROFILETYPE` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AvcProfile {
    Baseline = 0x01,
    Main = 0x02,
    Extended = 0x04,
    High = 0x08,
    ConstrainedBaseline = 0x7f00_0001,
}

/// H.264 levels, with their `OMX_VIDEO_AVCLEVELTYPE` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AvcLevel {
    Level3 = 0x100,
    Level31 = 0x200,
    Level32 = 0x400,
    Level4 = 0x800,
    Level41 = 0x1000,
    Level42 = 0x2000,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileLevel {
    pub profile: AvcProfile,
    pub level: AvcLevel,
}

/// Profile/level pairs reported by the enumeration query, in order.
pub const SUPPORTED_PROFILE_LEVELS: [ProfileLevel; 3] = [
    ProfileLevel {
        profile: AvcProfile::ConstrainedBaseline,
        level: AvcLevel::Level41,
    },
    ProfileLevel {
        profile: AvcProfile::Baseline,
        level: AvcLevel::Level41,
    },
    ProfileLevel {
        profile: AvcProfile::Main,
        level: AvcLevel::Level41,
    },
];

bitflags! {
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct PictureTypes: u32 {
        const I = 0x01;
        const P = 0x02;
        const B = 0x04;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvcParams {
    pub port: PortIndex,
    pub profile: AvcProfile,
    pub level: AvcLevel,
    pub ref_frames: u32,
    pub use_hadamard: bool,
    pub allowed_picture_types: PictureTypes,
    pub weighted_p_prediction: bool,
    pub constrained_intra_pred: bool,
    pub direct_8x8_inference: bool,
    pub direct_spatial_temporal: bool,
    pub cabac_init_idc: u32,
}

/// Android intra refresh config. A period of 0 disables intra refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntraRefresh {
    pub port: PortIndex,
    pub refresh_period: u32,
}

/// Runtime configs accepted while the component is encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigRequest {
    /// Forces the next frame to be a key frame when `refresh` is set.
    IntraVopRefresh { port: PortIndex, refresh: bool },
    Bitrate { port: PortIndex, bitrate: u32 },
    IntraRefresh(IntraRefresh),
}

/// Static description of one port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDefinition {
    pub port: PortIndex,
    pub buffer_count: usize,
    pub buffer_size: usize,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub bitrate: u32,
    pub mime_type: &'static str,
}

/// Construction-time settings for the component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentOptions {
    pub width: u32,
    pub height: u32,
    pub bitrate: u32,
    pub frame_rate: u32,
    pub buffer_count: usize,
}

impl Default for ComponentOptions {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            bitrate: DEFAULT_BITRATE,
            frame_rate: DEFAULT_FRAME_RATE,
            buffer_count: DEFAULT_BUFFER_COUNT,
        }
    }
}

/// Current parameter state of the component.
#[derive(Debug, Clone)]
pub struct EncoderParams {
    width: u32,
    height: u32,
    bitrate: u32,
    frame_rate: u32,
    buffer_count: usize,
    metadata_mode: bool,
}

fn check_output_port(port: PortIndex, error: ParamError) -> ParamResult<()> {
    if port == PortIndex::Output {
        Ok(())
    } else {
        Err(error)
    }
}

impl EncoderParams {
    pub fn new(options: &ComponentOptions) -> Self {
        Self {
            width: options.width,
            height: options.height,
            bitrate: options.bitrate,
            frame_rate: options.frame_rate,
            buffer_count: options.buffer_count,
            metadata_mode: false,
        }
    }

    pub fn bitrate(&self) -> u32 {
        self.bitrate
    }

    pub fn metadata_mode(&self) -> bool {
        self.metadata_mode
    }

    pub fn buffer_count(&self) -> usize {
        self.buffer_count
    }

    fn raw_frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 3 / 2
    }

    pub fn input_buffer_size(&self) -> usize {
        if self.metadata_mode {
            metadata::MAX_DESCRIPTOR_SIZE
        } else {
            self.raw_frame_size()
        }
    }

    pub fn output_buffer_size(&self) -> usize {
        max(
            self.raw_frame_size() / MIN_COMPRESSION_RATIO,
            MIN_OUTPUT_BUFFER_SIZE,
        )
    }

    pub fn bitrate_params(&self, port: PortIndex) -> ParamResult<BitrateParams> {
        check_output_port(port, ParamError::Undefined)?;
        Ok(BitrateParams {
            port,
            control_rate: ControlRate::Variable,
            target_bitrate: self.bitrate,
        })
    }

    /// Stores a new target bitrate and always schedules it for the backend.
    pub fn set_bitrate_params(
        &mut self,
        params: &BitrateParams,
        updates: &UpdateQueue,
    ) -> ParamResult<()> {
        check_output_port(params.port, ParamError::UnsupportedIndex)?;
        self.bitrate = params.target_bitrate;
        updates.set_bitrate(self.bitrate);
        Ok(())
    }

    pub fn avc_params(&self, port: PortIndex) -> ParamResult<AvcParams> {
        check_output_port(port, ParamError::Undefined)?;
        Ok(AvcParams {
            port,
            profile: AvcProfile::ConstrainedBaseline,
            level: AvcLevel::Level41,
            ref_frames: 1,
            use_hadamard: true,
            allowed_picture_types: PictureTypes::I | PictureTypes::P | PictureTypes::B,
            weighted_p_prediction: false,
            constrained_intra_pred: false,
            direct_8x8_inference: false,
            direct_spatial_temporal: false,
            cabac_init_idc: 0,
        })
    }

    pub fn set_avc_params(&mut self, params: &AvcParams) -> ParamResult<()> {
        warn!(
            "ignoring AVC parameters (profile {:?}, level {:?})",
            params.profile, params.level
        );
        Ok(())
    }

    pub fn profile_level(&self, index: usize) -> ParamResult<ProfileLevel> {
        SUPPORTED_PROFILE_LEVELS
            .get(index)
            .copied()
            .ok_or(ParamError::NoMore)
    }

    pub fn intra_refresh(&self, port: PortIndex) -> ParamResult<IntraRefresh> {
        check_output_port(port, ParamError::Undefined)?;
        Ok(IntraRefresh {
            port,
            refresh_period: 0,
        })
    }

    /// Applies a runtime config, posting any resulting change to `updates`.
    pub fn set_config(&mut self, request: &ConfigRequest, updates: &UpdateQueue) -> ParamResult<()> {
        match *request {
            ConfigRequest::IntraVopRefresh { port, refresh } => {
                check_output_port(port, ParamError::BadPortIndex)?;
                if refresh {
                    updates.request_key_frame();
                }
            }
            ConfigRequest::Bitrate { port, bitrate } => {
                check_output_port(port, ParamError::BadPortIndex)?;
                if self.bitrate != bitrate {
                    self.bitrate = bitrate;
                    updates.set_bitrate(bitrate);
                }
            }
            ConfigRequest::IntraRefresh(refresh) => {
                check_output_port(refresh.port, ParamError::Undefined)?;
            }
        }
        Ok(())
    }

    pub fn port_definition(&self, port: PortIndex) -> PortDefinition {
        let (buffer_size, mime_type) = match port {
            PortIndex::Input => (self.input_buffer_size(), RAW_MIME_TYPE),
            PortIndex::Output => (self.output_buffer_size(), AVC_MIME_TYPE),
        };
        PortDefinition {
            port,
            buffer_count: self.buffer_count,
            buffer_size,
            width: self.width,
            height: self.height,
            frame_rate: self.frame_rate,
            bitrate: self.bitrate,
            mime_type,
        }
    }

    /// Changes the frame geometry and rate. Dimensions must be non-zero and even.
    pub fn set_video_format(&mut self, width: u32, height: u32, frame_rate: u32) -> ParamResult<()> {
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 || frame_rate == 0 {
            return Err(ParamError::BadParameter);
        }
        self.width = width;
        self.height = height;
        self.frame_rate = frame_rate;
        Ok(())
    }

    pub fn set_metadata_mode(&mut self, port: PortIndex, enable: bool) -> ParamResult<()> {
        if port != PortIndex::Input {
            return Err(ParamError::BadPortIndex);
        }
        self.metadata_mode = enable;
        Ok(())
    }

    /// Settings a new backend session is opened with.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            width: self.width,
            height: self.height,
            bitrate: self.bitrate,
            frame_rate: self.frame_rate,
            metadata_mode: self.metadata_mode,
        }
    }
}
