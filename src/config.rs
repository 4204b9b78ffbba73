// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Encoder configuration file.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use media_codec::DEFAULT_LIBRARY_NAME;
use omx_encoder::ComponentOptions;
use omx_encoder::DEFAULT_BITRATE;
use omx_encoder::DEFAULT_BUFFER_COUNT;
use omx_encoder::DEFAULT_FRAME_RATE;
use omx_encoder::DEFAULT_HEIGHT;
use omx_encoder::DEFAULT_WIDTH;
use remain::sorted;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error as ThisError;

#[sorted]
#[derive(ThisError, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("buffer count must be at least 1")]
    NoBuffers,
    #[error("frame dimensions must be even, got {width}x{height}")]
    OddDimensions { width: u32, height: u32 },
    #[error("frame dimensions must be non-zero, got {width}x{height}")]
    ZeroDimensions { width: u32, height: u32 },
    #[error("frame rate must be non-zero")]
    ZeroFrameRate,
}

fn default_library() -> PathBuf {
    PathBuf::from(DEFAULT_LIBRARY_NAME)
}

fn default_width() -> u32 {
    DEFAULT_WIDTH
}

fn default_height() -> u32 {
    DEFAULT_HEIGHT
}

fn default_bitrate() -> u32 {
    DEFAULT_BITRATE
}

fn default_frame_rate() -> u32 {
    DEFAULT_FRAME_RATE
}

fn default_buffer_count() -> usize {
    DEFAULT_BUFFER_COUNT
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct EncoderConfig {
    /// Path of the codec library loaded at session start.
    #[serde(default = "default_library")]
    pub library: PathBuf,
    /// Device node codec contexts are bound to. The library picks one when unset.
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Target bitrate in bits per second.
    #[serde(default = "default_bitrate")]
    pub bitrate: u32,
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    /// Buffers allocated on each port.
    #[serde(default = "default_buffer_count")]
    pub buffer_count: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            library: default_library(),
            node: None,
            width: default_width(),
            height: default_height(),
            bitrate: default_bitrate(),
            frame_rate: default_frame_rate(),
            buffer_count: default_buffer_count(),
        }
    }
}

impl EncoderConfig {
    /// Reads a JSON configuration file. Missing fields take their default value.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let (width, height) = (self.width, self.height);
        if width == 0 || height == 0 {
            return Err(ConfigError::ZeroDimensions { width, height });
        }
        if width % 2 != 0 || height % 2 != 0 {
            return Err(ConfigError::OddDimensions { width, height });
        }
        if self.frame_rate == 0 {
            return Err(ConfigError::ZeroFrameRate);
        }
        if self.buffer_count == 0 {
            return Err(ConfigError::NoBuffers);
        }
        Ok(())
    }

    pub fn to_options(&self) -> ComponentOptions {
        ComponentOptions {
            width: self.width,
            height: self.height,
            bitrate: self.bitrate,
            frame_rate: self.frame_rate,
            buffer_count: self.buffer_count,
        }
    }

    /// Size in bytes of one I420 frame.
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 3 / 2
    }
}
