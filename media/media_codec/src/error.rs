// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use libc::c_int;
use remain::sorted;
use thiserror::Error as ThisError;

#[sorted]
#[derive(ThisError, Debug)]
pub enum Error {
    /// `codec_alloc` returned a null context.
    #[error("codec_alloc returned a null context")]
    ContextAllocation,
    /// `encode_frame` returned a non-zero status.
    #[error("encode_frame failed with status {0}")]
    EncodeFrame(c_int),
    /// The library wrote more bytes than the output buffer can hold.
    #[error("encoder reported {written} bytes for a {capacity}-byte output buffer")]
    EncodeOverflow { written: usize, capacity: usize },
    /// `codec_free` returned a non-zero status.
    #[error("codec_free failed with status {0}")]
    Free(c_int),
    /// The shared library could not be opened.
    #[error("failed to open {path}: {source}")]
    LibraryOpen {
        path: String,
        source: libloading::Error,
    },
    /// The entry point symbol is missing from the library.
    #[error("symbol {symbol} not found: {source}")]
    MissingSymbol {
        symbol: &'static str,
        source: libloading::Error,
    },
    /// A required entry of the function table is null.
    #[error("function table entry {0} is null")]
    NullFunction(&'static str),
    /// The entry point returned a null function table.
    #[error("get_media_codec returned a null function table")]
    NullTable,
    /// `request_key_frame` returned a non-zero status.
    #[error("request_key_frame failed with status {0}")]
    RequestKeyFrame(c_int),
}

pub type Result<T> = std::result::Result<T, Error>;
