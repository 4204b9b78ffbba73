// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Bindings to the vendor `libmedia_codec.so` hardware codec library.
//!
//! The library exports a single entry point, `get_media_codec`, returning a table of four
//! functions operating on an opaque codec context. [`MediaCodecLibrary`] loads the library and
//! resolves the table, and [`CodecContext`] owns one allocated context.

pub mod bindings;
mod codec;
mod error;

pub use codec::CodecContext;
pub use codec::CodecType;
pub use codec::MediaCodecLibrary;
pub use codec::DEFAULT_LIBRARY_NAME;
pub use codec::ENTRY_POINT_SYMBOL;
pub use error::Error;
pub use error::Result;
