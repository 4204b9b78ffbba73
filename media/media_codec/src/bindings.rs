// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Raw C ABI of `libmedia_codec.so`.

#![allow(non_camel_case_types)]
#![allow(non_upper_case_globals)]

use libc::c_char;
use libc::c_int;
use libc::c_void;

pub type codec_type_t = c_int;
pub const codec_type_t_H264_ENCODE: codec_type_t = 0;
pub const codec_type_t_H264_DECODE: codec_type_t = 1;

/// Function table returned by `get_media_codec`.
///
/// Every entry is nullable on the C side, so each is modeled as an `Option`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct media_codec_t {
    pub codec_alloc:
        Option<unsafe extern "C" fn(type_: codec_type_t, node: *const c_char) -> *mut c_void>,
    pub encode_frame: Option<
        unsafe extern "C" fn(
            context: *mut c_void,
            buffer_handle: *mut c_void,
            out_buf: *mut c_void,
            out_size: *mut c_int,
        ) -> c_int,
    >,
    pub request_key_frame: Option<unsafe extern "C" fn(context: *mut c_void) -> c_int>,
    pub codec_free: Option<unsafe extern "C" fn(context: *mut c_void) -> c_int>,
}

pub type get_media_codec_fn = unsafe extern "C" fn() -> *mut media_codec_t;
