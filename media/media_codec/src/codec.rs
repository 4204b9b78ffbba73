// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::ffi::CStr;
use std::ffi::OsStr;
use std::ptr;
use std::ptr::NonNull;
use std::sync::Arc;

use libc::c_char;
use libc::c_int;
use libc::c_void;
use libloading::os::unix::Library as UnixLibrary;
use libloading::os::unix::RTLD_NOW;
use libloading::Library;
use log::debug;
use log::error;

use crate::bindings;
use crate::error::Error;
use crate::error::Result;

/// Library loaded when no explicit path is configured.
pub const DEFAULT_LIBRARY_NAME: &str = "libmedia_codec.so";
/// Name of the entry point returning the function table.
pub const ENTRY_POINT_SYMBOL: &str = "get_media_codec";

/// Kind of codec context to allocate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecType {
    H264Encode,
    H264Decode,
}

impl CodecType {
    fn raw(self) -> bindings::codec_type_t {
        match self {
            CodecType::H264Encode => bindings::codec_type_t_H264_ENCODE,
            CodecType::H264Decode => bindings::codec_type_t_H264_DECODE,
        }
    }
}

type AllocFn = unsafe extern "C" fn(bindings::codec_type_t, *const c_char) -> *mut c_void;
type EncodeFn = unsafe extern "C" fn(*mut c_void, *mut c_void, *mut c_void, *mut c_int) -> c_int;
type ContextFn = unsafe extern "C" fn(*mut c_void) -> c_int;

/// Function table with every entry checked for null.
#[derive(Clone, Copy)]
struct CodecFunctions {
    alloc: AllocFn,
    encode_frame: EncodeFn,
    request_key_frame: ContextFn,
    free: ContextFn,
}

impl CodecFunctions {
    fn from_table(table: &bindings::media_codec_t) -> Result<Self> {
        Ok(Self {
            alloc: table.codec_alloc.ok_or(Error::NullFunction("codec_alloc"))?,
            encode_frame: table
                .encode_frame
                .ok_or(Error::NullFunction("encode_frame"))?,
            request_key_frame: table
                .request_key_frame
                .ok_or(Error::NullFunction("request_key_frame"))?,
            free: table.codec_free.ok_or(Error::NullFunction("codec_free"))?,
        })
    }
}

/// A loaded `libmedia_codec.so` and its resolved function table.
pub struct MediaCodecLibrary {
    functions: CodecFunctions,
    // Keeps the function pointers above valid. `None` only for tables built in-process by tests.
    _library: Option<Library>,
}

// SAFETY: the library handle is only used to keep the code mapped, and the function table holds
// plain function pointers. The vendor library is required to be callable from any thread.
unsafe impl Send for MediaCodecLibrary {}
// SAFETY: see above; nothing in `MediaCodecLibrary` is mutated after `open`.
unsafe impl Sync for MediaCodecLibrary {}

impl MediaCodecLibrary {
    /// Loads the library at `path` and resolves its `get_media_codec` function table.
    pub fn open<P: AsRef<OsStr>>(path: P) -> Result<Arc<Self>> {
        let path = path.as_ref();
        // SAFETY: loading a library runs its initializers. The vendor codec library is trusted
        // to be well-behaved; it is kept resident with RTLD_NODELETE like the platform does.
        let library: Library =
            unsafe { UnixLibrary::open(Some(path), RTLD_NOW | libc::RTLD_NODELETE) }
                .map_err(|source| Error::LibraryOpen {
                    path: path.to_string_lossy().into_owned(),
                    source,
                })?
                .into();

        // SAFETY: `get_media_codec` is declared by the vendor header with this exact signature.
        let get_media_codec: bindings::get_media_codec_fn = unsafe {
            *library
                .get::<bindings::get_media_codec_fn>(b"get_media_codec\0")
                .map_err(|source| Error::MissingSymbol {
                    symbol: ENTRY_POINT_SYMBOL,
                    source,
                })?
        };

        // SAFETY: the entry point takes no arguments and returns a pointer to a table that lives
        // as long as the library stays loaded.
        let table = NonNull::new(unsafe { get_media_codec() }).ok_or(Error::NullTable)?;
        // SAFETY: `table` is non-null and points to a valid `media_codec_t`.
        let functions = CodecFunctions::from_table(unsafe { table.as_ref() })?;
        debug!("resolved {} from {}", ENTRY_POINT_SYMBOL, path.to_string_lossy());

        Ok(Arc::new(Self {
            functions,
            _library: Some(library),
        }))
    }

    #[cfg(test)]
    pub(crate) fn from_table(table: bindings::media_codec_t) -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            functions: CodecFunctions::from_table(&table)?,
            _library: None,
        }))
    }

    /// Allocates a codec context of `codec_type`, optionally bound to the device `node`.
    pub fn alloc_context(
        self: &Arc<Self>,
        codec_type: CodecType,
        node: Option<&CStr>,
    ) -> Result<CodecContext> {
        let node = node.map_or(ptr::null(), CStr::as_ptr);
        // SAFETY: `node` is either null or a valid NUL-terminated string that outlives the call.
        let context = unsafe { (self.functions.alloc)(codec_type.raw(), node) };
        let context = NonNull::new(context).ok_or(Error::ContextAllocation)?;
        Ok(CodecContext {
            library: Arc::clone(self),
            context: Some(context),
        })
    }
}

/// An allocated codec context. The context is freed when this is dropped.
pub struct CodecContext {
    library: Arc<MediaCodecLibrary>,
    context: Option<NonNull<c_void>>,
}

// SAFETY: the context is only ever used through `&mut self`, so it is never accessed from two
// threads at once, and the vendor library does not tie contexts to their allocating thread.
unsafe impl Send for CodecContext {}

impl CodecContext {
    /// Encodes the frame referenced by `buffer_handle` into `output`.
    ///
    /// Returns the number of bytes written, which may be zero if the codec buffered the frame.
    /// `buffer_handle` is passed through untouched: either a graphics buffer handle or the
    /// address of raw frame data, depending on how the codec was set up.
    ///
    /// `out_size` is seeded with the capacity of `output` rather than 0. The library must
    /// overwrite it with the number of bytes produced; a library that adds to the incoming
    /// value reports more than the capacity and fails with `Error::EncodeOverflow`.
    pub fn encode_frame(&mut self, buffer_handle: *const c_void, output: &mut [u8]) -> Result<usize> {
        let context = self.raw_context()?;
        let capacity = output.len();
        // In: available capacity. Out: bytes produced.
        let mut out_size = c_int::try_from(capacity).unwrap_or(c_int::MAX);
        // SAFETY: `context` is a live context, `output` is valid for `out_size` bytes and
        // `out_size` is a valid pointer for the duration of the call.
        let status = unsafe {
            (self.library.functions.encode_frame)(
                context.as_ptr(),
                buffer_handle as *mut c_void,
                output.as_mut_ptr() as *mut c_void,
                &mut out_size,
            )
        };
        if status != 0 {
            return Err(Error::EncodeFrame(status));
        }
        let written = usize::try_from(out_size).map_err(|_| Error::EncodeFrame(out_size))?;
        if written > capacity {
            return Err(Error::EncodeOverflow { written, capacity });
        }
        Ok(written)
    }

    /// Asks the codec to emit a key frame for the next encoded frame.
    pub fn request_key_frame(&mut self) -> Result<()> {
        let context = self.raw_context()?;
        // SAFETY: `context` is a live context allocated by this library.
        match unsafe { (self.library.functions.request_key_frame)(context.as_ptr()) } {
            0 => Ok(()),
            status => Err(Error::RequestKeyFrame(status)),
        }
    }

    /// Frees the context. Calling this more than once is a no-op.
    pub fn free(&mut self) -> Result<()> {
        let context = match self.context.take() {
            Some(context) => context,
            None => return Ok(()),
        };
        // SAFETY: `context` was allocated by this library and is never used after this call.
        match unsafe { (self.library.functions.free)(context.as_ptr()) } {
            0 => Ok(()),
            status => Err(Error::Free(status)),
        }
    }

    fn raw_context(&self) -> Result<NonNull<c_void>> {
        self.context.ok_or(Error::ContextAllocation)
    }
}

impl Drop for CodecContext {
    fn drop(&mut self) {
        if let Err(e) = self.free() {
            error!("failed to free codec context: {}", e);
        }
    }
}
