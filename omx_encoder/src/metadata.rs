// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Parsing of metadata descriptors carried by input buffers in metadata mode.
//!
//! In metadata mode an input buffer does not hold pixels. Its payload starts with a
//! [`MetadataBufferType`] tag followed by a pointer to a graphics buffer owned by the producer.
//! Only the native window buffer form can be turned into a [`SourceHandle`].

use std::ffi::c_int;
use std::ffi::c_void;
use std::mem::size_of;
use std::ptr::NonNull;

use enumn::N;
use remain::sorted;
use static_assertions::const_assert_eq;
use thiserror::Error as ThisError;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::KnownLayout;

use crate::backend::SourceHandle;

/// Tag stored in the first four bytes of a metadata descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, N)]
#[repr(u32)]
pub enum MetadataBufferType {
    /// Legacy form carrying a gralloc `buffer_handle_t` directly.
    GrallocSource = 1,
    /// Form carrying an `ANativeWindowBuffer` pointer and a fence.
    AnwBuffer = 2,
}

impl MetadataBufferType {
    /// Size of the descriptor this tag announces.
    pub fn descriptor_size(self) -> usize {
        match self {
            MetadataBufferType::GrallocSource => size_of::<VideoGrallocMetadata>(),
            MetadataBufferType::AnwBuffer => size_of::<VideoNativeMetadata>(),
        }
    }
}

/// Descriptor used with `MetadataBufferType::AnwBuffer`.
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct VideoNativeMetadata {
    pub buffer_type: u32,
    /// Address of an `ANativeWindowBuffer`.
    pub native_buffer: usize,
    pub fence_fd: i32,
}

/// Descriptor used with `MetadataBufferType::GrallocSource`.
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct VideoGrallocMetadata {
    pub buffer_type: u32,
    /// Value of a `buffer_handle_t`.
    pub handle: usize,
}

#[cfg(target_pointer_width = "64")]
const_assert_eq!(size_of::<VideoNativeMetadata>(), 24);
#[cfg(target_pointer_width = "64")]
const_assert_eq!(size_of::<VideoGrallocMetadata>(), 16);

/// Size of the largest descriptor. Metadata-mode input buffers must be at least this big.
pub const MAX_DESCRIPTOR_SIZE: usize = size_of::<VideoNativeMetadata>();

/// Header shared by Android native objects.
#[repr(C)]
pub struct AndroidNativeBase {
    pub magic: c_int,
    pub version: c_int,
    pub reserved: [*mut c_void; 4],
    pub inc_ref: Option<unsafe extern "C" fn(*mut AndroidNativeBase)>,
    pub dec_ref: Option<unsafe extern "C" fn(*mut AndroidNativeBase)>,
}

/// Layout of `ANativeWindowBuffer` as produced by the graphics stack.
#[repr(C)]
pub struct ANativeWindowBuffer {
    pub common: AndroidNativeBase,
    pub width: c_int,
    pub height: c_int,
    pub stride: c_int,
    pub format: c_int,
    pub usage_deprecated: c_int,
    pub layer_count: usize,
    pub reserved: [*mut c_void; 1],
    /// The `native_handle_t` handed to the codec library.
    pub handle: *const c_void,
    pub usage: u64,
    pub reserved_proc: [*mut c_void; 8 - size_of::<u64>() / size_of::<*mut c_void>()],
}

#[sorted]
#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum MetadataError {
    #[error("metadata buffer cannot be resolved: {0}")]
    ResolutionFailed(&'static str),
    #[error("metadata is too small ({len} vs {required})")]
    TooSmall { len: usize, required: usize },
    #[error("unsupported metadata type ({0})")]
    UnsupportedType(u32),
}

/// Checks that `payload` holds a complete descriptor with a known tag.
pub fn validate(payload: &[u8]) -> Result<MetadataBufferType, MetadataError> {
    let tag = match u32::read_from_prefix(payload) {
        Ok((tag, _)) => tag,
        Err(_) => {
            return Err(MetadataError::TooSmall {
                len: payload.len(),
                required: size_of::<u32>(),
            })
        }
    };
    let buffer_type = MetadataBufferType::n(tag).ok_or(MetadataError::UnsupportedType(tag))?;
    let required = buffer_type.descriptor_size();
    if payload.len() < required {
        return Err(MetadataError::TooSmall {
            len: payload.len(),
            required,
        });
    }
    Ok(buffer_type)
}

/// Extracts the graphics buffer handle referenced by `payload`.
///
/// # Safety
///
/// If `payload` is a native window buffer descriptor with a non-null buffer address, that address
/// must point to a live `ANativeWindowBuffer` for the duration of the call.
pub unsafe fn resolve(payload: &[u8]) -> Result<SourceHandle, MetadataError> {
    match validate(payload)? {
        MetadataBufferType::GrallocSource => Err(MetadataError::ResolutionFailed(
            "gralloc source descriptors are not supported",
        )),
        MetadataBufferType::AnwBuffer => {
            let (meta, _) = VideoNativeMetadata::read_from_prefix(payload).map_err(|_| {
                MetadataError::TooSmall {
                    len: payload.len(),
                    required: size_of::<VideoNativeMetadata>(),
                }
            })?;
            let buffer = NonNull::new(meta.native_buffer as *mut ANativeWindowBuffer)
                .ok_or(MetadataError::ResolutionFailed("ANativeWindowBuffer is null"))?;
            // SAFETY: the caller guarantees a non-null address points to a live buffer.
            let handle = unsafe { buffer.as_ref().handle };
            NonNull::new(handle as *mut c_void)
                .map(SourceHandle::new)
                .ok_or(MetadataError::ResolutionFailed("buffer_handle_t is null"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::ptr;

    use super::*;

    fn window_buffer(handle: *const c_void) -> Box<ANativeWindowBuffer> {
        Box::new(ANativeWindowBuffer {
            common: AndroidNativeBase {
                magic: 0,
                version: size_of::<ANativeWindowBuffer>() as c_int,
                reserved: [ptr::null_mut(); 4],
                inc_ref: None,
                dec_ref: None,
            },
            width: 176,
            height: 144,
            stride: 176,
            format: 0,
            usage_deprecated: 0,
            layer_count: 1,
            reserved: [ptr::null_mut(); 1],
            handle,
            usage: 0,
            reserved_proc: [ptr::null_mut(); 8 - size_of::<u64>() / size_of::<*mut c_void>()],
        })
    }

    fn native_descriptor(native_buffer: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; size_of::<VideoNativeMetadata>()];
        bytes[..4].copy_from_slice(&(MetadataBufferType::AnwBuffer as u32).to_ne_bytes());
        let offset = std::mem::offset_of!(VideoNativeMetadata, native_buffer);
        bytes[offset..offset + size_of::<usize>()].copy_from_slice(&native_buffer.to_ne_bytes());
        bytes
    }

    #[test]
    fn validate_rejects_short_and_unknown() {
        assert_eq!(
            validate(&[2, 0]),
            Err(MetadataError::TooSmall {
                len: 2,
                required: 4
            })
        );
        assert_eq!(
            validate(&7u32.to_ne_bytes()),
            Err(MetadataError::UnsupportedType(7))
        );
        let short = &native_descriptor(0)[..8];
        assert!(matches!(
            validate(short),
            Err(MetadataError::TooSmall { len: 8, .. })
        ));
    }

    #[test]
    fn validate_accepts_both_forms() {
        assert_eq!(
            validate(&native_descriptor(0)),
            Ok(MetadataBufferType::AnwBuffer)
        );
        let mut gralloc = vec![0u8; size_of::<VideoGrallocMetadata>()];
        gralloc[..4].copy_from_slice(&1u32.to_ne_bytes());
        assert_eq!(validate(&gralloc), Ok(MetadataBufferType::GrallocSource));
    }

    #[test]
    fn resolve_extracts_native_handle() {
        let mut native_handle = 0u64;
        let handle_ptr = &mut native_handle as *mut u64 as *const c_void;
        let buffer = window_buffer(handle_ptr);
        let descriptor = native_descriptor(&*buffer as *const ANativeWindowBuffer as usize);

        // SAFETY: `buffer` outlives the call.
        let handle = unsafe { resolve(&descriptor) }.unwrap();
        assert_eq!(handle.as_ptr() as *const c_void, handle_ptr);
    }

    #[test]
    fn resolve_fails_on_null_pointers() {
        // SAFETY: a null buffer address is never dereferenced.
        assert!(matches!(
            unsafe { resolve(&native_descriptor(0)) },
            Err(MetadataError::ResolutionFailed(_))
        ));

        let buffer = window_buffer(ptr::null());
        let descriptor = native_descriptor(&*buffer as *const ANativeWindowBuffer as usize);
        // SAFETY: `buffer` outlives the call.
        assert!(matches!(
            unsafe { resolve(&descriptor) },
            Err(MetadataError::ResolutionFailed(_))
        ));
    }

    #[test]
    fn resolve_rejects_gralloc_source() {
        let mut gralloc = vec![0u8; size_of::<VideoGrallocMetadata>()];
        gralloc[..4].copy_from_slice(&1u32.to_ne_bytes());
        let offset = std::mem::offset_of!(VideoGrallocMetadata, handle);
        gralloc[offset..offset + size_of::<usize>()].copy_from_slice(&0x1000usize.to_ne_bytes());
        // SAFETY: gralloc descriptors are never dereferenced.
        assert!(matches!(
            unsafe { resolve(&gralloc) },
            Err(MetadataError::ResolutionFailed(_))
        ));
    }
}
