// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Buffer headers and the pool that owns them.
//!
//! Every buffer registered on a port lives in a [`BufferPool`] slot and carries an explicit
//! [`Owner`]. Ownership only moves through [`BufferPool::transfer`], so at any time either the
//! engine or the framework may touch a buffer, never both.

use std::fmt;
use std::fmt::Display;

use bitflags::bitflags;

use crate::port::PortError;

/// Identifies a buffer for as long as it stays registered.
pub type BufferId = u32;

/// Direction of buffer flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum PortIndex {
    /// Raw frames or metadata descriptors coming from the framework.
    Input = 0,
    /// Compressed bitstream going back to the framework.
    Output = 1,
}

impl PortIndex {
    pub(crate) fn slot(self) -> usize {
        self as usize
    }
}

impl Display for PortIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PortIndex::Input => write!(f, "input port"),
            PortIndex::Output => write!(f, "output port"),
        }
    }
}

/// The side currently allowed to read and write a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Framework,
    Engine,
}

impl Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Owner::Framework => write!(f, "framework"),
            Owner::Engine => write!(f, "engine"),
        }
    }
}

bitflags! {
    /// Per-buffer flags, bit-compatible with `OMX_BUFFERFLAG_*`.
    #[derive(Copy, Clone, Debug, Default, Eq, Hash, PartialEq)]
    #[repr(transparent)]
    pub struct BufferFlags: u32 {
        const EOS = 0x0000_0001;
        const START_TIME = 0x0000_0002;
        const DECODE_ONLY = 0x0000_0004;
        const DATA_CORRUPT = 0x0000_0008;
        const END_OF_FRAME = 0x0000_0010;
        const SYNC_FRAME = 0x0000_0020;
        const EXTRA_DATA = 0x0000_0040;
        const CODEC_CONFIG = 0x0000_0080;
    }
}

/// One buffer registered on a port.
#[derive(Debug)]
pub struct BufferHeader {
    id: BufferId,
    port: PortIndex,
    owner: Owner,
    data: Vec<u8>,
    /// Number of valid payload bytes starting at `offset`.
    pub filled_len: u32,
    /// Start of the valid payload within the buffer.
    pub offset: u32,
    /// Presentation timestamp in microseconds.
    pub timestamp: i64,
    pub flags: BufferFlags,
}

impl BufferHeader {
    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn port(&self) -> PortIndex {
        self.port
    }

    pub fn owner(&self) -> Owner {
        self.owner
    }

    /// Size of the buffer memory in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Returns the `offset`/`filled_len` window, or `None` if it does not fit in the buffer.
    pub fn payload(&self) -> Option<&[u8]> {
        let start = self.offset as usize;
        let end = start.checked_add(self.filled_len as usize)?;
        self.data.get(start..end)
    }

    /// Copies `bytes` to the start of the buffer and makes them the payload.
    ///
    /// Returns `false` and leaves the buffer untouched if `bytes` does not fit.
    pub fn set_payload(&mut self, bytes: &[u8]) -> bool {
        let len = match u32::try_from(bytes.len()) {
            Ok(len) if bytes.len() <= self.data.len() => len,
            _ => return false,
        };
        self.data[..bytes.len()].copy_from_slice(bytes);
        self.offset = 0;
        self.filled_len = len;
        true
    }

    pub(crate) fn set_owner(&mut self, owner: Owner) {
        self.owner = owner;
    }

    /// Clears the per-use fields before the buffer is filled again.
    pub(crate) fn reset_transient(&mut self) {
        self.flags = BufferFlags::empty();
        self.offset = 0;
        self.filled_len = 0;
        self.timestamp = 0;
    }
}

/// Bounded set of buffer headers for both ports.
#[derive(Debug)]
pub struct BufferPool {
    slots: Vec<Option<BufferHeader>>,
    // Maximum number of buffers per port, indexed by `PortIndex::slot`.
    limits: [usize; 2],
}

impl BufferPool {
    /// Creates a pool accepting up to `input_limit` input and `output_limit` output buffers.
    pub fn new(input_limit: usize, output_limit: usize) -> Self {
        Self {
            slots: Vec::new(),
            limits: [input_limit, output_limit],
        }
    }

    /// Number of buffers currently registered on `port`.
    pub fn count(&self, port: PortIndex) -> usize {
        self.headers().filter(|h| h.port == port).count()
    }

    pub fn limit(&self, port: PortIndex) -> usize {
        self.limits[port.slot()]
    }

    /// Creates a zero-filled buffer of `size` bytes on `port`, owned by the framework.
    pub fn allocate(&mut self, port: PortIndex, size: usize) -> Result<BufferId, PortError> {
        self.register(port, vec![0; size])
    }

    /// Registers framework-provided `memory` as a buffer on `port`, owned by the framework.
    pub fn register(&mut self, port: PortIndex, memory: Vec<u8>) -> Result<BufferId, PortError> {
        let limit = self.limit(port);
        if self.count(port) >= limit {
            return Err(PortError::PoolExhausted { port, limit });
        }

        let index = match self.slots.iter().position(Option::is_none) {
            Some(index) => index,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        let id = BufferId::try_from(index).map_err(|_| PortError::PoolExhausted { port, limit })?;
        self.slots[index] = Some(BufferHeader {
            id,
            port,
            owner: Owner::Framework,
            data: memory,
            filled_len: 0,
            offset: 0,
            timestamp: 0,
            flags: BufferFlags::empty(),
        });
        Ok(id)
    }

    /// Unregisters a framework-owned buffer and hands its memory back.
    pub fn release(&mut self, id: BufferId) -> Result<Vec<u8>, PortError> {
        let owner = self.get(id)?.owner;
        if owner != Owner::Framework {
            return Err(PortError::InvalidOwnership {
                id,
                expected: Owner::Framework,
                actual: owner,
            });
        }
        let header = self
            .slots
            .get_mut(id as usize)
            .and_then(Option::take)
            .ok_or(PortError::UnknownBuffer(id))?;
        Ok(header.data)
    }

    pub fn get(&self, id: BufferId) -> Result<&BufferHeader, PortError> {
        self.slots
            .get(id as usize)
            .and_then(Option::as_ref)
            .ok_or(PortError::UnknownBuffer(id))
    }

    pub fn get_mut(&mut self, id: BufferId) -> Result<&mut BufferHeader, PortError> {
        self.slots
            .get_mut(id as usize)
            .and_then(Option::as_mut)
            .ok_or(PortError::UnknownBuffer(id))
    }

    /// Returns `id` for modification by `owner`, failing if `owner` does not hold it.
    pub fn get_owned_mut(
        &mut self,
        id: BufferId,
        owner: Owner,
    ) -> Result<&mut BufferHeader, PortError> {
        let header = self.get_mut(id)?;
        if header.owner != owner {
            return Err(PortError::InvalidOwnership {
                id,
                expected: owner,
                actual: header.owner,
            });
        }
        Ok(header)
    }

    /// Borrows two distinct buffers mutably at once.
    pub fn pair_mut(
        &mut self,
        first: BufferId,
        second: BufferId,
    ) -> Result<(&mut BufferHeader, &mut BufferHeader), PortError> {
        if first == second {
            return Err(PortError::UnknownBuffer(second));
        }
        // Make sure both exist before splitting so the error names the right id.
        self.get(first)?;
        self.get(second)?;

        let (low, high) = (first.min(second) as usize, first.max(second) as usize);
        let (head, tail) = self.slots.split_at_mut(high);
        let (low_header, high_header) = match (head[low].as_mut(), tail[0].as_mut()) {
            (Some(l), Some(h)) => (l, h),
            _ => return Err(PortError::UnknownBuffer(first)),
        };
        if first < second {
            Ok((low_header, high_header))
        } else {
            Ok((high_header, low_header))
        }
    }

    /// Moves ownership of `id` from `from` to `to`.
    pub fn transfer(&mut self, id: BufferId, from: Owner, to: Owner) -> Result<(), PortError> {
        self.get_owned_mut(id, from)?.owner = to;
        Ok(())
    }

    /// Iterates over every registered buffer.
    pub fn headers(&self) -> impl Iterator<Item = &BufferHeader> {
        self.slots.iter().flatten()
    }
}
