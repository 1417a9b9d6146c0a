// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Page-aligned transfer buffers.

use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

/// Allocation granularity of [`DataBuffer`].
pub const PAGE_SIZE: usize = 4096;

#[repr(C, align(4096))]
#[derive(Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
struct Page([u8; PAGE_SIZE]);

const ZERO_PAGE: Page = Page([0; PAGE_SIZE]);

/// A zero-initialized, page-aligned byte buffer whose address does not change
/// for its lifetime, suitable as the target of a device data transfer.
pub struct DataBuffer {
    pages: Vec<Page>,
    len: usize,
}

impl DataBuffer {
    /// Allocates a zeroed buffer of `len` bytes.
    pub fn new(len: usize) -> Self {
        Self {
            pages: vec![ZERO_PAGE; len.div_ceil(PAGE_SIZE)],
            len,
        }
    }

    /// Allocates a buffer holding a copy of `data`.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut buffer = Self::new(data.len());
        buffer.as_mut_bytes().copy_from_slice(data);
        buffer
    }

    /// The buffer length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pages.as_bytes()[..self.len]
    }

    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.pages.as_mut_bytes()[..self.len]
    }

    /// Copies the contents out.
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    /// The address of the first byte, or zero for an empty buffer.
    pub(crate) fn address(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.pages.as_ptr() as u64
        }
    }
}

impl std::fmt::Debug for DataBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataBuffer").field("len", &self.len).finish()
    }
}
