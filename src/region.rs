use std::ptr::NonNull;

use crate::{
    error::PoolError,
    kernel::{page_size, request_memory, return_memory},
    utils::{align, checked_align},
};

/// A memory region mapped straight from the kernel and exclusively owned by
/// one [`crate::chunk::Chunk`]. It is returned to the kernel on drop.
///
/// [`request_memory`] gives us regions aligned to the computer page size. That
/// is enough for blocks up to a page, but a chunk of 64 KiB blocks needs its
/// first block aligned to 64 KiB. In that case we over-reserve and skip the
/// unaligned prefix:
///
/// ```text
///  base                 start                                  base + mapped_len
///   |                     |                                           |
///   v                     v                                           v
///   +---------------------+-------------------------------------------+---------+
///   |  padding (unused)   |             usable bytes (len)            | unused  |
///   +---------------------+-------------------------------------------+---------+
///                         ^
///                         +-- multiple of `align`
/// ```
///
/// Both `base` and `mapped_len` are kept since the kernel wants back exactly
/// what it gave us.
pub(crate) struct Region {
    /// Address returned by the kernel.
    base: NonNull<u8>,
    /// Length of the whole mapping, padding included.
    mapped_len: usize,
    /// First usable byte, multiple of the requested alignment.
    start: NonNull<u8>,
    /// Usable bytes starting at `start`.
    len: usize,
}

// SAFETY: the mapping is owned by exactly one `Region` and only ever touched
// through it, so moving it to another thread is fine. It is not `Sync`.
unsafe impl Send for Region {}

impl Region {
    /// Maps at least `len` usable bytes whose start is a multiple of `aligment`.
    /// `aligment` must be a power of two and `len` non-zero.
    pub fn map(len: usize, aligment: usize) -> Result<Self, PoolError> {
        debug_assert!(len > 0);

        let page_size = page_size();
        let padding = aligment.saturating_sub(page_size);

        let mapped_len = len
            .checked_add(padding)
            .and_then(|needed| checked_align(needed, page_size))
            .ok_or(PoolError::CapacityOverflow)?;

        let base = unsafe { request_memory(mapped_len) }.ok_or(PoolError::OutOfMemory {
            size: len,
            align: aligment,
        })?;

        let offset = align(base.as_ptr() as usize, aligment) - base.as_ptr() as usize;
        debug_assert!(offset + len <= mapped_len);

        // SAFETY: `offset <= padding`, so `start` stays inside the mapping.
        let start = unsafe { NonNull::new_unchecked(base.as_ptr().add(offset)) };

        Ok(Self {
            base,
            mapped_len,
            start,
            len,
        })
    }

    #[inline]
    pub fn start(&self) -> NonNull<u8> {
        self.start
    }

    /// Byte offset of `addr` from the usable start, if `addr` falls inside the
    /// usable bytes.
    #[inline]
    pub fn offset_of(&self, addr: NonNull<u8>) -> Option<usize> {
        let offset = (addr.as_ptr() as usize).checked_sub(self.start.as_ptr() as usize)?;

        (offset < self.len).then_some(offset)
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        // SAFETY: `base` and `mapped_len` are exactly what the kernel gave us,
        // and the owning chunk is gone so nobody can reach the memory anymore.
        unsafe { return_memory(self.base, self.mapped_len) }
    }
}
