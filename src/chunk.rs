use std::ptr::NonNull;

use crate::{error::PoolError, freelist::FreeList, region::Region};

/// One contiguous memory region holding `capacity` blocks of `block_size`
/// bytes, all of them owned by a single [`crate::sub_pool::SubPool`].
///
/// Blocks are handed out in two ways. Blocks that were never used are taken
/// from the untouched tail by bumping `next_free_index`. Blocks that were
/// used and given back live in the [`FreeList`] until somebody needs them
/// again.
///
/// ```text
///            used or freed                        untouched
///  +-------+-------+-------+-------+-------+-------+-------+-------+
///  |   0   |   1   |   2   |   3   |   4   |   5   |   6   |   7   |
///  +-------+-------+-------+-------+-------+-------+-------+-------+
///                                          ^
///                                          next_free_index
/// ```
///
/// At any time `free_blocks == (capacity - next_free_index) + free_list.len()`.
pub(crate) struct Chunk {
    memory: Region,
    block_size: usize,
    capacity: usize,
    /// Blocks currently available, untouched and freed ones.
    free_blocks: usize,
    /// Boundary of the untouched region.
    next_free_index: usize,
    free_list: FreeList,
}

impl Chunk {
    /// Maps a new chunk. Its first block is aligned to `block_size`, which has
    /// to be a power of two, so every block is.
    pub fn new(block_size: usize, capacity: usize) -> Result<Self, PoolError> {
        debug_assert!(capacity > 0);

        let len = block_size
            .checked_mul(capacity)
            .ok_or(PoolError::CapacityOverflow)?;

        Ok(Self {
            memory: Region::map(len, block_size)?,
            block_size,
            capacity,
            free_blocks: capacity,
            next_free_index: 0,
            free_list: FreeList::with_capacity(capacity),
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn free_blocks(&self) -> usize {
        self.free_blocks
    }

    #[inline]
    pub fn untouched_blocks(&self) -> usize {
        self.capacity - self.next_free_index
    }

    #[inline]
    pub fn has_freelist_blocks(&self) -> bool {
        !self.free_list.is_empty()
    }

    /// Whether giving one more block back leaves the chunk without live blocks.
    #[inline]
    pub fn is_last_live_block(&self) -> bool {
        self.free_blocks + 1 == self.capacity
    }

    /// Address of the block at `index`.
    #[inline]
    pub fn block_ptr(&self, index: usize) -> NonNull<u8> {
        debug_assert!(index < self.capacity);

        // SAFETY: `index < capacity`, so the block lies inside the region.
        unsafe {
            NonNull::new_unchecked(self.memory.start().as_ptr().add(index * self.block_size))
        }
    }

    /// Index of the block starting at `ptr`, if `ptr` is the start of one of
    /// our blocks.
    pub fn block_index(&self, ptr: NonNull<u8>) -> Option<usize> {
        let offset = self.memory.offset_of(ptr)?;

        (offset % self.block_size == 0).then(|| offset / self.block_size)
    }

    /// Takes a block from the untouched region.
    pub fn bump_block(&mut self) -> Option<usize> {
        if self.next_free_index == self.capacity {
            return None;
        }

        let index = self.next_free_index;
        self.next_free_index += 1;
        self.free_blocks -= 1;

        Some(index)
    }

    /// Records the block at `index` as given back.
    ///
    /// Fails if `index` is not one of our blocks or if every block of the
    /// chunk has already been given back, both meaning the caller returned a
    /// block it did not own.
    pub fn push_free_block(&mut self, index: usize) -> Result<(), PoolError> {
        if index >= self.capacity {
            return Err(PoolError::InvalidDeallocation {
                addr: (self.memory.start().as_ptr() as usize)
                    .wrapping_add(index.wrapping_mul(self.block_size)),
                block_size: self.block_size,
            });
        }

        self.free_list.push(index)?;
        self.free_blocks += 1;
        debug_assert_eq!(self.free_blocks, self.untouched_blocks() + self.free_list.len());

        Ok(())
    }

    /// Takes the block that has been in the free list the longest.
    pub fn pop_free_block(&mut self) -> Result<usize, PoolError> {
        let index = self.free_list.pop().ok_or(PoolError::FreeListEmpty)?;
        self.free_blocks -= 1;
        debug_assert_eq!(self.free_blocks, self.untouched_blocks() + self.free_list.len());

        Ok(index)
    }
}
