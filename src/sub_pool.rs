use std::ptr::NonNull;

use crate::{
    chunk::Chunk,
    error::PoolError,
    pool::{ChunkStats, SubPoolStats},
};

/// All the chunks serving one size class.
///
/// Chunks are kept in creation order. A new chunk is only created when no
/// chunk has a free block left, and it is always twice as big as the last one,
/// so the sequence is sorted by capacity:
///
/// ```text
/// +---------+    +-----------+    +---------------+
/// | Chunk 4 | -> |  Chunk 8  | -> |   Chunk 16    |
/// +---------+    +-----------+    +---------------+
/// ```
///
/// Whenever a chunk runs out of live blocks while a bigger one exists, it is
/// returned to the kernel. The last (biggest) chunk is never reclaimed.
pub(crate) struct SubPool {
    block_size: usize,
    chunks: Vec<Chunk>,
    /// Sum of `free_blocks` over every chunk.
    total_free_blocks: usize,
    growth_events: usize,
    reclaimed_chunks: usize,
}

impl SubPool {
    /// Creates the size class with a single chunk of `capacity` blocks.
    pub fn new(block_size: usize, capacity: usize) -> Result<Self, PoolError> {
        let chunk = Chunk::new(block_size, capacity)?;

        Ok(Self {
            block_size,
            chunks: vec![chunk],
            total_free_blocks: capacity,
            growth_events: 0,
            reclaimed_chunks: 0,
        })
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Hands out one block whose address is a multiple of `alignment`.
    ///
    /// The first chunk (oldest, smallest) with any free block serves the
    /// request, reusing its freed blocks before touching new ones.
    pub fn allocate(&mut self, alignment: usize) -> Result<NonNull<u8>, PoolError> {
        if self.total_free_blocks == 0 {
            self.grow()?;
        }

        let served = self.chunks.iter_mut().find_map(|chunk| {
            let index = if chunk.has_freelist_blocks() {
                chunk.pop_free_block().ok()
            } else {
                chunk.bump_block()
            }?;

            Some(chunk.block_ptr(index))
        });

        let Some(block) = served else {
            tracing::error!(
                block_size = self.block_size,
                total_free_blocks = self.total_free_blocks,
                "free block count out of sync with chunks"
            );
            debug_assert!(false, "sub-pool has free blocks but no chunk can serve one");

            return Err(PoolError::InvariantViolation {
                block_size: self.block_size,
                total_free_blocks: self.total_free_blocks,
            });
        };

        self.total_free_blocks -= 1;
        debug_assert_eq!(0, block.as_ptr() as usize % alignment);

        Ok(block)
    }

    /// Takes back the block starting at `ptr`.
    ///
    /// If this was the last live block of a chunk and a bigger chunk exists,
    /// the whole chunk goes back to the kernel instead.
    pub fn deallocate(&mut self, ptr: NonNull<u8>) -> Result<(), PoolError> {
        let owner = self
            .chunks
            .iter()
            .enumerate()
            .find_map(|(position, chunk)| Some((position, chunk.block_index(ptr)?)));

        let Some((position, index)) = owner else {
            // Logged and refused, never asserted: a foreign pointer leaves the
            // size class untouched in debug and release builds alike.
            tracing::error!(
                addr = ptr.as_ptr() as usize,
                block_size = self.block_size,
                "deallocating a block this size class never handed out"
            );

            return Err(PoolError::InvalidDeallocation {
                addr: ptr.as_ptr() as usize,
                block_size: self.block_size,
            });
        };

        let chunk = &self.chunks[position];
        let larger_exists = self.chunks[position + 1..]
            .iter()
            .any(|later| later.capacity() > chunk.capacity());

        if chunk.is_last_live_block() && larger_exists {
            let chunk = self.chunks.remove(position);
            self.total_free_blocks = self.total_free_blocks + 1 - chunk.capacity();
            self.reclaimed_chunks += 1;

            tracing::debug!(
                block_size = self.block_size,
                capacity = chunk.capacity(),
                chunks = self.chunks.len(),
                "reclaimed empty chunk"
            );

            return Ok(());
        }

        if let Err(err) = self.chunks[position].push_free_block(index) {
            tracing::warn!(
                addr = ptr.as_ptr() as usize,
                block_size = self.block_size,
                %err,
                "block returned more times than it was handed out"
            );

            return Err(err);
        }
        self.total_free_blocks += 1;

        Ok(())
    }

    /// Appends a chunk twice as big as the last one.
    fn grow(&mut self) -> Result<(), PoolError> {
        let last_capacity = self.chunks.last().map_or(0, Chunk::capacity);
        let capacity = last_capacity
            .checked_mul(2)
            .ok_or(PoolError::CapacityOverflow)?;

        self.chunks.push(Chunk::new(self.block_size, capacity)?);
        self.total_free_blocks += capacity;
        self.growth_events += 1;

        tracing::debug!(
            block_size = self.block_size,
            capacity,
            chunks = self.chunks.len(),
            "grew sub-pool"
        );

        Ok(())
    }

    pub fn stats(&self) -> SubPoolStats {
        SubPoolStats {
            block_size: self.block_size,
            total_free_blocks: self.total_free_blocks,
            chunks: self
                .chunks
                .iter()
                .map(|chunk| ChunkStats {
                    capacity: chunk.capacity(),
                    free_blocks: chunk.free_blocks(),
                    untouched_blocks: chunk.untouched_blocks(),
                })
                .collect(),
            growth_events: self.growth_events,
            reclaimed_chunks: self.reclaimed_chunks,
        }
    }
}
