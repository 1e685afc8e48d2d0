use std::ptr::NonNull;

use crate::{config::PoolOptions, error::PoolError, sub_pool::SubPool, utils::is_power_of_two};

/// Size-classed pool of fixed-size blocks.
///
/// A pool owns one size class per power of two between
/// [`PoolOptions::minimal_supported_block_size`] and
/// [`PoolOptions::largest_required_block_size`]. A request is served by the
/// smallest class that fits both its size and its alignment:
///
/// ```text
///   allocate(10, 8)
///         |
///         v
/// +-------+-------+-------+-------+
/// |   8   |  16   |  32   |  64   |   size classes
/// +-------+---|---+-------+-------+
///             |
///             v
///       +---------+    +-----------+
///       | Chunk   | -> |  Chunk    |  ...
///       +---------+    +-----------+
/// ```
///
/// Size classes are fixed once the pool is built. Every class starts with one
/// chunk and grows on demand.
///
/// A pool is not synchronised. Its methods take `&mut self`; share it through
/// a [`crate::LocalPool`] or a [`crate::SharedPool`].
pub struct Pool {
    options: PoolOptions,
    sub_pools: Vec<SubPool>,
}

impl Pool {
    /// Builds every size class eagerly, each with its initial chunk.
    ///
    /// `options` are normalised first, see [`PoolOptions::normalized`].
    pub fn new(options: PoolOptions) -> Result<Self, PoolError> {
        let options = options.normalized();

        let sub_pools = (0..options.size_class_count())
            .map(|index| {
                SubPool::new(
                    options.minimal_supported_block_size << index,
                    options.initial_capacity(index),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { options, sub_pools })
    }

    /// Hands out a block of at least `size` bytes aligned to `alignment`.
    ///
    /// Fails for zero-sized requests, for sizes above
    /// [`Pool::largest_supported_block_size`] and for alignments no size class
    /// can honour.
    pub fn allocate(&mut self, size: usize, alignment: usize) -> Result<NonNull<u8>, PoolError> {
        let index = self.find_pool(size, alignment)?;

        self.sub_pools[index].allocate(alignment)
    }

    /// Gives back a block obtained from [`Pool::allocate`].
    ///
    /// On `Err` nothing changed: the block is leaked rather than risking the
    /// bookkeeping of the pool.
    ///
    /// # Safety
    ///
    /// `size` and `alignment` must be exactly the values `ptr` was allocated
    /// with, and `ptr` must not be used after this call. Giving back a block
    /// that is not currently live lets the pool hand it out twice.
    pub unsafe fn deallocate(
        &mut self,
        ptr: NonNull<u8>,
        size: usize,
        alignment: usize,
    ) -> Result<(), PoolError> {
        let index = self.find_pool(size, alignment).inspect_err(|err| {
            tracing::error!(
                addr = ptr.as_ptr() as usize,
                size,
                alignment,
                %err,
                "deallocation has no size class"
            );
        })?;

        self.sub_pools[index].deallocate(ptr)
    }

    #[inline]
    pub fn largest_supported_block_size(&self) -> usize {
        self.options.largest_required_block_size
    }

    /// Normalised options the pool was built with.
    pub fn options(&self) -> &PoolOptions {
        &self.options
    }

    /// Block sizes of every size class, smallest first.
    pub fn size_classes(&self) -> impl Iterator<Item = usize> + '_ {
        self.sub_pools.iter().map(SubPool::block_size)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            sub_pools: self.sub_pools.iter().map(SubPool::stats).collect(),
        }
    }

    /// Index of the smallest size class whose block size is at least `bytes`,
    /// at least `alignment` and a multiple of `alignment`.
    fn find_pool(&self, bytes: usize, alignment: usize) -> Result<usize, PoolError> {
        if !is_power_of_two(alignment) {
            return Err(PoolError::InvalidAlignment { alignment });
        }

        let no_class = PoolError::InvalidSizeClass {
            size: bytes,
            alignment,
        };

        if bytes == 0 || bytes > self.largest_supported_block_size() {
            return Err(no_class);
        }

        self.sub_pools
            .iter()
            .position(|sub_pool| {
                let block_size = sub_pool.block_size();
                block_size >= bytes && block_size >= alignment && block_size % alignment == 0
            })
            .ok_or(no_class)
    }
}

/// Snapshot of a [`Pool`] returned by [`Pool::stats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// One entry per size class, smallest first.
    pub sub_pools: Vec<SubPoolStats>,
}

impl PoolStats {
    pub fn sub_pool(&self, block_size: usize) -> Option<&SubPoolStats> {
        self.sub_pools
            .iter()
            .find(|sub_pool| sub_pool.block_size == block_size)
    }
}

/// Snapshot of one size class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubPoolStats {
    pub block_size: usize,
    /// Free block count tracked by the size class. Always equals the sum of
    /// the chunks' `free_blocks`.
    pub total_free_blocks: usize,
    /// Live chunks in creation order.
    pub chunks: Vec<ChunkStats>,
    /// Chunks created after the initial one.
    pub growth_events: usize,
    /// Chunks returned to the kernel.
    pub reclaimed_chunks: usize,
}

impl SubPoolStats {
    pub fn capacity(&self) -> usize {
        self.chunks.iter().map(|chunk| chunk.capacity).sum()
    }

    /// Blocks currently handed out.
    pub fn live_blocks(&self) -> usize {
        self.capacity() - self.total_free_blocks
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkStats {
    pub capacity: usize,
    pub free_blocks: usize,
    /// Blocks never handed out so far.
    pub untouched_blocks: usize,
}
