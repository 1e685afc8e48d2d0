//! Error types for both layers of the allocator.
//!
//! [`PoolError`] is what the pool itself reports. A failed pool call never
//! changes any bookkeeping, so an `Err` from [`crate::Pool::deallocate`] is a
//! leaked block, never a corrupted one.
//!
//! [`AllocError`] is what [`crate::PoolAllocator`] hands to container code when
//! a request cannot be served by either the pool or the fallback allocator.

use std::alloc::Layout;

use thiserror::Error;

/// Failures reported by [`crate::Pool`] and the structures it owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    /// No size class can hold `size` bytes aligned to `alignment`. Zero-sized
    /// requests land here too.
    #[error("no size class serves {size} bytes aligned to {alignment}")]
    InvalidSizeClass { size: usize, alignment: usize },

    #[error("alignment {alignment} is not a power of two")]
    InvalidAlignment { alignment: usize },

    /// The platform refused to map memory for a new chunk.
    #[error("out of memory while mapping {size} bytes aligned to {align}")]
    OutOfMemory { size: usize, align: usize },

    /// Doubling a chunk capacity (or computing its byte length) overflowed.
    #[error("chunk capacity overflow")]
    CapacityOverflow,

    /// The pointer does not belong to any chunk of the size class implied by
    /// the size and alignment given on deallocation.
    #[error("{addr:#x} was not handed out by the {block_size} byte size class")]
    InvalidDeallocation { addr: usize, block_size: usize },

    /// More blocks were returned to a chunk than it holds.
    #[error("chunk free list is full")]
    FreeListFull,

    #[error("chunk free list is empty")]
    FreeListEmpty,

    /// The sub-pool believes it has free blocks, but no chunk can serve one.
    /// This is a bug in the allocator itself.
    #[error(
        "{block_size} byte size class claims {total_free_blocks} free blocks but none is reachable"
    )]
    InvariantViolation {
        block_size: usize,
        total_free_blocks: usize,
    },
}

impl PoolError {
    /// Layout of the request that made the platform run out of memory, if
    /// this is an [`PoolError::OutOfMemory`].
    ///
    /// Handy to feed [`std::alloc::handle_alloc_error`].
    pub fn layout(&self) -> Option<Layout> {
        match *self {
            PoolError::OutOfMemory { size, align } => Layout::from_size_align(size, align).ok(),
            _ => None,
        }
    }
}

/// Allocation failure propagated by [`crate::PoolAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    /// The backing pool could not serve an in-range request.
    #[error("pool exhausted: {0}")]
    Exhausted(#[from] PoolError),

    /// The fallback allocator refused an oversized request.
    #[error("fallback allocator refused {size} bytes aligned to {align}")]
    Fallback { size: usize, align: usize },

    /// `n * size_of::<T>()` does not fit in a `Layout`.
    #[error("requested element count overflows the address space")]
    CapacityOverflow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_memory_exposes_layout() {
        let err = PoolError::OutOfMemory { size: 8192, align: 4096 };
        let layout = err.layout().expect("valid layout");

        assert_eq!(8192, layout.size());
        assert_eq!(4096, layout.align());
        assert_eq!(None, PoolError::FreeListFull.layout());
    }

    #[test]
    fn pool_errors_convert_into_alloc_errors() {
        let err = PoolError::InvalidSizeClass { size: 100, alignment: 8 };
        let alloc: AllocError = err.into();

        assert_eq!(AllocError::Exhausted(err), alloc);
        assert_eq!(
            "pool exhausted: no size class serves 100 bytes aligned to 8",
            alloc.to_string()
        );
    }
}
