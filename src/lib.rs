//! Size-classed pooling allocator.
//!
//! A [`Pool`] serves fixed-size blocks out of power-of-two size classes. Each
//! size class owns a growing list of chunks, and each chunk is
//! one region mapped straight from the kernel:
//!
//! ```text
//! +--------------------------------------------------------------------------+
//! | Pool                                                                     |
//! |                                                                          |
//! |   8 bytes  | +---------+    +-----------+    +---------------+           |
//! |            | |  Chunk  | -> |   Chunk   | -> |     Chunk     |           |
//! |            | +---------+    +-----------+    +---------------+           |
//! |  16 bytes  | +---------+                                               |
//! |            | |  Chunk  |                                               |
//! |            | +---------+                                               |
//! |    ...     |                                                           |
//! +--------------------------------------------------------------------------+
//! ```
//!
//! Blocks handed out by a chunk are either taken from its untouched tail or
//! recycled from its free list. Chunks double in size as a class grows, and a
//! chunk with no live block left is given back to the kernel as soon as a
//! bigger one exists.
//!
//! On top of the pool, [`PoolAllocator`] gives typed, container-style access
//! and sends requests bigger than the largest size class to the system
//! allocator.
//!
//! # Threads
//!
//! A [`Pool`] is not synchronised. Share it inside one thread through a
//! [`LocalPool`], or between threads through a [`SharedPool`]. The
//! process-wide [`default_pool`] is a [`SharedPool`].
//!
//! # Example
//!
//! ```
//! use poolalloc::{Pool, PoolOptions};
//!
//! let mut pool = Pool::new(PoolOptions::default()).unwrap();
//!
//! let block = pool.allocate(24, 8).unwrap();
//! assert_eq!(0, block.as_ptr() as usize % 8);
//!
//! unsafe { pool.deallocate(block, 24, 8).unwrap() };
//! ```

mod allocator;
mod chunk;
mod config;
mod error;
mod freelist;
mod handle;
mod kernel;
mod pool;
mod region;
mod sub_pool;
mod utils;

pub use allocator::{BlockAllocator, PoolAllocator, PoolBacked, Route, SystemFallback};
pub use config::PoolOptions;
pub use error::{AllocError, PoolError};
pub use handle::{LocalPool, PoolHandle, SharedPool, default_pool};
pub use pool::{ChunkStats, Pool, PoolStats, SubPoolStats};
