//! Shared access to a [`Pool`].
//!
//! [`Pool`] itself is a single-owner value. Allocator adapters need to share
//! one, so they go through a [`PoolHandle`] instead:
//!
//! - [`LocalPool`] shares a pool inside one thread without any locking. This
//!   is the way to give a subsystem its own dedicated pool.
//! - [`SharedPool`] guards a pool with a lock, one lock per pool. The
//!   process-wide [`default_pool`] is one of these, since anything stored in a
//!   `static` must be shareable between threads.

use std::{
    alloc::{Layout, handle_alloc_error},
    cell::RefCell,
    ptr::NonNull,
    sync::OnceLock,
};

use parking_lot::Mutex;

use crate::{config::PoolOptions, error::PoolError, pool::Pool};

/// A pool shared inside a single thread. Not `Sync`.
pub type LocalPool = RefCell<Pool>;

/// A pool shared between threads behind a lock.
pub type SharedPool = Mutex<Pool>;

static DEFAULT_POOL: OnceLock<SharedPool> = OnceLock::new();

/// Something an allocator adapter can borrow a [`Pool`] through.
pub trait PoolHandle {
    /// See [`Pool::allocate`].
    fn allocate(&self, size: usize, alignment: usize) -> Result<NonNull<u8>, PoolError>;

    /// See [`Pool::deallocate`].
    ///
    /// # Safety
    ///
    /// Same contract as [`Pool::deallocate`].
    unsafe fn deallocate(
        &self,
        ptr: NonNull<u8>,
        size: usize,
        alignment: usize,
    ) -> Result<(), PoolError>;

    fn largest_supported_block_size(&self) -> usize;
}

impl PoolHandle for LocalPool {
    fn allocate(&self, size: usize, alignment: usize) -> Result<NonNull<u8>, PoolError> {
        self.borrow_mut().allocate(size, alignment)
    }

    unsafe fn deallocate(
        &self,
        ptr: NonNull<u8>,
        size: usize,
        alignment: usize,
    ) -> Result<(), PoolError> {
        unsafe { self.borrow_mut().deallocate(ptr, size, alignment) }
    }

    fn largest_supported_block_size(&self) -> usize {
        self.borrow().largest_supported_block_size()
    }
}

impl PoolHandle for SharedPool {
    fn allocate(&self, size: usize, alignment: usize) -> Result<NonNull<u8>, PoolError> {
        self.lock().allocate(size, alignment)
    }

    unsafe fn deallocate(
        &self,
        ptr: NonNull<u8>,
        size: usize,
        alignment: usize,
    ) -> Result<(), PoolError> {
        unsafe { self.lock().deallocate(ptr, size, alignment) }
    }

    fn largest_supported_block_size(&self) -> usize {
        self.lock().largest_supported_block_size()
    }
}

/// Process-wide pool built with [`PoolOptions::default`] on first use.
///
/// If the kernel cannot map the initial chunks this reports the failure
/// through [`handle_alloc_error`], like any other allocation failure.
pub fn default_pool() -> &'static SharedPool {
    DEFAULT_POOL.get_or_init(|| match Pool::new(PoolOptions::default()) {
        Ok(pool) => Mutex::new(pool),
        Err(err) => {
            tracing::error!(%err, "unable to build the default pool");
            handle_alloc_error(err.layout().unwrap_or(Layout::new::<u8>()))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pool_is_built_once() {
        let first = default_pool();
        let second = default_pool();

        assert!(std::ptr::eq(first, second));
        assert_eq!(65536, first.largest_supported_block_size());
    }

    #[test]
    fn default_pool_serves_any_thread() {
        let threads: Vec<_> = (0..4)
            .map(|_| {
                std::thread::spawn(|| {
                    for _ in 0..100 {
                        let block = default_pool().allocate(24, 8).unwrap();
                        unsafe { default_pool().deallocate(block, 24, 8).unwrap() };
                    }
                })
            })
            .collect();

        for thread in threads {
            thread.join().unwrap();
        }
    }

    #[test]
    fn local_pool_round_trip() {
        let pool: LocalPool = RefCell::new(Pool::new(PoolOptions::default()).unwrap());

        let block = pool.allocate(100, 4).unwrap();
        assert_eq!(1, pool.borrow().stats().sub_pool(128).unwrap().live_blocks());

        unsafe { pool.deallocate(block, 100, 4).unwrap() };
        assert_eq!(0, pool.borrow().stats().sub_pool(128).unwrap().live_blocks());
    }
}
