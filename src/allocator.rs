//! Typed allocator adapter over a [`Pool`](crate::Pool).
//!
//! [`PoolAllocator`] is what container code talks to. It never decides where a
//! block comes from implicitly: every request is given a [`Route`] first.
//!
//! ```text
//!                      allocate(n)
//!                           |
//!              n * size_of::<T>() > largest class ?
//!                  /                      \
//!                no                        yes
//!                /                          \
//!      +-------------------+       +------------------+
//!      |  PoolBacked (P)   |       | SystemFallback   | --> oversized set
//!      +-------------------+       +------------------+
//! ```
//!
//! Blocks served by the fallback are remembered so that `deallocate` sends
//! them back to the allocator they came from.

use std::{
    alloc::{GlobalAlloc, Layout, System},
    cell::RefCell,
    collections::HashSet,
    fmt,
    marker::PhantomData,
    mem,
    ptr::{self, NonNull},
    rc::Rc,
};

use crate::{
    error::AllocError,
    handle::{PoolHandle, SharedPool, default_pool},
};

/// The two places a block can come from.
pub trait BlockAllocator {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// # Safety
    ///
    /// `ptr` must come from [`BlockAllocator::allocate`] on this same
    /// allocator with this same `layout`, and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// Serves blocks from a pool through its [`PoolHandle`].
pub struct PoolBacked<'p, P: ?Sized> {
    pool: &'p P,
}

impl<'p, P: ?Sized> PoolBacked<'p, P> {
    pub fn new(pool: &'p P) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &'p P {
        self.pool
    }
}

impl<P: ?Sized> Clone for PoolBacked<'_, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: ?Sized> Copy for PoolBacked<'_, P> {}

impl<P: PoolHandle + ?Sized> BlockAllocator for PoolBacked<'_, P> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        Ok(self.pool.allocate(layout.size(), layout.align())?)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // The pool reports the failure itself, the block is leaked.
        let result = unsafe { self.pool.deallocate(ptr, layout.size(), layout.align()) };
        debug_assert!(result.is_ok(), "pool refused a block handed out through it: {result:?}");
    }
}

/// Serves oversized requests from the platform allocator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemFallback;

impl BlockAllocator for SystemFallback {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        // SAFETY: oversized layouts are never zero-sized.
        let block = unsafe { System.alloc(layout) };

        NonNull::new(block).ok_or(AllocError::Fallback {
            size: layout.size(),
            align: layout.align(),
        })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { System.dealloc(ptr.as_ptr(), layout) }
    }
}

/// Where a request of a given layout is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Pooled,
    Fallback,
}

/// Allocator for values of type `T`, backed by a pool of type `P`.
///
/// Requests up to the largest size class of the pool are served by the pool,
/// bigger ones by `F`. Adapters can be cloned and rebound to other element
/// types; all of those copies share the record of oversized blocks, so a block
/// can be given back through any of them.
///
/// Adapters are neither `Send` nor `Sync`.
pub struct PoolAllocator<'p, T, P: ?Sized = SharedPool, F = SystemFallback> {
    pooled: PoolBacked<'p, P>,
    fallback: F,
    oversized: Rc<RefCell<HashSet<NonNull<u8>>>>,
    marker: PhantomData<fn() -> T>,
}

impl<T> PoolAllocator<'static, T> {
    /// Adapter bound to the process-wide [`default_pool`].
    pub fn new() -> Self {
        Self::with_pool(default_pool())
    }
}

impl<T> Default for PoolAllocator<'static, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'p, T, P: PoolHandle + ?Sized> PoolAllocator<'p, T, P> {
    /// Adapter bound to `pool`, falling back to the system allocator.
    pub fn with_pool(pool: &'p P) -> Self {
        Self::with_fallback(pool, SystemFallback)
    }
}

impl<'p, T, P: PoolHandle + ?Sized, F: BlockAllocator> PoolAllocator<'p, T, P, F> {
    pub fn with_fallback(pool: &'p P, fallback: F) -> Self {
        Self {
            pooled: PoolBacked::new(pool),
            fallback,
            oversized: Rc::default(),
            marker: PhantomData,
        }
    }

    pub fn pool(&self) -> &'p P {
        self.pooled.pool()
    }

    pub fn fallback(&self) -> &F {
        &self.fallback
    }

    /// Layout of a request for `n` values. Zero-sized requests still ask for
    /// `align_of::<T>()` bytes so they get a real, unique block.
    fn layout(n: usize) -> Result<Layout, AllocError> {
        let bytes = mem::size_of::<T>()
            .checked_mul(n)
            .ok_or(AllocError::CapacityOverflow)?;
        let size = if bytes == 0 { mem::align_of::<T>() } else { bytes };

        Layout::from_size_align(size, mem::align_of::<T>())
            .map_err(|_| AllocError::CapacityOverflow)
    }

    /// Route taken by a request for `n` values.
    pub fn route(&self, n: usize) -> Result<Route, AllocError> {
        Ok(self.route_layout(Self::layout(n)?))
    }

    fn route_layout(&self, layout: Layout) -> Route {
        if layout.size() > self.pooled.pool().largest_supported_block_size() {
            Route::Fallback
        } else {
            Route::Pooled
        }
    }

    /// Allocates uninitialised room for `n` values.
    pub fn allocate(&self, n: usize) -> Result<NonNull<T>, AllocError> {
        let layout = Self::layout(n)?;

        let block = match self.route_layout(layout) {
            Route::Pooled => self.pooled.allocate(layout)?,
            Route::Fallback => {
                let block = self.fallback.allocate(layout)?;
                self.oversized.borrow_mut().insert(block);

                tracing::trace!(size = layout.size(), "oversized request served by the fallback");
                block
            }
        };

        Ok(block.cast())
    }

    /// Gives back room for `n` values obtained from [`PoolAllocator::allocate`].
    ///
    /// # Safety
    ///
    /// `p` must come from `allocate(n)` on this adapter or one of its clones
    /// or rebinds (with the same `n` and the same `T`), and must not be used
    /// afterwards. Any value still living there is not dropped.
    pub unsafe fn deallocate(&self, p: NonNull<T>, n: usize) {
        let Ok(layout) = Self::layout(n) else {
            tracing::error!(n, "deallocating a request that could never be allocated");
            return;
        };
        let block = p.cast::<u8>();

        match self.route_layout(layout) {
            Route::Fallback if self.oversized.borrow_mut().remove(&block) => unsafe {
                self.fallback.deallocate(block, layout)
            },
            _ => unsafe { self.pooled.deallocate(block, layout) },
        }
    }

    /// Moves `value` into the uninitialised slot at `p`.
    ///
    /// # Safety
    ///
    /// `p` must be valid for writes and properly aligned.
    pub unsafe fn construct(&self, p: NonNull<T>, value: T) {
        unsafe { p.as_ptr().write(value) }
    }

    /// Drops the value at `p` in place, leaving the slot uninitialised.
    ///
    /// # Safety
    ///
    /// `p` must point to an initialised value that is not used afterwards.
    pub unsafe fn destroy(&self, p: NonNull<T>) {
        unsafe { ptr::drop_in_place(p.as_ptr()) }
    }

    /// Largest `n` that [`PoolAllocator::allocate`] may accept.
    pub fn max_size(&self) -> usize {
        isize::MAX as usize / mem::size_of::<T>().max(1)
    }

    /// Blocks currently served by the fallback allocator.
    pub fn oversized_count(&self) -> usize {
        self.oversized.borrow().len()
    }
}

impl<'p, T, P: ?Sized, F: Clone> PoolAllocator<'p, T, P, F> {
    /// Same adapter for values of type `U`.
    pub fn rebind<U>(&self) -> PoolAllocator<'p, U, P, F> {
        PoolAllocator {
            pooled: self.pooled,
            fallback: self.fallback.clone(),
            oversized: Rc::clone(&self.oversized),
            marker: PhantomData,
        }
    }
}

impl<T, P: ?Sized, F: Clone> Clone for PoolAllocator<'_, T, P, F> {
    fn clone(&self) -> Self {
        self.rebind()
    }
}

/// Two adapters are equal when they use the very same pool and equal
/// fallbacks, whatever their element types.
impl<'p, 'q, T, U, P: ?Sized, F: PartialEq> PartialEq<PoolAllocator<'q, U, P, F>>
    for PoolAllocator<'p, T, P, F>
{
    fn eq(&self, other: &PoolAllocator<'q, U, P, F>) -> bool {
        ptr::eq(self.pooled.pool(), other.pooled.pool()) && self.fallback == other.fallback
    }
}

impl<T, P: ?Sized, F: Eq> Eq for PoolAllocator<'_, T, P, F> {}

impl<T, P: ?Sized, F: fmt::Debug> fmt::Debug for PoolAllocator<'_, T, P, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolAllocator")
            .field("element", &std::any::type_name::<T>())
            .field("pool", &ptr::from_ref(self.pooled.pool()).cast::<()>())
            .field("fallback", &self.fallback)
            .field("oversized", &self.oversized.borrow().len())
            .finish()
    }
}
