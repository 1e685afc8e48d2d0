//! Property tests for pool bookkeeping.
//!
//! After any sequence of allocations and deallocations every size class keeps
//! its free block count in sync with its chunks, live blocks never overlap and
//! chunk capacities keep doubling.

use std::{cell::RefCell, ptr::NonNull};

use poolalloc::{LocalPool, Pool, PoolAllocator, PoolError, PoolOptions, PoolStats, Route};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn small_options() -> PoolOptions {
    PoolOptions {
        minimal_supported_block_size: 8,
        largest_required_block_size: 64,
        required_capacity_for_smallest_sub_pool: 4,
        minimal_required_capacity: 2,
    }
}

fn assert_bookkeeping(stats: &PoolStats, options: &PoolOptions) {
    for (index, sub_pool) in stats.sub_pools.iter().enumerate() {
        let sum: usize = sub_pool.chunks.iter().map(|chunk| chunk.free_blocks).sum();
        assert_eq!(sub_pool.total_free_blocks, sum, "{} byte class", sub_pool.block_size);

        // Live chunks are what is left of a doubling sequence.
        let initial = options.initial_capacity(index);
        for chunk in &sub_pool.chunks {
            assert_eq!(0, chunk.capacity % initial);
            assert!((chunk.capacity / initial).is_power_of_two());
            assert!(chunk.free_blocks <= chunk.capacity);
        }
        assert!(
            sub_pool
                .chunks
                .windows(2)
                .all(|pair| pair[0].capacity < pair[1].capacity)
        );
    }
}

struct Live {
    block: NonNull<u8>,
    size: usize,
    alignment: usize,
    pattern: u8,
}

// ---------------------------------------------------------------------------
// Property: every in-range request is served and aligned
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn in_range_requests_are_served_aligned(size in 1usize..=65536, shift in 0u32..17) {
        let alignment = 1usize << shift;
        prop_assume!(alignment <= size);

        let mut pool = Pool::new(PoolOptions::default()).unwrap();
        let block = pool.allocate(size, alignment).unwrap();

        prop_assert_eq!(0, block.as_ptr() as usize % alignment);
        unsafe { pool.deallocate(block, size, alignment).unwrap() };
    }
}

// ---------------------------------------------------------------------------
// Property: bookkeeping survives arbitrary alloc / free interleavings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Op {
    Allocate { size: usize, shift: u32 },
    Free { pick: usize },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1usize..=64, 0u32..4).prop_map(|(size, shift)| Op::Allocate { size, shift }),
        2 => any::<usize>().prop_map(|pick| Op::Free { pick }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn bookkeeping_holds_for_any_interleaving(ops in prop::collection::vec(op(), 1..300)) {
        let options = small_options();
        let mut pool = Pool::new(options).unwrap();
        let mut live: Vec<Live> = Vec::new();

        for (step, op) in ops.into_iter().enumerate() {
            match op {
                Op::Allocate { size, shift } => {
                    let alignment = (1usize << shift).min(size.next_power_of_two());
                    let block = pool.allocate(size, alignment).unwrap();
                    prop_assert_eq!(0, block.as_ptr() as usize % alignment);

                    let pattern = step as u8;
                    unsafe { block.as_ptr().write_bytes(pattern, size) };
                    live.push(Live { block, size, alignment, pattern });
                }
                Op::Free { pick } => {
                    if live.is_empty() {
                        continue;
                    }
                    let entry = live.swap_remove(pick % live.len());
                    unsafe { pool.deallocate(entry.block, entry.size, entry.alignment).unwrap() };
                }
            }

            assert_bookkeeping(&pool.stats(), &options);
        }

        // Nobody scribbled over anybody else.
        for entry in &live {
            let bytes = unsafe { std::slice::from_raw_parts(entry.block.as_ptr(), entry.size) };
            prop_assert!(bytes.iter().all(|&byte| byte == entry.pattern));
        }

        let stats = pool.stats();
        let live_blocks: usize = stats
            .sub_pools
            .iter()
            .map(|sub_pool| sub_pool.live_blocks())
            .sum();
        prop_assert_eq!(live.len(), live_blocks);
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn small_pool_scenario() {
    let mut pool = Pool::new(small_options()).unwrap();

    assert_eq!(vec![8, 16, 32, 64], pool.size_classes().collect::<Vec<_>>());

    let block = pool.allocate(10, 8).unwrap();
    assert_eq!(0, block.as_ptr() as usize % 8);
    assert_eq!(1, pool.stats().sub_pool(16).unwrap().live_blocks());

    assert_eq!(
        Err(PoolError::InvalidSizeClass { size: 100, alignment: 8 }),
        pool.allocate(100, 8)
    );

    unsafe { pool.deallocate(block, 10, 8).unwrap() };
}

/// Growth events needed before `live` blocks fit when a class starts with
/// `initial` blocks and every new chunk doubles the last one.
fn expected_growth(initial: usize, live: usize) -> usize {
    let mut total = initial;
    let mut last = initial;
    let mut growth = 0;

    while total < live {
        last *= 2;
        total += last;
        growth += 1;
    }

    growth
}

#[test]
fn growth_follows_doubling_and_settles() {
    for live in [5, 12, 13, 100, 1000] {
        let mut pool = Pool::new(small_options()).unwrap();

        let blocks: Vec<_> = (0..live).map(|_| pool.allocate(8, 8).unwrap()).collect();
        let stats = pool.stats();
        let class = stats.sub_pool(8).unwrap();
        assert_eq!(expected_growth(4, live), class.growth_events, "{live} live blocks");

        for (position, chunk) in class.chunks.iter().enumerate() {
            assert_eq!(4 << position, chunk.capacity);
        }

        for block in blocks {
            unsafe { pool.deallocate(block, 8, 8).unwrap() };
        }
        assert_eq!(1, pool.stats().sub_pool(8).unwrap().chunks.len());

        // Drain and refill until the single remaining chunk holds everything.
        for _ in 0..16 {
            let blocks: Vec<_> = (0..live).map(|_| pool.allocate(8, 8).unwrap()).collect();
            for block in blocks {
                unsafe { pool.deallocate(block, 8, 8).unwrap() };
            }
        }

        let settled = pool.stats().sub_pool(8).unwrap().growth_events;
        assert_eq!((live as f64 / 4.0).log2().ceil() as usize, settled, "{live} live blocks");

        let blocks: Vec<_> = (0..live).map(|_| pool.allocate(8, 8).unwrap()).collect();
        for block in blocks {
            unsafe { pool.deallocate(block, 8, 8).unwrap() };
        }

        let stats = pool.stats();
        let class = stats.sub_pool(8).unwrap();
        assert_eq!(settled, class.growth_events);
        assert_eq!(1, class.chunks.len());
        assert!(class.capacity() >= live);
    }
}

#[test]
fn emptied_smaller_chunk_is_reclaimed_but_largest_is_kept() {
    let mut pool = Pool::new(small_options()).unwrap();

    let first: Vec<_> = (0..4).map(|_| pool.allocate(8, 8).unwrap()).collect();
    let overflow = pool.allocate(8, 8).unwrap();
    assert_eq!(2, pool.stats().sub_pool(8).unwrap().chunks.len());

    for block in first {
        unsafe { pool.deallocate(block, 8, 8).unwrap() };
    }
    let stats = pool.stats();
    let class = stats.sub_pool(8).unwrap();
    assert_eq!(1, class.chunks.len());
    assert_eq!(1, class.reclaimed_chunks);

    unsafe { pool.deallocate(overflow, 8, 8).unwrap() };
    let stats = pool.stats();
    let class = stats.sub_pool(8).unwrap();
    assert_eq!(1, class.chunks.len());
    assert_eq!(8, class.total_free_blocks);
}

#[test]
fn adapter_oversized_round_trip_leaves_no_record() {
    let pool: LocalPool = RefCell::new(Pool::new(small_options()).unwrap());
    let allocator = PoolAllocator::<[u8; 48], _>::with_pool(&pool);

    assert_eq!(Ok(Route::Pooled), allocator.route(1));
    assert_eq!(Ok(Route::Fallback), allocator.route(2));

    let small = allocator.allocate(1).unwrap();
    let big = allocator.allocate(3).unwrap();
    assert_eq!(1, allocator.oversized_count());

    unsafe {
        allocator.deallocate(big, 3);
        allocator.deallocate(small, 1);
    }

    assert_eq!(0, allocator.oversized_count());
    let live: usize = pool
        .borrow()
        .stats()
        .sub_pools
        .iter()
        .map(|sub_pool| sub_pool.live_blocks())
        .sum();
    assert_eq!(0, live);
}
