use std::cell::RefCell;

use poolalloc::{LocalPool, Pool, PoolAllocator, PoolOptions};

fn log_alloc(addr: *mut u8, size: usize, alignment: usize) {
    println!("Requested {size} bytes aligned to {alignment}");
    println!("Received this address: {addr:?}");
}

fn main() {
    let mut pool = Pool::new(PoolOptions::default()).expect("unable to map the initial chunks");

    let requests = [(8, 8), (10, 8), (100, 16), (4000, 64)];
    let mut blocks = Vec::new();

    for (size, alignment) in requests {
        let block = pool.allocate(size, alignment).expect("in-range request");
        log_alloc(block.as_ptr(), size, alignment);
        blocks.push((block, size, alignment));
    }

    for (block, size, alignment) in blocks {
        unsafe { pool.deallocate(block, size, alignment).expect("block came from this pool") };
    }

    for sub_pool in pool.stats().sub_pools {
        println!(
            "{:>6} byte blocks: {} chunk(s), {} free",
            sub_pool.block_size,
            sub_pool.chunks.len(),
            sub_pool.total_free_blocks
        );
    }

    // A dedicated pool shared by typed adapters.
    let pool: LocalPool = RefCell::new(pool);
    let numbers = PoolAllocator::<u64, _>::with_pool(&pool);

    let small = numbers.allocate(4).expect("served by the pool");
    let large = numbers.allocate(100_000).expect("served by the system allocator");
    println!("Small array at {small:p}, large array at {large:p}");
    println!("Oversized blocks in flight: {}", numbers.oversized_count());

    unsafe {
        numbers.deallocate(small, 4);
        numbers.deallocate(large, 100_000);
    }
}
