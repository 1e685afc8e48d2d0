//! Pool configuration.

use crate::utils::next_power_of_two;

/// Options recognised by [`crate::Pool::new`].
///
/// Every value is normalised before the pool uses it, see
/// [`PoolOptions::normalized`]. The defaults give size classes from 8 bytes
/// up to 64 KiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    /// Smallest block size served. Rounded up to a power of two.
    pub minimal_supported_block_size: usize,
    /// Largest block size served. Rounded up to a power of two.
    pub largest_required_block_size: usize,
    /// Initial block count of the smallest size class. Every following class
    /// starts with half the blocks of the previous one.
    pub required_capacity_for_smallest_sub_pool: usize,
    /// Floor on the initial block count of every size class.
    pub minimal_required_capacity: usize,
}

pub(crate) const DEFAULT_MINIMAL_REQUIRED_CAPACITY: usize = 8;

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            minimal_supported_block_size: 8,
            largest_required_block_size: 65536,
            required_capacity_for_smallest_sub_pool: 512,
            minimal_required_capacity: DEFAULT_MINIMAL_REQUIRED_CAPACITY,
        }
    }
}

impl PoolOptions {
    pub fn with_minimal_supported_block_size(mut self, size: usize) -> Self {
        self.minimal_supported_block_size = size;
        self
    }

    pub fn with_largest_required_block_size(mut self, size: usize) -> Self {
        self.largest_required_block_size = size;
        self
    }

    pub fn with_required_capacity_for_smallest_sub_pool(mut self, capacity: usize) -> Self {
        self.required_capacity_for_smallest_sub_pool = capacity;
        self
    }

    pub fn with_minimal_required_capacity(mut self, capacity: usize) -> Self {
        self.minimal_required_capacity = capacity;
        self
    }

    /// Returns a copy where:
    ///
    /// - both block size bounds are rounded up to the next power of two, and
    ///   the largest one is never below the smallest one;
    /// - a zero `minimal_required_capacity` falls back to 8;
    /// - `required_capacity_for_smallest_sub_pool` is at least twice
    ///   `minimal_required_capacity`.
    pub fn normalized(self) -> Self {
        let minimal_supported_block_size = next_power_of_two(self.minimal_supported_block_size);
        let largest_required_block_size =
            next_power_of_two(self.largest_required_block_size).max(minimal_supported_block_size);

        let minimal_required_capacity = match self.minimal_required_capacity {
            0 => DEFAULT_MINIMAL_REQUIRED_CAPACITY,
            capacity => capacity,
        };
        let required_capacity_for_smallest_sub_pool = self
            .required_capacity_for_smallest_sub_pool
            .max(minimal_required_capacity.saturating_mul(2));

        Self {
            minimal_supported_block_size,
            largest_required_block_size,
            required_capacity_for_smallest_sub_pool,
            minimal_required_capacity,
        }
    }

    /// Number of size classes these options describe once normalised.
    pub fn size_class_count(&self) -> usize {
        let options = self.normalized();
        let ratio = options.largest_required_block_size / options.minimal_supported_block_size;

        ratio.trailing_zeros() as usize + 1
    }

    /// Initial block count of the size class at `index` (0 is the smallest).
    pub fn initial_capacity(&self, index: usize) -> usize {
        let options = self.normalized();
        let halved = options
            .required_capacity_for_smallest_sub_pool
            .checked_shr(index as u32)
            .unwrap_or(0);

        halved.max(options.minimal_required_capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_already_normalized() {
        let options = PoolOptions::default();

        assert_eq!(options, options.normalized());
        assert_eq!(14, options.size_class_count());
    }

    #[test]
    fn block_sizes_round_up_to_powers_of_two() {
        let options = PoolOptions::default()
            .with_minimal_supported_block_size(5)
            .with_largest_required_block_size(1000)
            .normalized();

        assert_eq!(8, options.minimal_supported_block_size);
        assert_eq!(1024, options.largest_required_block_size);
    }

    #[test]
    fn largest_never_below_smallest() {
        let options = PoolOptions::default()
            .with_minimal_supported_block_size(64)
            .with_largest_required_block_size(16)
            .normalized();

        assert_eq!(64, options.largest_required_block_size);
        assert_eq!(1, options.size_class_count());
    }

    #[test]
    fn capacities_are_floored() {
        let options = PoolOptions::default()
            .with_minimal_required_capacity(0)
            .with_required_capacity_for_smallest_sub_pool(3)
            .normalized();

        assert_eq!(8, options.minimal_required_capacity);
        assert_eq!(16, options.required_capacity_for_smallest_sub_pool);
    }

    #[test]
    fn initial_capacity_halves_down_to_the_floor() {
        let options = PoolOptions::default();
        let capacities: Vec<usize> = (0..options.size_class_count())
            .map(|index| options.initial_capacity(index))
            .collect();

        assert_eq!(
            vec![512, 256, 128, 64, 32, 16, 8, 8, 8, 8, 8, 8, 8, 8],
            capacities
        );
    }

    #[test]
    fn small_scenario() {
        let options = PoolOptions {
            minimal_supported_block_size: 8,
            largest_required_block_size: 64,
            required_capacity_for_smallest_sub_pool: 4,
            minimal_required_capacity: 2,
        };

        assert_eq!(options, options.normalized());
        assert_eq!(4, options.size_class_count());
        assert_eq!(4, options.initial_capacity(0));
        assert_eq!(2, options.initial_capacity(1));
        assert_eq!(2, options.initial_capacity(3));
    }
}
