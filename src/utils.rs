//! Helper functions shared by the pool layers.
//! These don't particularly belong to any concrete module of the allocator.


/// It aligns `to_be_aligned` using `aligment`, which has to be a power of two.
///
/// Used to round mapping lengths up to a multiple of [`crate::kernel::page_size`]
/// and to move the start of a chunk up to a multiple of its block size.
#[inline]
pub(crate) fn align(to_be_aligned: usize, aligment: usize) -> usize {
    (to_be_aligned + aligment - 1) & !(aligment - 1)
}

/// Same as [`align`] but returns `None` instead of wrapping around.
#[inline]
pub(crate) fn checked_align(to_be_aligned: usize, aligment: usize) -> Option<usize> {
    Some(to_be_aligned.checked_add(aligment - 1)? & !(aligment - 1))
}

#[inline]
pub(crate) fn is_power_of_two(value: usize) -> bool {
    value != 0 && value & (value - 1) == 0
}

/// Smallest power of two greater or equal than `value`. Zero maps to one.
///
/// Saturates to the largest representable power of two instead of overflowing.
#[inline]
pub(crate) fn next_power_of_two(value: usize) -> usize {
    value
        .checked_next_power_of_two()
        .unwrap_or(1 << (usize::BITS - 1))
}
