//! Size classes for the buddy arena.
//!
//! Order `k` covers blocks of `BASE_BLOCK * 2^k` bytes, including the logical
//! header every block accounts for (see [`METADATA_SIZE`]). Order 0 is the
//! smallest class (128 bytes); order [`MAX_ORDER`] is the largest (128 KiB),
//! and [`NUM_BLOCKS`] of those tile the 4 MiB arena.

/// Size, in bytes, of the smallest (order 0) block, including its header.
pub const BASE_BLOCK: usize = 128;

/// Highest order the buddy arena manages. Requests needing more than this
/// bypass the arena entirely and go to the direct-mapped path.
pub const MAX_ORDER: usize = 10;

/// Number of order-[`MAX_ORDER`] regions the arena is built from.
pub const NUM_BLOCKS: usize = 32;

/// Total size of the arena: `NUM_BLOCKS` blocks of `size_for_order(MAX_ORDER)` each.
pub const ARENA_SIZE: usize = NUM_BLOCKS * size_for_order(MAX_ORDER);

/// Largest payload this allocator will accept in a single request.
pub const MAX_MEM: usize = 100_000_000;

/// Allocations at or above this size attempt a huge-page-backed mapping
/// before falling back to a normal anonymous mapping.
pub const HUGEPAGE_THRESHOLD: usize = 4 * 1024 * 1024;

/// Sentinel order for a block table slot that isn't currently in use.
pub const ORDER_NOT_BUDDY: u8 = 0xFF;

/// Logical size, in bytes, every block reserves for its header.
///
/// This crate stores block metadata out-of-band in a flat table rather than
/// embedding it in the arena bytes (see the crate docs), but every payload
/// and statistics calculation treats each block as if this many bytes were
/// spent on a header, exactly as the contract requires. The value is derived
/// from a record with the fields such a header would need, rather than a
/// magic number, so it moves if the fields ever do.
pub const METADATA_SIZE: usize = size_of::<RawHeaderLayout>();

#[repr(C)]
struct RawHeaderLayout {
    block_size: usize,
    payload_size: usize,
    is_free: bool,
    order: u8,
    prev: u32,
    next: u32,
}

/// Total size in bytes (including header) of a block at the given order.
#[inline]
pub const fn size_for_order(order: usize) -> usize {
    BASE_BLOCK << order
}

/// Usable payload bytes in a block at the given order.
#[inline]
pub const fn payload_for_order(order: usize) -> usize {
    size_for_order(order) - METADATA_SIZE
}

/// Smallest order whose block can hold `total_size` bytes (header included).
///
/// Returns `None` if no arena order is big enough; the caller should then
/// dispatch to the direct-mapped path.
#[inline]
pub fn order_for_total_size(total_size: usize) -> Option<usize> {
    for order in 0..=MAX_ORDER {
        if size_for_order(order) >= total_size {
            return Some(order);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_sizes() {
        assert_eq!(size_for_order(0), 128);
        assert_eq!(size_for_order(1), 256);
        assert_eq!(size_for_order(MAX_ORDER), 128 * 1024);
    }

    #[test]
    fn arena_is_four_mebibytes() {
        assert_eq!(ARENA_SIZE, 4 * 1024 * 1024);
    }

    #[test]
    fn order_selection_picks_smallest_fit() {
        assert_eq!(order_for_total_size(1), Some(0));
        assert_eq!(order_for_total_size(128), Some(0));
        assert_eq!(order_for_total_size(129), Some(1));
        assert_eq!(order_for_total_size(size_for_order(MAX_ORDER)), Some(MAX_ORDER));
    }

    #[test]
    fn order_selection_overflows_past_max_order() {
        assert_eq!(order_for_total_size(size_for_order(MAX_ORDER) + 1), None);
    }

    #[test]
    fn payload_accounts_for_header() {
        assert_eq!(payload_for_order(0), BASE_BLOCK - METADATA_SIZE);
    }
}
