//! Arena initialization and address translation.
//!
//! The arena is a single contiguous region obtained from a [`Backing`] store
//! exactly once, tiled into [`NUM_BLOCKS`] blocks of order [`MAX_ORDER`].
//! Everything else (splitting, coalescing, allocation) operates on
//! [`BlockIndex`]/offset pairs; this module is the only place that knows
//! about the underlying base pointer.

use crate::backing::Backing;
use crate::block::{BlockIndex, BlockMeta, BlockTable};
use crate::error::AllocError;
use crate::order::{self, ARENA_SIZE, MAX_ORDER, NUM_BLOCKS};
use crate::order_index::OrderIndex;

/// The initialized arena: a base pointer plus the block table and order
/// index the engine splits and coalesces over.
pub struct Arena {
    base: *mut u8,
    size: usize,
}

impl Arena {
    /// Extends `backing` by [`ARENA_SIZE`] bytes and populates `table` and
    /// `index` with [`NUM_BLOCKS`] free blocks at order [`MAX_ORDER`].
    ///
    /// Must be called exactly once, before any other arena operation.
    pub fn init(
        backing: &mut dyn Backing,
        table: &mut BlockTable,
        index: &mut OrderIndex,
    ) -> Result<Self, AllocError> {
        let base = backing.extend_arena(ARENA_SIZE)?;
        log::trace!("arena initialized: {} bytes at {:p}", ARENA_SIZE, base);

        let block_size = order::size_for_order(MAX_ORDER);
        let payload_size = order::payload_for_order(MAX_ORDER);

        for slot in 0..NUM_BLOCKS {
            let offset = slot * block_size;
            let idx = table.insert(BlockMeta {
                offset,
                block_size,
                payload_size,
                is_free: true,
                order: MAX_ORDER as u8,
                prev: BlockIndex::NONE,
                next: BlockIndex::NONE,
            });
            index.insert_free(table, MAX_ORDER, idx);
        }

        Ok(Self {
            base,
            size: ARENA_SIZE,
        })
    }

    /// Translates an arena-relative byte offset to a real pointer to the
    /// first byte of that block's payload (i.e. past its logical header).
    #[inline]
    pub fn payload_ptr(&self, offset: usize) -> *mut u8 {
        debug_assert!(offset + order::METADATA_SIZE <= self.size);
        // SAFETY: `offset` is always derived from a `BlockMeta.offset` that
        // was computed from this same arena's base and size.
        unsafe { self.base.add(offset + order::METADATA_SIZE) }
    }

    /// Returns whether `offset` (block start, not payload start) falls
    /// entirely within the arena.
    #[inline]
    pub fn contains(&self, offset: usize, block_size: usize) -> bool {
        offset.checked_add(block_size).is_some_and(|end| end <= self.size)
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::Emulated;

    #[test]
    fn init_populates_num_blocks_free_entries_at_max_order() {
        let mut backing = Emulated::new();
        let mut table = BlockTable::new();
        let mut index = OrderIndex::new();

        let arena = Arena::init(&mut backing, &mut table, &mut index).unwrap();

        assert_eq!(index.free_count(MAX_ORDER), NUM_BLOCKS);
        assert_eq!(arena.size(), ARENA_SIZE);
    }

    #[test]
    fn payload_ptr_skips_the_logical_header() {
        let mut backing = Emulated::new();
        let mut table = BlockTable::new();
        let mut index = OrderIndex::new();
        let arena = Arena::init(&mut backing, &mut table, &mut index).unwrap();

        let base = arena.base;
        let ptr = arena.payload_ptr(0);
        assert_eq!(ptr as usize - base as usize, order::METADATA_SIZE);
    }
}
