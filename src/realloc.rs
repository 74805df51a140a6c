//! In-place expansion for `realloc` on an arena block.
//!
//! The original allocator's `_check_merge`/`_merge_blocks_if_needed` walk the
//! buddy chain with the same XOR test `free` uses, merging mismatched-order
//! neighbors as they go. This engine instead merges one order at a time,
//! buddy only, stopping as soon as either the requested size fits or the
//! next buddy isn't free (see the open question decisions in the crate's
//! design notes for why).

use crate::block::{BlockIndex, BlockMeta, BlockTable};
use crate::buddy::{buddy_offset, find_free_at};
use crate::order::{self, MAX_ORDER};
use crate::order_index::OrderIndex;
use crate::stats::Stats;

/// Attempts to grow the allocated block at `idx`/`order` in place until its
/// payload is at least `needed_payload`, by repeatedly absorbing a free
/// buddy one order at a time.
///
/// Returns the block's (possibly unchanged) index and order. The caller must
/// check whether the resulting payload is sufficient; if not, a relocating
/// realloc (allocate new, copy, free this block) is required.
pub fn try_expand_in_place(
    table: &mut BlockTable,
    index: &mut OrderIndex,
    stats: &mut Stats,
    idx: BlockIndex,
    order: usize,
    needed_payload: usize,
) -> (BlockIndex, usize) {
    let mut idx = idx;
    let mut order = order;

    while order < MAX_ORDER && table.get(idx).payload_size < needed_payload {
        let offset = table.get(idx).offset;
        let buddy = buddy_offset(offset, order);

        let Some(buddy_idx) = find_free_at(table, index, order, buddy) else {
            break;
        };

        index.remove_allocated(table, order, idx);
        index.remove_free(table, order, buddy_idx);

        let merged_offset = offset.min(buddy);
        table.retire(idx);
        table.retire(buddy_idx);

        let new_order = order + 1;
        let merged = table.insert(BlockMeta {
            offset: merged_offset,
            block_size: order::size_for_order(new_order),
            payload_size: order::payload_for_order(new_order),
            is_free: false,
            order: new_order as u8,
            prev: BlockIndex::NONE,
            next: BlockIndex::NONE,
        });
        index.insert_allocated(table, new_order, merged);
        stats.record_expand_merge(order);

        idx = merged;
        order = new_order;
    }

    (idx, order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::backing::Emulated;
    use crate::buddy::acquire_free_block;

    fn setup() -> (BlockTable, OrderIndex, Arena, Stats) {
        let mut backing = Emulated::new();
        let mut table = BlockTable::new();
        let mut index = OrderIndex::new();
        let arena = Arena::init(&mut backing, &mut table, &mut index).unwrap();
        let mut stats = Stats::new();
        stats.seed_arena();
        (table, index, arena, stats)
    }

    #[test]
    fn expands_into_a_free_buddy() {
        let (mut table, mut index, _arena, mut stats) = setup();

        let a = acquire_free_block(&mut table, &mut index, &mut stats, 0).unwrap();
        index.insert_allocated(&mut table, 0, a);
        let needed = order::payload_for_order(1);

        let (idx, order) = try_expand_in_place(&mut table, &mut index, &mut stats, a, 0, needed);

        assert_eq!(order, 1);
        assert!(table.get(idx).payload_size >= needed);
        assert!(!table.get(idx).is_free);
    }

    #[test]
    fn stops_when_buddy_is_not_free() {
        let (mut table, mut index, _arena, mut stats) = setup();

        let a = acquire_free_block(&mut table, &mut index, &mut stats, 0).unwrap();
        index.insert_allocated(&mut table, 0, a);
        let b = acquire_free_block(&mut table, &mut index, &mut stats, 0).unwrap();
        index.insert_allocated(&mut table, 0, b);

        let needed = order::payload_for_order(1);
        let (idx, order) = try_expand_in_place(&mut table, &mut index, &mut stats, a, 0, needed);

        assert_eq!(order, 0, "buddy b is allocated, so a cannot grow");
        assert_eq!(idx, a);
    }

    #[test]
    fn no_op_when_already_big_enough() {
        let (mut table, mut index, _arena, mut stats) = setup();

        let a = acquire_free_block(&mut table, &mut index, &mut stats, 3).unwrap();
        index.insert_allocated(&mut table, 3, a);

        let (idx, order) =
            try_expand_in_place(&mut table, &mut index, &mut stats, a, 3, 1);
        assert_eq!(idx, a);
        assert_eq!(order, 3);
    }
}
