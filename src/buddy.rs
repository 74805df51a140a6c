//! The buddy engine: order selection, splitting, and coalescing.
//!
//! Grounded on the original allocator's `_get_best_fit_block`/`_div_buddies`
//! (split path) and `_merge_buddies` (coalesce path), adapted to the
//! index-based block table instead of walking arena-embedded list pointers.

use crate::block::{BlockIndex, BlockMeta, BlockTable};
use crate::error::AllocError;
use crate::order::{self, MAX_ORDER};
use crate::order_index::OrderIndex;
use crate::stats::Stats;

/// Finds or creates a free block of exactly `order`, splitting a larger free
/// block down if no exact match is free. Returns [`AllocError::OutOfMemory`]
/// if no free block at `order` or above exists in the arena.
pub fn acquire_free_block(
    table: &mut BlockTable,
    index: &mut OrderIndex,
    stats: &mut Stats,
    order: usize,
) -> Result<BlockIndex, AllocError> {
    let mut found_order = None;
    for candidate in order..=MAX_ORDER {
        if index.free_count(candidate) > 0 {
            found_order = Some(candidate);
            break;
        }
    }
    let mut current_order = found_order.ok_or(AllocError::OutOfMemory)?;
    let mut idx = index.first_free(current_order);

    while current_order > order {
        idx = split(table, index, idx, current_order);
        stats.record_split();
        current_order -= 1;
    }

    index.remove_free(table, order, idx);
    Ok(idx)
}

/// Splits the free block at `idx` (currently at `from_order`) into two
/// buddies at `from_order - 1`, inserting both into the free list and
/// retiring the original record. Returns the index of the lower-address
/// (left) buddy.
fn split(table: &mut BlockTable, index: &mut OrderIndex, idx: BlockIndex, from_order: usize) -> BlockIndex {
    index.remove_free(table, from_order, idx);

    let offset = table.get(idx).offset;
    let new_order = from_order - 1;
    let new_size = order::size_for_order(new_order);
    let new_payload = order::payload_for_order(new_order);

    table.retire(idx);

    let left = table.insert(BlockMeta {
        offset,
        block_size: new_size,
        payload_size: new_payload,
        is_free: true,
        order: new_order as u8,
        prev: BlockIndex::NONE,
        next: BlockIndex::NONE,
    });
    let right = table.insert(BlockMeta {
        offset: offset + new_size,
        block_size: new_size,
        payload_size: new_payload,
        is_free: true,
        order: new_order as u8,
        prev: BlockIndex::NONE,
        next: BlockIndex::NONE,
    });

    index.insert_free(table, new_order, left);
    index.insert_free(table, new_order, right);

    left
}

/// The address a block at `offset`/`order` would have to coalesce with.
#[inline]
pub fn buddy_offset(offset: usize, order: usize) -> usize {
    offset ^ order::size_for_order(order)
}

/// Marks `idx` (currently allocated at `order`) free and coalesces it with
/// its buddy chain as far up as possible, up to [`MAX_ORDER`].
///
/// Returns the index and order of the final, fully-coalesced block.
pub fn release_block(
    table: &mut BlockTable,
    index: &mut OrderIndex,
    stats: &mut Stats,
    idx: BlockIndex,
    order: usize,
) -> (BlockIndex, usize) {
    index.remove_allocated(table, order, idx);
    stats.record_release(order);

    let mut idx = idx;
    let mut order = order;
    table.get_mut(idx).is_free = true;

    while order < MAX_ORDER {
        let offset = table.get(idx).offset;
        let buddy = buddy_offset(offset, order);

        let buddy_idx = find_free_at(table, index, order, buddy);
        let Some(buddy_idx) = buddy_idx else {
            break;
        };

        index.remove_free(table, order, idx);
        index.remove_free(table, order, buddy_idx);

        let merged_offset = offset.min(buddy);
        table.retire(idx);
        table.retire(buddy_idx);

        let new_order = order + 1;
        let merged = table.insert(BlockMeta {
            offset: merged_offset,
            block_size: order::size_for_order(new_order),
            payload_size: order::payload_for_order(new_order),
            is_free: true,
            order: new_order as u8,
            prev: BlockIndex::NONE,
            next: BlockIndex::NONE,
        });
        stats.record_merge();

        idx = merged;
        order = new_order;
    }

    index.insert_free(table, order, idx);
    (idx, order)
}

pub(crate) fn find_free_at(
    table: &BlockTable,
    index: &OrderIndex,
    order: usize,
    offset: usize,
) -> Option<BlockIndex> {
    let list_head = index.first_free(order);
    let mut current = list_head;
    while !current.is_none() {
        if table.get(current).offset == offset {
            return Some(current);
        }
        current = table.get(current).next;
    }
    None
}
