//! The allocator's public surface: `allocate`, `allocate_zeroed`, `free`, and
//! `reallocate`, plus the statistics accessors.
//!
//! Grounded on the original allocator's public `smalloc`/`scalloc`/`sfree`/
//! `srealloc` functions, but deliberately not a global singleton: the design
//! notes call for avoiding hidden global state in the engine, so callers own
//! an [`Allocator`] value and decide its lifetime themselves.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::arena::Arena;
use crate::backing::Backing;
use crate::block::{BlockIndex, BlockTable};
use crate::direct::DirectBlocks;
use crate::error::AllocError;
use crate::order::{self, MAX_MEM, METADATA_SIZE};
use crate::order_index::OrderIndex;
use crate::realloc;
use crate::stats::Stats;
use crate::{buddy, backing};

struct State {
    backing: Box<dyn Backing>,
    table: BlockTable,
    index: OrderIndex,
    arena: Option<Arena>,
    direct: DirectBlocks,
    stats: Stats,
    live_arena: HashMap<usize, (BlockIndex, usize)>,
}

impl State {
    fn ensure_arena(&mut self) -> Result<(), AllocError> {
        if self.arena.is_none() {
            let arena = Arena::init(&mut *self.backing, &mut self.table, &mut self.index)?;
            self.arena = Some(arena);
            self.stats.seed_arena();
        }
        Ok(())
    }
}

/// A single-mutator buddy-system heap.
///
/// Not `Sync`: every method takes `&self` (interior mutability via a
/// [`RefCell`]) for convenient use from one thread, but sharing an
/// `Allocator` across threads without external synchronization is a logic
/// error the type does not try to prevent.
pub struct Allocator {
    state: RefCell<State>,
}

impl Allocator {
    /// Creates an allocator backed by the real OS (`sbrk`/`mmap`), or, under
    /// `cfg(test)`/the `software-emulation` feature, an in-process emulated
    /// backing store.
    pub fn new() -> Self {
        #[cfg(any(test, feature = "software-emulation", not(unix)))]
        let backing: Box<dyn Backing> = Box::new(backing::Emulated::new());
        #[cfg(all(unix, not(any(test, feature = "software-emulation"))))]
        let backing: Box<dyn Backing> = Box::new(backing::Hardware::new());

        Self::with_backing(backing)
    }

    /// Creates an allocator over a caller-supplied backing store.
    pub fn with_backing(backing: Box<dyn Backing>) -> Self {
        Self {
            state: RefCell::new(State {
                backing,
                table: BlockTable::new(),
                index: OrderIndex::new(),
                arena: None,
                direct: DirectBlocks::new(),
                stats: Stats::new(),
                live_arena: HashMap::new(),
            }),
        }
    }

    /// Allocates `size` bytes, uninitialized. Requests that fit the arena
    /// are served from the buddy free lists (splitting a larger block if
    /// needed); larger requests go to the direct-mapped path.
    pub fn allocate(&self, size: usize) -> Result<*mut u8, AllocError> {
        if size == 0 || size > MAX_MEM {
            return Err(AllocError::InvalidSize);
        }

        let mut state = self.state.borrow_mut();
        let total = size + METADATA_SIZE;

        match order::order_for_total_size(total) {
            Some(order) => {
                state.ensure_arena()?;
                let idx = buddy::acquire_free_block(&mut state.table, &mut state.index, &mut state.stats, order)?;
                state.index.insert_allocated(&mut state.table, order, idx);
                state.stats.record_allocate(order);

                let offset = state.table.get(idx).offset;
                let ptr = state.arena.as_ref().expect("arena initialized above").payload_ptr(offset);
                state.live_arena.insert(ptr as usize, (idx, order));
                log::trace!("allocated {size} bytes at order {order}: {:p}", ptr);
                Ok(ptr)
            }
            None => {
                let ptr = state.direct.allocate(&mut *state.backing, size)?;
                state.stats.record_direct_allocate(size);
                Ok(ptr)
            }
        }
    }

    /// Allocates `count * size` bytes and zeroes them before returning,
    /// mirroring `calloc`'s two-argument contract.
    pub fn allocate_zeroed(&self, count: usize, size: usize) -> Result<*mut u8, AllocError> {
        let total = count.checked_mul(size).ok_or(AllocError::InvalidSize)?;
        let ptr = self.allocate(total)?;
        // SAFETY: `allocate` always returns a pointer to at least `total`
        // writable bytes when it succeeds.
        unsafe { std::ptr::write_bytes(ptr, 0, total) };
        Ok(ptr)
    }

    /// Frees a block previously returned by `allocate`/`allocate_zeroed`/
    /// `reallocate` on this allocator.
    ///
    /// # Safety
    ///
    /// `ptr` must be exactly such a pointer, not already freed, and not used
    /// again after this call.
    pub unsafe fn free(&self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        let mut state = self.state.borrow_mut();

        if let Some((idx, order)) = state.live_arena.remove(&(ptr as usize)) {
            buddy::release_block(&mut state.table, &mut state.index, &mut state.stats, idx, order);
        } else if state.direct.contains(ptr) {
            let payload = state
                .direct
                .payload_size(ptr)
                .expect("contains() just confirmed this pointer is tracked");
            state.direct.free(&mut *state.backing, ptr);
            state.stats.record_direct_free(payload);
        } else {
            log::error!("free of a pointer this allocator did not hand out");
        }
    }

    /// Resizes the block at `ptr` to `new_size` bytes, preserving the
    /// min(old, new) leading bytes of its contents. May return a different
    /// pointer; the original is invalidated whether or not the address
    /// changed.
    ///
    /// # Safety
    ///
    /// `ptr` must be a live pointer from this allocator, as in `free`.
    pub unsafe fn reallocate(&self, ptr: *mut u8, new_size: usize) -> Result<*mut u8, AllocError> {
        if new_size == 0 || new_size > MAX_MEM {
            return Err(AllocError::InvalidSize);
        }

        if ptr.is_null() {
            return self.allocate(new_size);
        }

        let mut state = self.state.borrow_mut();

        if let Some((idx, order)) = state.live_arena.remove(&(ptr as usize)) {
            let current_payload = state.table.get(idx).payload_size;
            if new_size <= current_payload {
                state.live_arena.insert(ptr as usize, (idx, order));
                return Ok(ptr);
            }

            let (new_idx, new_order) = realloc::try_expand_in_place(
                &mut state.table,
                &mut state.index,
                &mut state.stats,
                idx,
                order,
                new_size,
            );
            let new_payload = state.table.get(new_idx).payload_size;

            if new_payload >= new_size {
                let new_offset = state.table.get(new_idx).offset;
                let new_ptr = state.arena.as_ref().unwrap().payload_ptr(new_offset);
                state.live_arena.insert(new_ptr as usize, (new_idx, new_order));
                if new_ptr != ptr {
                    // SAFETY: the merged block fully contains the old block's
                    // bytes at its original offset, which is `new_offset` when
                    // `new_ptr == ptr`; when it isn't, `ptr` is the lower half
                    // the new pointer is built from, so old contents live
                    // within [new_ptr, new_ptr + current_payload).
                    unsafe {
                        std::ptr::copy(ptr, new_ptr, current_payload);
                    }
                }
                return Ok(new_ptr);
            }

            drop(state);
            let relocated = self.allocate(new_size)?;
            // SAFETY: `relocated` is a fresh, non-overlapping allocation of
            // at least `new_size` bytes; `ptr` still points at the original
            // contents (the merge above only rearranges block metadata, it
            // never moves the underlying arena bytes).
            unsafe {
                std::ptr::copy_nonoverlapping(ptr, relocated, current_payload.min(new_size));
            }
            let mut state = self.state.borrow_mut();
            buddy::release_block(&mut state.table, &mut state.index, &mut state.stats, new_idx, new_order);
            return Ok(relocated);
        }

        if state.direct.contains(ptr) {
            let current_payload = state
                .direct
                .payload_size(ptr)
                .expect("contains() just confirmed this pointer is tracked");
            if new_size <= current_payload {
                return Ok(ptr);
            }

            drop(state);
            let relocated = self.allocate(new_size)?;
            // SAFETY: `relocated` holds at least `new_size` bytes and `ptr`
            // holds `current_payload` valid bytes of the original contents.
            unsafe {
                std::ptr::copy_nonoverlapping(ptr, relocated, current_payload.min(new_size));
            }
            // SAFETY: `ptr` is a live direct-mapped pointer from this allocator.
            unsafe { self.free(ptr) };
            return Ok(relocated);
        }

        log::error!("reallocate of a pointer this allocator did not hand out");
        Err(AllocError::InvalidSize)
    }

    /// Total blocks currently tracked, free or allocated, arena or direct.
    pub fn blocks_num(&self) -> usize {
        self.state.borrow().stats.blocks_num()
    }

    /// Free arena blocks (direct-mapped blocks are never free).
    pub fn num_free_blocks(&self) -> usize {
        self.state.borrow().stats.free_blocks_num()
    }

    /// Payload bytes available across every free arena block.
    pub fn num_free_bytes(&self) -> usize {
        self.state.borrow().stats.free_bytes()
    }

    /// Allocated blocks, arena or direct.
    pub fn num_allocated_blocks(&self) -> usize {
        self.state.borrow().stats.allocated_blocks_num()
    }

    /// Total payload capacity under management: every free and allocated
    /// arena block's payload, plus every direct-mapped block's payload.
    pub fn num_allocated_bytes(&self) -> usize {
        self.state.borrow().stats.all_bytes()
    }

    /// Total bytes currently spent on block headers, arena or direct.
    pub fn num_metadata_bytes(&self) -> usize {
        self.state.borrow().stats.blocks_num() * METADATA_SIZE
    }

    /// Fixed per-block header size.
    pub fn size_metadata(&self) -> usize {
        METADATA_SIZE
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_then_free_round_trips_stats() {
        let alloc = Allocator::new();
        // Force arena init so the baseline already reflects the seeded
        // capacity; otherwise the first allocate's init would itself shift
        // `all_bytes` away from a pre-init reading of zero.
        unsafe { alloc.free(alloc.allocate(1).unwrap()) };
        let before_free = alloc.num_free_bytes();
        let before_blocks = alloc.blocks_num();

        let ptr = alloc.allocate(64).unwrap();
        assert!(alloc.num_free_bytes() < before_free);

        unsafe { alloc.free(ptr) };
        assert_eq!(alloc.num_free_bytes(), before_free);
        assert_eq!(alloc.blocks_num(), before_blocks);
    }

    #[test]
    fn zero_size_is_rejected() {
        let alloc = Allocator::new();
        assert_eq!(alloc.allocate(0), Err(AllocError::InvalidSize));
    }

    #[test]
    fn oversized_request_is_rejected() {
        let alloc = Allocator::new();
        assert_eq!(alloc.allocate(MAX_MEM + 1), Err(AllocError::InvalidSize));
    }

    #[test]
    fn large_request_uses_the_direct_path() {
        let alloc = Allocator::new();
        let ptr = alloc.allocate(8 * 1024 * 1024).unwrap();
        assert!(!ptr.is_null());
        unsafe { alloc.free(ptr) };
    }

    #[test]
    fn allocate_zeroed_is_actually_zero() {
        let alloc = Allocator::new();
        let ptr = alloc.allocate_zeroed(16, 16).unwrap();
        let bytes = unsafe { std::slice::from_raw_parts(ptr, 256) };
        assert!(bytes.iter().all(|&b| b == 0));
        unsafe { alloc.free(ptr) };
    }

    #[test]
    fn allocate_zeroed_rejects_overflowing_count_times_size() {
        let alloc = Allocator::new();
        assert_eq!(
            alloc.allocate_zeroed(usize::MAX, 2),
            Err(AllocError::InvalidSize)
        );
    }

    #[test]
    fn reallocate_preserves_contents_when_growing() {
        let alloc = Allocator::new();
        let ptr = alloc.allocate(32).unwrap();
        unsafe {
            std::ptr::write_bytes(ptr, 0xAB, 32);
        }

        let grown = unsafe { alloc.reallocate(ptr, 256).unwrap() };
        let bytes = unsafe { std::slice::from_raw_parts(grown, 32) };
        assert!(bytes.iter().all(|&b| b == 0xAB));

        unsafe { alloc.free(grown) };
    }

    #[test]
    fn reallocate_to_a_smaller_size_keeps_the_same_block() {
        let alloc = Allocator::new();
        let ptr = alloc.allocate(256).unwrap();
        let same = unsafe { alloc.reallocate(ptr, 8).unwrap() };
        assert_eq!(ptr, same);
        unsafe { alloc.free(same) };
    }

    #[test]
    fn reallocate_null_degenerates_to_allocate() {
        let alloc = Allocator::new();
        let ptr = unsafe { alloc.reallocate(std::ptr::null_mut(), 64).unwrap() };
        assert!(!ptr.is_null());
        unsafe { alloc.free(ptr) };
    }
}
