//! Direct-mapped path for requests too large for the buddy arena.
//!
//! Grounded on the original allocator's large-allocation branch of
//! `_alloc_block`/`_free_block`, which maps pages directly via `mmap` instead
//! of going through the buddy free lists, attempting a huge-page mapping
//! first for sufficiently large requests. Metadata for these blocks lives in
//! a side table keyed by the payload pointer, exactly as arena block
//! metadata lives in the [`crate::block::BlockTable`] rather than inline.

use std::collections::HashMap;

use crate::backing::Backing;
use crate::error::AllocError;
use crate::order::{self, HUGEPAGE_THRESHOLD, MAX_MEM};

const PAGE_SIZE: usize = 4096;

#[inline]
fn round_up_to_page(size: usize) -> usize {
    (size + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

#[derive(Debug, Clone, Copy)]
struct DirectBlock {
    mapped_size: usize,
    payload_size: usize,
}

/// Tracks every currently-live direct-mapped block, keyed by the address
/// handed back to the caller.
#[derive(Default)]
pub struct DirectBlocks {
    blocks: HashMap<usize, DirectBlock>,
}

impl DirectBlocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps a block able to hold `payload_size` bytes and returns a pointer
    /// to its payload.
    pub fn allocate(
        &mut self,
        backing: &mut dyn Backing,
        payload_size: usize,
    ) -> Result<*mut u8, AllocError> {
        if payload_size == 0 || payload_size > MAX_MEM {
            return Err(AllocError::InvalidSize);
        }

        let total = payload_size + order::METADATA_SIZE;
        let mapped_size = round_up_to_page(total);
        let want_hugepage = mapped_size >= HUGEPAGE_THRESHOLD;

        let ptr = backing.map_large(mapped_size, want_hugepage)?;
        self.blocks.insert(
            ptr as usize,
            DirectBlock {
                mapped_size,
                payload_size,
            },
        );
        log::trace!("direct-mapped {mapped_size} bytes at {:p}", ptr);
        Ok(ptr)
    }

    /// Returns whether `ptr` is the payload pointer of a currently-live
    /// direct-mapped block.
    pub fn contains(&self, ptr: *const u8) -> bool {
        self.blocks.contains_key(&(ptr as usize))
    }

    pub fn payload_size(&self, ptr: *const u8) -> Option<usize> {
        self.blocks.get(&(ptr as usize)).map(|b| b.payload_size)
    }

    pub fn mapped_size(&self, ptr: *const u8) -> Option<usize> {
        self.blocks.get(&(ptr as usize)).map(|b| b.mapped_size)
    }

    /// Unmaps the block at `ptr`, which must have come from [`Self::allocate`]
    /// on this set and not already have been freed.
    pub fn free(&mut self, backing: &mut dyn Backing, ptr: *mut u8) {
        if let Some(block) = self.blocks.remove(&(ptr as usize)) {
            // SAFETY: `ptr`/`block.mapped_size` are exactly the pair this
            // block was allocated with.
            unsafe { backing.unmap_large(ptr, block.mapped_size) };
        } else {
            log::error!("direct free of an untracked pointer");
        }
    }

    pub fn live_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn live_bytes(&self) -> usize {
        self.blocks.values().map(|b| b.mapped_size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::Emulated;

    #[test]
    fn allocate_rounds_up_to_a_page() {
        let mut backing = Emulated::new();
        let mut blocks = DirectBlocks::new();

        let ptr = blocks.allocate(&mut backing, 1).unwrap();
        assert_eq!(blocks.mapped_size(ptr).unwrap(), PAGE_SIZE);
        assert!(blocks.contains(ptr));
    }

    #[test]
    fn free_removes_tracking() {
        let mut backing = Emulated::new();
        let mut blocks = DirectBlocks::new();

        let ptr = blocks.allocate(&mut backing, 10_000_000).unwrap();
        assert!(blocks.contains(ptr));
        blocks.free(&mut backing, ptr);
        assert!(!blocks.contains(ptr));
    }

    #[test]
    fn rejects_zero_and_oversized_requests() {
        let mut backing = Emulated::new();
        let mut blocks = DirectBlocks::new();

        assert_eq!(blocks.allocate(&mut backing, 0), Err(AllocError::InvalidSize));
        assert_eq!(
            blocks.allocate(&mut backing, MAX_MEM + 1),
            Err(AllocError::InvalidSize)
        );
    }
}
