//! In-process emulated backing store, for tests and the `software-emulation`
//! feature.
//!
//! Generalizes the upstream `pmm` crate's `EmulatedMemory`: rather than
//! touching the real program break or calling into `mmap`, every allocation
//! here is an ordinary heap buffer owned by this struct. Multiple engines can
//! exist in the same process without contending over a single real arena.

use super::Backing;
use crate::error::AllocError;

/// Backing store that emulates the arena and large mappings with ordinary
/// heap buffers.
#[derive(Default)]
pub struct Emulated {
    arena: Option<Box<[u8]>>,
    large_maps: Vec<Box<[u8]>>,
}

impl Emulated {
    pub fn new() -> Self {
        Self::default()
    }
}

unsafe impl Backing for Emulated {
    fn extend_arena(&mut self, size: usize) -> Result<*mut u8, AllocError> {
        if self.arena.is_some() {
            // The real sbrk-backed store only ever extends once; emulate the
            // same contract so tests catch a caller that violates it.
            log::error!("emulated arena already initialized, refusing a second extend_arena");
            return Err(AllocError::NotInitialized);
        }
        let mut buf = vec![0u8; size].into_boxed_slice();
        let ptr = buf.as_mut_ptr();
        self.arena = Some(buf);
        Ok(ptr)
    }

    fn map_large(&mut self, size: usize, _want_hugepage: bool) -> Result<*mut u8, AllocError> {
        let mut buf = vec![0u8; size].into_boxed_slice();
        let ptr = buf.as_mut_ptr();
        self.large_maps.push(buf);
        Ok(ptr)
    }

    unsafe fn unmap_large(&mut self, ptr: *mut u8, _size: usize) {
        if let Some(pos) = self
            .large_maps
            .iter()
            .position(|buf| buf.as_ptr() as *mut u8 == ptr)
        {
            self.large_maps.swap_remove(pos);
        } else {
            log::error!("unmap_large called with an untracked pointer");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_arena_only_once() {
        let mut backing = Emulated::new();
        assert!(backing.extend_arena(4096).is_ok());
        assert!(backing.extend_arena(4096).is_err());
    }

    #[test]
    fn map_and_unmap_large_round_trips() {
        let mut backing = Emulated::new();
        let ptr = backing.map_large(8192, false).unwrap();
        assert_eq!(backing.large_maps.len(), 1);
        unsafe { backing.unmap_large(ptr, 8192) };
        assert_eq!(backing.large_maps.len(), 0);
    }
}
