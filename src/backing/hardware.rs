//! Real-memory backing store: `sbrk` for the arena, `mmap`/`munmap` for
//! direct-mapped large blocks.

use super::Backing;
use crate::error::AllocError;

/// Backing store that talks to the OS directly.
///
/// Grounded on the original allocator's `_init`/`_alloc_block`/`_free_block`,
/// which call `sbrk` once to carve out the arena and `mmap`/`munmap` per
/// large request, with a huge-page attempt that falls back to a normal
/// mapping on failure.
#[derive(Default)]
pub struct Hardware {
    _private: (),
}

impl Hardware {
    pub fn new() -> Self {
        Self::default()
    }
}

unsafe impl Backing for Hardware {
    fn extend_arena(&mut self, size: usize) -> Result<*mut u8, AllocError> {
        // SAFETY: sbrk is only ever called here, exactly once for the
        // lifetime of this backing store, per the `extend_arena` contract.
        let prev = unsafe { libc::sbrk(size as libc::intptr_t) };
        if prev == usize::MAX as *mut libc::c_void {
            log::error!("sbrk({size}) failed: {}", std::io::Error::last_os_error());
            return Err(AllocError::NotInitialized);
        }
        Ok(prev as *mut u8)
    }

    fn map_large(&mut self, size: usize, want_hugepage: bool) -> Result<*mut u8, AllocError> {
        let base_flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;

        if want_hugepage {
            let ptr = unsafe {
                libc::mmap(
                    std::ptr::null_mut(),
                    size,
                    libc::PROT_READ | libc::PROT_WRITE,
                    base_flags | libc::MAP_HUGETLB,
                    -1,
                    0,
                )
            };
            if ptr != libc::MAP_FAILED {
                log::trace!("mapped {size} bytes with MAP_HUGETLB");
                return Ok(ptr as *mut u8);
            }
            log::warn!("huge-page mapping of {size} bytes failed, falling back");
        }

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                base_flags,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            log::error!("mmap({size}) failed: {}", std::io::Error::last_os_error());
            return Err(AllocError::OutOfMemory);
        }
        Ok(ptr as *mut u8)
    }

    unsafe fn unmap_large(&mut self, ptr: *mut u8, size: usize) {
        // SAFETY: delegated to the caller's contract on `Backing::unmap_large`.
        let rc = unsafe { libc::munmap(ptr as *mut libc::c_void, size) };
        if rc != 0 {
            log::error!("munmap failed: {}", std::io::Error::last_os_error());
        }
    }
}
