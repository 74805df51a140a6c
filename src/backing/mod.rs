//! Backing store abstraction: where arena bytes and direct-mapped blocks
//! actually come from.
//!
//! The engine talks to memory through this trait rather than calling
//! `libc::sbrk`/`libc::mmap` directly, the same split the upstream `pmm`
//! crate draws between its `Hardware` and `Emulated` address translators.
//! [`Hardware`] is the real implementation; [`Emulated`] backs tests and the
//! `software-emulation` feature with a process-local buffer so tests never
//! fight over the real program break.

mod emulated;
#[cfg(unix)]
mod hardware;

pub use emulated::Emulated;
#[cfg(unix)]
pub use hardware::Hardware;

use crate::error::AllocError;

/// A source of raw memory for the arena and for direct-mapped large blocks.
///
/// # Safety
///
/// Implementors must return pointers that stay valid (and, for `extend_arena`,
/// stable: never moved or reallocated) for as long as the backing store
/// itself is alive, since the engine caches offsets computed from the arena
/// base pointer.
pub unsafe trait Backing {
    /// Grows the arena by exactly `size` bytes and returns a pointer to the
    /// start of the whole arena. Called exactly once, the first time the
    /// engine needs arena-backed memory.
    fn extend_arena(&mut self, size: usize) -> Result<*mut u8, AllocError>;

    /// Maps `size` bytes outside the arena for the direct-mapped path,
    /// attempting a huge-page-backed mapping first when `want_hugepage` is
    /// set and transparently falling back to a normal mapping if that fails.
    fn map_large(&mut self, size: usize, want_hugepage: bool) -> Result<*mut u8, AllocError>;

    /// Releases a mapping previously returned by `map_large`.
    ///
    /// # Safety
    ///
    /// `ptr` must be a pointer previously returned by `map_large` on this
    /// backing store, with the same `size`, not already unmapped.
    unsafe fn unmap_large(&mut self, ptr: *mut u8, size: usize);
}
