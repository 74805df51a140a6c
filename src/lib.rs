//! A user-space buddy-system allocator.
//!
//! [`Allocator`] manages a fixed-size arena carved into power-of-two blocks
//! (the buddy system) plus a direct-mapped path for requests too large for
//! the arena to hold. It is meant to sit where `malloc`/`calloc`/`free`/
//! `realloc` would: one allocator per process (or per test), no locking, no
//! global state.
//!
//! ```
//! use buddy_heap::Allocator;
//!
//! let heap = Allocator::new();
//! let ptr = heap.allocate(64).unwrap();
//! unsafe {
//!     std::ptr::write_bytes(ptr, 0x42, 64);
//!     heap.free(ptr);
//! }
//! ```

mod allocator;
mod arena;
mod backing;
mod block;
mod block_list;
mod buddy;
mod direct;
mod error;
mod human_size;
mod order;
mod order_index;
mod realloc;
mod stats;

pub use allocator::Allocator;
pub use backing::{Backing, Emulated};
#[cfg(unix)]
pub use backing::Hardware;
pub use error::AllocError;
pub use human_size::HumanSize;
pub use order::{BASE_BLOCK, MAX_MEM, MAX_ORDER, NUM_BLOCKS};
