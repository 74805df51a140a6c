//! Error type for the allocation engine.

use std::fmt;

/// Errors the engine can report from its public surface.
///
/// The engine never panics or aborts on caller misuse (see the crate docs);
/// every rejection is reported through this type instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The requested size was zero or exceeded [`crate::order::MAX_MEM`].
    InvalidSize,
    /// No free block of sufficient order was available, there was no higher
    /// order to split, and the large-block path (or the OS) refused too.
    OutOfMemory,
    /// The arena failed to initialize on first use (the OS refused the
    /// break-extension request) and has not produced any memory since.
    NotInitialized,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSize => write!(f, "requested size is zero or exceeds the allocator cap"),
            Self::OutOfMemory => write!(f, "no block large enough was available"),
            Self::NotInitialized => write!(f, "arena failed to initialize"),
        }
    }
}

impl std::error::Error for AllocError {}
