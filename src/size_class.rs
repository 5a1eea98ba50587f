//! Size class arithmetic.
//!
//! Classes are linear at [`ALIGNMENT`]-byte granularity: class `i` holds
//! blocks of exactly `(i + 1) * ALIGNMENT` bytes. Requests are rounded up
//! to the granularity; anything above [`MAX_BYTES`] is not class-managed
//! and goes straight to the page cache.

use crate::config::{ALIGNMENT, MAX_BYTES};

/// Round a request up to the block-size granularity. Zero-byte requests
/// round to the smallest block.
#[inline]
pub const fn round_up(bytes: usize) -> usize {
    if bytes <= ALIGNMENT {
        return ALIGNMENT;
    }
    (bytes + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

/// Map a request to its size class index.
///
/// Only meaningful for `bytes <= MAX_BYTES`; the façade routes larger
/// requests to the page cache before indexing.
#[inline]
pub const fn class_index(bytes: usize) -> usize {
    round_up(bytes) / ALIGNMENT - 1
}

/// Exact block size of a size class.
#[inline]
pub const fn class_to_size(index: usize) -> usize {
    (index + 1) * ALIGNMENT
}

/// Whether a request (after rounding) is served by the size-class tiers.
#[inline]
pub const fn is_class_managed(bytes: usize) -> bool {
    round_up(bytes) <= MAX_BYTES
}
