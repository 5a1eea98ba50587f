//! Tuning constants. Most values come from `mempool.toml` (or the file
//! named by `MEMPOOL_CONFIG`), resolved at build time by build.rs.

include!(concat!(env!("OUT_DIR"), "/config_gen.rs"));

/// Block-size granularity. Fixed in source: an idle block stores the
/// intrusive free-list link in its first word, so every block must be able
/// to hold a pointer.
pub const ALIGNMENT: usize = 8;

/// Number of size classes. Class `i` holds blocks of `(i + 1) * ALIGNMENT`
/// bytes; the largest class is exactly `MAX_BYTES`.
pub const FREE_LIST_SIZE: usize = MAX_BYTES / ALIGNMENT;

const _: () = {
    assert!(ALIGNMENT >= size_of::<*mut u8>());
    assert!(PAGE_SIZE.is_power_of_two());
    assert!(MAX_BYTES.is_multiple_of(ALIGNMENT));
    assert!(MAX_RECYCLE_PAGES * PAGE_SIZE >= MAX_BYTES);
    assert!(MIN_CACHED_BLOCKS <= MAX_CACHED_BLOCKS);
};
