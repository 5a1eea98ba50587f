//! rsmempool: a three-tier recycling memory pool.
//!
//! Mirrors the classic thread-caching allocator architecture:
//! - Thread caches (fast path, no locks)
//! - Central cache (per-size-class spinlocks, delayed bulk reclamation)
//! - Page cache (span recycling, OS interface)
//!
//! Blocks are bucketed into size classes at 8-byte granularity; class `i`
//! holds blocks of exactly `(i + 1) * 8` bytes up to [`config::MAX_BYTES`].
//! Freed blocks park in the owning thread's cache and drain to the central
//! cache in batches; the central cache reconciles per-span accounting in
//! amortized delayed-return passes and hands fully idle spans back to the
//! page cache.
//!
//! # Usage
//!
//! Either through the explicit pool API:
//!
//! ```
//! let p = rsmempool::allocate(24);
//! assert!(!p.is_null());
//! unsafe { rsmempool::deallocate(p, 24) };
//! ```
//!
//! or as the global allocator:
//!
//! ```ignore
//! #[global_allocator]
//! static GLOBAL: rsmempool::MemPool = rsmempool::MemPool;
//! ```

pub mod allocator;
pub mod central_cache;
pub mod config;
mod macros;
pub mod page_cache;
pub mod platform;
pub mod size_class;
pub mod span_tracker;
#[cfg(feature = "stats")]
pub mod stats;
pub mod sync;
pub mod thread_cache;

// Re-export the façade at crate root for convenience.
pub use allocator::{MemPool, allocate, deallocate};
