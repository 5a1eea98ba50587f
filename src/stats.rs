//! Allocation statistics counters.
//!
//! All counters use `Relaxed` ordering — they are observational only and
//! never used as synchronization. The allocator's spinlocks provide the
//! ordering guarantees for correctness; these counters exist for
//! monitoring and for tests that assert on cache behavior.
//!
//! Obtain a [`Snapshot`] with [`snapshot()`]. Individual counter loads are
//! atomic but the snapshot as a whole is not globally consistent.

use core::sync::atomic::{AtomicU64, Ordering};

pub(crate) struct Stats {
    // ---- Façade ----
    /// Total calls to `allocate`.
    pub alloc_count: AtomicU64,
    /// Total calls to `deallocate` with a non-null pointer.
    pub dealloc_count: AtomicU64,
    /// Sum of all requested byte sizes passed to `allocate`.
    pub alloc_bytes: AtomicU64,
    /// Requests above `MAX_BYTES` routed straight to the page cache.
    pub large_allocs: AtomicU64,

    // ---- Thread cache ----
    /// Allocations served from a thread-local free list (no lock).
    pub thread_cache_hits: AtomicU64,
    /// Allocations that fell through to the central cache.
    pub thread_cache_misses: AtomicU64,
    /// Thread-cache lists drained past their high-water mark.
    pub thread_cache_flushes: AtomicU64,

    // ---- Central cache ----
    /// Calls to `fetch_range`.
    pub central_fetches: AtomicU64,
    /// Calls to `return_range`.
    pub central_returns: AtomicU64,
    /// Delayed-return reconciliation passes.
    pub delayed_return_runs: AtomicU64,
    /// Spans carved into class blocks.
    pub spans_carved: AtomicU64,
    /// Fully idle spans handed back to the page cache.
    pub spans_released: AtomicU64,

    // ---- Page cache / OS ----
    /// Calls to `platform::page_alloc`.
    pub os_map_count: AtomicU64,
    /// Bytes requested from the OS via `platform::page_alloc`.
    pub os_map_bytes: AtomicU64,

    // ---- Locking ----
    /// Spinlock acquisitions that hit the contended slow path.
    pub lock_contentions: AtomicU64,
}

impl Stats {
    const fn new() -> Self {
        Self {
            alloc_count: AtomicU64::new(0),
            dealloc_count: AtomicU64::new(0),
            alloc_bytes: AtomicU64::new(0),
            large_allocs: AtomicU64::new(0),
            thread_cache_hits: AtomicU64::new(0),
            thread_cache_misses: AtomicU64::new(0),
            thread_cache_flushes: AtomicU64::new(0),
            central_fetches: AtomicU64::new(0),
            central_returns: AtomicU64::new(0),
            delayed_return_runs: AtomicU64::new(0),
            spans_carved: AtomicU64::new(0),
            spans_released: AtomicU64::new(0),
            os_map_count: AtomicU64::new(0),
            os_map_bytes: AtomicU64::new(0),
            lock_contentions: AtomicU64::new(0),
        }
    }
}

pub(crate) static STATS: Stats = Stats::new();

/// A point-in-time copy of all allocation statistics.
#[derive(Clone, Copy, Debug, Default)]
pub struct Snapshot {
    /// Total calls to `allocate`.
    pub alloc_count: u64,
    /// Total calls to `deallocate` with a non-null pointer.
    pub dealloc_count: u64,
    /// Sum of all requested byte sizes passed to `allocate`.
    pub alloc_bytes: u64,
    /// Requests above `MAX_BYTES` routed straight to the page cache.
    pub large_allocs: u64,
    /// Allocations served from a thread-local free list (no lock).
    pub thread_cache_hits: u64,
    /// Allocations that fell through to the central cache.
    pub thread_cache_misses: u64,
    /// Thread-cache lists drained past their high-water mark.
    pub thread_cache_flushes: u64,
    /// Calls to `fetch_range`.
    pub central_fetches: u64,
    /// Calls to `return_range`.
    pub central_returns: u64,
    /// Delayed-return reconciliation passes.
    pub delayed_return_runs: u64,
    /// Spans carved into class blocks.
    pub spans_carved: u64,
    /// Fully idle spans handed back to the page cache.
    pub spans_released: u64,
    /// Calls to `platform::page_alloc`.
    pub os_map_count: u64,
    /// Bytes requested from the OS via `platform::page_alloc`.
    pub os_map_bytes: u64,
    /// Spinlock acquisitions that hit the contended slow path.
    pub lock_contentions: u64,
}

/// Load every counter with `Relaxed` ordering.
pub fn snapshot() -> Snapshot {
    let s = &STATS;
    Snapshot {
        alloc_count: s.alloc_count.load(Ordering::Relaxed),
        dealloc_count: s.dealloc_count.load(Ordering::Relaxed),
        alloc_bytes: s.alloc_bytes.load(Ordering::Relaxed),
        large_allocs: s.large_allocs.load(Ordering::Relaxed),
        thread_cache_hits: s.thread_cache_hits.load(Ordering::Relaxed),
        thread_cache_misses: s.thread_cache_misses.load(Ordering::Relaxed),
        thread_cache_flushes: s.thread_cache_flushes.load(Ordering::Relaxed),
        central_fetches: s.central_fetches.load(Ordering::Relaxed),
        central_returns: s.central_returns.load(Ordering::Relaxed),
        delayed_return_runs: s.delayed_return_runs.load(Ordering::Relaxed),
        spans_carved: s.spans_carved.load(Ordering::Relaxed),
        spans_released: s.spans_released.load(Ordering::Relaxed),
        os_map_count: s.os_map_count.load(Ordering::Relaxed),
        os_map_bytes: s.os_map_bytes.load(Ordering::Relaxed),
        lock_contentions: s.lock_contentions.load(Ordering::Relaxed),
    }
}
