//! Page cache (back-end): page-granular spans obtained from the OS.
//!
//! Implements the page layer contract consumed by the central cache:
//! `allocate_span(num_pages) -> addr` (null on OOM) and
//! `deallocate_span(addr, num_pages)`.
//!
//! Returned spans are recycled on per-page-count free lists threaded
//! through the spans' own first words (a cached span is unused memory, so
//! the intrusive link costs nothing). Spans recycle at the granularity
//! they were carved at; there is no splitting or coalescing — the central
//! cache's span-size policy makes page counts highly repetitive, so
//! exact-size reuse captures nearly all traffic.
//!
//! An optional page budget caps the total pages obtained from the OS;
//! once exhausted, `allocate_span` reports OOM by returning null.

use crate::config::{MAX_CACHED_SPAN_PAGES, MAX_RECYCLE_PAGES, PAGE_SIZE};
use crate::platform;
use crate::sync::SpinMutex;
use crate::{stat_add, stat_inc};
use core::ptr;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Intrusive link stored in the first word of a cached span.
#[repr(C)]
struct FreeSpan {
    next: *mut FreeSpan,
}

/// Per-page-count free lists of cached spans.
struct SpanLists {
    /// `heads[n]` holds cached spans of exactly `n` pages (index 0 unused).
    heads: [*mut FreeSpan; MAX_RECYCLE_PAGES + 1],
    /// Total pages currently parked in the free lists.
    cached_pages: usize,
    /// Total spans currently parked in the free lists.
    cached_spans: usize,
}

// SAFETY: only accessed through the enclosing SpinMutex; the raw pointers
// reference OS-allocated memory owned by this cache.
unsafe impl Send for SpanLists {}

impl SpanLists {
    const fn new() -> Self {
        Self {
            heads: [ptr::null_mut(); MAX_RECYCLE_PAGES + 1],
            cached_pages: 0,
            cached_spans: 0,
        }
    }
}

/// Page-granular backing store with exact-size span recycling.
pub struct PageCache {
    lists: SpinMutex<SpanLists>,
    /// Cap on pages obtained from the OS. `usize::MAX` means unlimited.
    budget_pages: AtomicUsize,
    /// Pages currently obtained from the OS (resident, cached or in use).
    mapped_pages: AtomicUsize,
    /// Successful `allocate_span` calls.
    spans_allocated: AtomicUsize,
    /// `deallocate_span` calls.
    spans_returned: AtomicUsize,
}

impl Default for PageCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PageCache {
    pub const fn new() -> Self {
        Self::with_budget(usize::MAX)
    }

    /// A page cache that will obtain at most `budget_pages` pages from the
    /// OS. Cached spans count against the budget until unmapped.
    pub const fn with_budget(budget_pages: usize) -> Self {
        Self {
            lists: SpinMutex::new(SpanLists::new()),
            budget_pages: AtomicUsize::new(budget_pages),
            mapped_pages: AtomicUsize::new(0),
            spans_allocated: AtomicUsize::new(0),
            spans_returned: AtomicUsize::new(0),
        }
    }

    /// Adjust the page budget. Lowering it does not unmap anything; it
    /// only constrains future OS requests.
    pub fn set_budget_pages(&self, budget_pages: usize) {
        self.budget_pages.store(budget_pages, Ordering::Relaxed);
    }

    /// Allocate a span of exactly `num_pages` pages. Returns null when the
    /// OS refuses or the page budget is exhausted.
    pub fn allocate_span(&self, num_pages: usize) -> *mut u8 {
        assert!(num_pages > 0, "allocate_span: zero pages requested");

        if num_pages <= MAX_RECYCLE_PAGES {
            let mut lists = self.lists.lock();
            let head = lists.heads[num_pages];
            if !head.is_null() {
                lists.heads[num_pages] = unsafe { (*head).next };
                lists.cached_pages -= num_pages;
                lists.cached_spans -= 1;
                drop(lists);
                self.spans_allocated.fetch_add(1, Ordering::Relaxed);
                return head as *mut u8;
            }
        }

        let bytes = num_pages * PAGE_SIZE;
        if !self.charge(num_pages) {
            return ptr::null_mut();
        }
        let addr = unsafe { platform::page_alloc(bytes) };
        if addr.is_null() {
            self.uncharge(num_pages);
            return ptr::null_mut();
        }
        stat_inc!(os_map_count);
        stat_add!(os_map_bytes, bytes as u64);
        self.spans_allocated.fetch_add(1, Ordering::Relaxed);
        addr
    }

    /// Return a span. Small spans are cached for reuse while the cached
    /// total stays under `MAX_CACHED_SPAN_PAGES`; everything else goes
    /// back to the OS.
    ///
    /// # Safety
    /// `addr` must have been returned by [`Self::allocate_span`] with the
    /// same `num_pages`, and no live blocks may remain in the span.
    pub unsafe fn deallocate_span(&self, addr: *mut u8, num_pages: usize) {
        if addr.is_null() {
            return;
        }
        self.spans_returned.fetch_add(1, Ordering::Relaxed);

        if num_pages <= MAX_RECYCLE_PAGES {
            let mut lists = self.lists.lock();
            if lists.cached_pages + num_pages <= MAX_CACHED_SPAN_PAGES {
                let span = addr as *mut FreeSpan;
                unsafe { (*span).next = lists.heads[num_pages] };
                lists.heads[num_pages] = span;
                lists.cached_pages += num_pages;
                lists.cached_spans += 1;
                return;
            }
        }

        unsafe { platform::page_dealloc(addr, num_pages * PAGE_SIZE) };
        self.uncharge(num_pages);
    }

    /// Pages currently obtained from the OS (in use by callers or cached).
    pub fn mapped_pages(&self) -> usize {
        self.mapped_pages.load(Ordering::Relaxed)
    }

    /// Spans currently parked in the recycle lists.
    pub fn cached_spans(&self) -> usize {
        self.lists.lock().cached_spans
    }

    /// Pages currently parked in the recycle lists.
    pub fn cached_pages(&self) -> usize {
        self.lists.lock().cached_pages
    }

    /// Successful span allocations over this cache's lifetime.
    pub fn spans_allocated(&self) -> usize {
        self.spans_allocated.load(Ordering::Relaxed)
    }

    /// Span returns over this cache's lifetime.
    pub fn spans_returned(&self) -> usize {
        self.spans_returned.load(Ordering::Relaxed)
    }

    /// Reserve `num_pages` against the budget. Fails without side effects
    /// when the budget would be exceeded.
    fn charge(&self, num_pages: usize) -> bool {
        let budget = self.budget_pages.load(Ordering::Relaxed);
        self.mapped_pages
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |mapped| {
                match mapped.checked_add(num_pages) {
                    Some(total) if total <= budget => Some(total),
                    _ => None,
                }
            })
            .is_ok()
    }

    fn uncharge(&self, num_pages: usize) {
        self.mapped_pages.fetch_sub(num_pages, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_return() {
        let cache = PageCache::new();
        let span = cache.allocate_span(8);
        assert!(!span.is_null());
        assert_eq!(span as usize % 4096, 0);
        assert_eq!(cache.mapped_pages(), 8);
        unsafe { cache.deallocate_span(span, 8) };
        assert_eq!(cache.cached_spans(), 1);
        assert_eq!(cache.cached_pages(), 8);
        // Still resident: cached spans count against the budget.
        assert_eq!(cache.mapped_pages(), 8);
    }

    #[test]
    fn test_exact_size_reuse() {
        let cache = PageCache::new();
        let span = cache.allocate_span(8);
        assert!(!span.is_null());
        unsafe { cache.deallocate_span(span, 8) };

        // Same page count comes back from the recycle list, same address.
        let again = cache.allocate_span(8);
        assert_eq!(again, span);
        assert_eq!(cache.cached_spans(), 0);

        // A different page count maps fresh memory.
        let other = cache.allocate_span(4);
        assert!(!other.is_null());
        assert_ne!(other, span);

        unsafe {
            cache.deallocate_span(again, 8);
            cache.deallocate_span(other, 4);
        }
    }

    #[test]
    fn test_budget_exhaustion_and_recovery() {
        let cache = PageCache::with_budget(0);
        assert!(cache.allocate_span(1).is_null());

        cache.set_budget_pages(8);
        let span = cache.allocate_span(8);
        assert!(!span.is_null());
        // Budget is now fully consumed.
        assert!(cache.allocate_span(1).is_null());

        unsafe { cache.deallocate_span(span, 8) };
        // The cached span still counts as mapped, but exact-size reuse works.
        let again = cache.allocate_span(8);
        assert_eq!(again, span);
        unsafe { cache.deallocate_span(again, 8) };
    }

    #[test]
    fn test_oversized_spans_bypass_recycling() {
        let cache = PageCache::new();
        let pages = MAX_RECYCLE_PAGES + 1;
        let span = cache.allocate_span(pages);
        assert!(!span.is_null());
        unsafe { cache.deallocate_span(span, pages) };
        assert_eq!(cache.cached_spans(), 0);
        assert_eq!(cache.mapped_pages(), 0);
    }

    #[test]
    fn test_cache_cap_unmaps_overflow() {
        let cache = PageCache::new();
        let per_span = MAX_RECYCLE_PAGES;
        let n = MAX_CACHED_SPAN_PAGES / per_span + 2;
        let spans: Vec<_> = (0..n).map(|_| cache.allocate_span(per_span)).collect();
        assert!(spans.iter().all(|s| !s.is_null()));
        for s in spans {
            unsafe { cache.deallocate_span(s, per_span) };
        }
        assert!(cache.cached_pages() <= MAX_CACHED_SPAN_PAGES);
    }
}
