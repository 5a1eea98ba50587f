//! Central cache (middle tier): per-size-class shared pools of free
//! blocks, carved from page-cache spans.
//!
//! Each size class owns an intrusive free list behind its own spinlock, so
//! traffic on distinct classes never contends. Returned blocks are spliced
//! onto the list without touching span accounting; reconciliation is
//! deferred to an amortized delayed-return pass, triggered when a class
//! has absorbed `MAX_DELAY_COUNT` returns or `DELAY_INTERVAL_MS` has gone
//! by. The pass recounts per-span membership, and any span whose blocks
//! are all back in the list is spliced out whole and handed to the page
//! cache. Between passes, span `free_count`s may undercount but never
//! overcount.

use crate::config::{DELAY_INTERVAL_MS, FREE_LIST_SIZE, MAX_DELAY_COUNT, PAGE_SIZE, SPAN_PAGES};
use crate::page_cache::PageCache;
use crate::size_class::class_to_size;
use crate::span_tracker::{SpanTracker, TrackerRegistry};
use crate::stat_inc;
use crate::sync::SpinMutex;
use core::ptr;
use std::sync::LazyLock;
use std::time::Instant;

/// An intrusive free-list node stored inside freed memory. The `next`
/// pointer occupies the first word of the free block.
#[repr(C)]
pub struct FreeBlock {
    pub next: *mut FreeBlock,
}

/// Free list and delayed-return state of one size class. All fields are
/// guarded by the class's spinlock; the lock acquisition is the
/// linearization point for every operation on the class.
pub struct CentralFreeList {
    /// Head of the intrusive free list.
    head: *mut FreeBlock,
    /// Number of blocks currently on the list.
    len: usize,
    /// Return operations since the last delayed-return pass.
    delay_count: usize,
    /// Steady-clock time of the last pass; 0 means the timer is unarmed.
    last_return_ms: u64,
}

// SAFETY: only accessed through the enclosing SpinMutex.
unsafe impl Send for CentralFreeList {}

impl CentralFreeList {
    const fn new() -> Self {
        Self {
            head: ptr::null_mut(),
            len: 0,
            delay_count: 0,
            last_return_ms: 0,
        }
    }
}

/// Steady-clock anchor. Timestamps are stored as milliseconds since the
/// first use, offset by one so 0 stays reserved as the unarmed sentinel.
static EPOCH: LazyLock<Instant> = LazyLock::new(Instant::now);

fn now_ms() -> u64 {
    EPOCH.elapsed().as_millis() as u64 + 1
}

/// Size-classed central reservoir of free blocks.
pub struct CentralCache {
    classes: [SpinMutex<CentralFreeList>; FREE_LIST_SIZE],
    trackers: TrackerRegistry,
}

impl Default for CentralCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CentralCache {
    pub const fn new() -> Self {
        Self {
            classes: [const { SpinMutex::new(CentralFreeList::new()) }; FREE_LIST_SIZE],
            trackers: TrackerRegistry::new(),
        }
    }

    /// Remove up to `batch` blocks from class `index`, carving a new span
    /// from `pages` when the list runs dry.
    ///
    /// Returns the number of blocks taken and the head of a
    /// null-terminated chain linked through [`FreeBlock::next`]; `(0,
    /// null)` when the page cache is out of memory. The chain is disjoint
    /// from the published free list.
    ///
    /// # Safety
    /// Every block reachable from the class list must be idle memory of
    /// this class's block size.
    pub unsafe fn fetch_range(
        &self,
        index: usize,
        batch: usize,
        pages: &PageCache,
    ) -> (usize, *mut FreeBlock) {
        if index >= FREE_LIST_SIZE || batch == 0 {
            return (0, ptr::null_mut());
        }
        stat_inc!(central_fetches);
        let block_size = class_to_size(index);

        let mut list = self.classes[index].lock();
        let mut head: *mut FreeBlock = ptr::null_mut();
        let mut count = 0;

        while count < batch {
            if list.head.is_null() && !unsafe { self.populate(&mut list, index, block_size, pages) } {
                break;
            }
            let block = list.head;
            unsafe {
                list.head = (*block).next;
                (*block).next = head;
            }
            head = block;
            list.len -= 1;
            count += 1;

            match self.trackers.lookup(block as *const u8, index) {
                Some(t) => t.sub_free(1),
                None => panic!("block {block:p} fetched from class {index} has no span tracker"),
            }
        }

        (count, head)
    }

    /// Accept a chain of `total_bytes / block_size` blocks back into class
    /// `index`, then run the delayed-return pass if either trigger fired.
    ///
    /// # Safety
    /// The chain must consist of idle blocks previously fetched from this
    /// class, linked through their first words and owned by the caller.
    pub unsafe fn return_range(
        &self,
        start: *mut FreeBlock,
        total_bytes: usize,
        index: usize,
        pages: &PageCache,
    ) {
        if start.is_null() || index >= FREE_LIST_SIZE {
            return;
        }
        stat_inc!(central_returns);
        let block_size = class_to_size(index);
        let expected = (total_bytes / block_size).max(1);

        // Locate the tail while the chain is still caller-private.
        let mut tail = start;
        let mut count = 1;
        while count < expected {
            let next = unsafe { (*tail).next };
            if next.is_null() {
                break;
            }
            tail = next;
            count += 1;
        }
        debug_assert!(
            unsafe { (*tail).next }.is_null(),
            "returned chain longer than its declared byte size"
        );

        let mut list = self.classes[index].lock();
        unsafe { (*tail).next = list.head };
        list.head = start;
        list.len += count;
        list.delay_count += 1;

        let now = now_ms();
        if list.last_return_ms == 0 {
            // First return on this class: arm the timer without triggering.
            list.last_return_ms = now;
        }
        if list.delay_count >= MAX_DELAY_COUNT || now - list.last_return_ms >= DELAY_INTERVAL_MS {
            unsafe { self.delayed_return(&mut list, index, pages, now) };
        }
    }

    /// Blocks currently on the central free list of a class.
    pub fn list_len(&self, index: usize) -> usize {
        self.classes[index].lock().len
    }

    /// Live spans across all classes.
    pub fn live_spans(&self) -> usize {
        self.trackers.live_spans()
    }

    /// Carve a fresh span into `block_count` blocks and publish them as
    /// the class free list. Returns false on page-cache OOM.
    unsafe fn populate(
        &self,
        list: &mut CentralFreeList,
        index: usize,
        block_size: usize,
        pages: &PageCache,
    ) -> bool {
        debug_assert!(list.head.is_null());

        let num_pages = if block_size <= SPAN_PAGES * PAGE_SIZE {
            SPAN_PAGES
        } else {
            block_size.div_ceil(PAGE_SIZE)
        };
        let span = pages.allocate_span(num_pages);
        if span.is_null() {
            return false;
        }

        let span_bytes = num_pages * PAGE_SIZE;
        let block_count = span_bytes / block_size;

        // Thread the blocks head-to-tail, last block first.
        let mut chain: *mut FreeBlock = ptr::null_mut();
        for i in (0..block_count).rev() {
            let block = unsafe { span.add(i * block_size) } as *mut FreeBlock;
            unsafe { (*block).next = chain };
            chain = block;
        }

        list.head = chain;
        list.len += block_count;
        self.trackers
            .register(span as usize, num_pages, block_count, block_count, index);
        stat_inc!(spans_carved);
        true
    }

    /// Reconcile span accounting for one class and release idle spans.
    /// Runs under the class lock.
    unsafe fn delayed_return(
        &self,
        list: &mut CentralFreeList,
        index: usize,
        pages: &PageCache,
        now: u64,
    ) {
        list.delay_count = 0;
        list.last_return_ms = now;
        stat_inc!(delayed_return_runs);

        // Recount: free_count := this span's blocks currently on the list.
        // The tally lives in the trackers themselves, so the pass never
        // allocates. Counting by membership makes repeated passes
        // idempotent — each block contributes to exactly one tally.
        self.trackers.for_each_in_class(index, SpanTracker::reset_free);
        let mut block = list.head;
        while !block.is_null() {
            match self.trackers.lookup(block as *const u8, index) {
                Some(t) => t.add_free(1),
                None => panic!("block {block:p} in class {index} free list has no span tracker"),
            }
            block = unsafe { (*block).next };
        }

        // Release every span whose blocks are all back on the list.
        self.trackers.for_each_in_class(index, |t| {
            let free = t.free_count();
            let total = t.block_count();
            assert!(
                free <= total,
                "span {:#x}: free_count {free} exceeds block_count {total}",
                t.span_addr()
            );
            if free == total {
                let base = t.span_addr();
                let num_pages = t.num_pages();
                let removed = unsafe { Self::splice_out_span(&mut *list, base, t.byte_size()) };
                assert!(
                    removed == total,
                    "span {base:#x}: spliced {removed} blocks, expected {total}"
                );
                unsafe { pages.deallocate_span(base as *mut u8, num_pages) };
                self.trackers.retire(t);
                stat_inc!(spans_released);
            }
        });
    }

    /// Remove every block lying inside `[base, base + bytes)` from the
    /// list. Standard singly-linked filter: `current` advances on every
    /// iteration, `prev` only when the node is retained.
    unsafe fn splice_out_span(list: &mut CentralFreeList, base: usize, bytes: usize) -> usize {
        let mut removed = 0;
        let mut prev: *mut FreeBlock = ptr::null_mut();
        let mut current = list.head;
        while !current.is_null() {
            let next = unsafe { (*current).next };
            let addr = current as usize;
            if addr >= base && addr < base + bytes {
                if prev.is_null() {
                    list.head = next;
                } else {
                    unsafe { (*prev).next = next };
                }
                removed += 1;
            } else {
                prev = current;
            }
            current = next;
        }
        list.len -= removed;
        removed
    }

    #[cfg(test)]
    fn force_delayed_return(&self, index: usize, pages: &PageCache) {
        let mut list = self.classes[index].lock();
        unsafe { self.delayed_return(&mut list, index, pages, now_ms()) };
    }

    #[cfg(test)]
    fn sum_free_counts(&self, index: usize) -> usize {
        let mut sum = 0;
        self.trackers.for_each_in_class(index, |t| sum += t.free_count());
        sum
    }

    #[cfg(test)]
    fn live_spans_in_class(&self, index: usize) -> usize {
        let mut n = 0;
        self.trackers.for_each_in_class(index, |_| n += 1);
        n
    }
}
