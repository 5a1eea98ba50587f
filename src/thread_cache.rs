//! Thread cache (front tier): per-thread free lists for lock-free
//! allocation.
//!
//! Each thread owns one `ThreadCache`; only that thread ever touches it,
//! so the fast path needs no synchronization at all. On a miss the cache
//! refills a batch from the central cache; when a class list outgrows its
//! high-water mark, half of it is drained back. The watermark scales
//! inversely with block size, so larger blocks return sooner and the
//! bytes parked per class stay bounded.

use crate::central_cache::{CentralCache, FreeBlock};
use crate::config::{
    FREE_LIST_SIZE, MAX_CACHED_BLOCKS, MAX_FETCH_BATCH, MIN_CACHED_BLOCKS,
    THREAD_CACHE_CLASS_BYTES,
};
use crate::page_cache::PageCache;
use crate::size_class::class_to_size;
use crate::stat_inc;
use core::ptr;

/// Blocks a thread may park in one class list before draining to the
/// central cache.
pub(crate) const fn high_watermark(index: usize) -> usize {
    let target = THREAD_CACHE_CLASS_BYTES / class_to_size(index);
    if target < MIN_CACHED_BLOCKS {
        MIN_CACHED_BLOCKS
    } else if target > MAX_CACHED_BLOCKS {
        MAX_CACHED_BLOCKS
    } else {
        target
    }
}

/// Blocks requested from the central cache on a miss.
pub(crate) const fn refill_batch(index: usize) -> usize {
    let batch = high_watermark(index) / 2;
    if batch == 0 {
        1
    } else if batch > MAX_FETCH_BATCH {
        MAX_FETCH_BATCH
    } else {
        batch
    }
}

/// Per-size-class free list within the thread cache.
struct FreeList {
    /// Head of the singly-linked intrusive free list.
    head: *mut FreeBlock,
    /// Number of blocks currently on this list.
    len: usize,
}

impl FreeList {
    const fn new() -> Self {
        Self {
            head: ptr::null_mut(),
            len: 0,
        }
    }

    #[inline]
    fn pop(&mut self) -> *mut FreeBlock {
        let block = self.head;
        if !block.is_null() {
            self.head = unsafe { (*block).next };
            self.len -= 1;
        }
        block
    }

    #[inline]
    fn push(&mut self, block: *mut FreeBlock) {
        unsafe { (*block).next = self.head };
        self.head = block;
        self.len += 1;
    }

    /// Push a linked chain of `count` blocks.
    fn push_chain(&mut self, head: *mut FreeBlock, count: usize) {
        if head.is_null() || count == 0 {
            return;
        }
        let mut tail = head;
        for _ in 1..count {
            let next = unsafe { (*tail).next };
            if next.is_null() {
                break;
            }
            tail = next;
        }
        unsafe { (*tail).next = self.head };
        self.head = head;
        self.len += count;
    }

    /// Pop up to `count` blocks into a chain. Returns (actual, head).
    fn pop_batch(&mut self, count: usize) -> (usize, *mut FreeBlock) {
        let mut head: *mut FreeBlock = ptr::null_mut();
        let mut popped = 0;
        while popped < count && !self.head.is_null() {
            let block = self.head;
            unsafe {
                self.head = (*block).next;
                (*block).next = head;
            }
            head = block;
            self.len -= 1;
            popped += 1;
        }
        (popped, head)
    }
}

/// Per-thread front-line cache: one free list per size class.
pub struct ThreadCache {
    lists: [FreeList; FREE_LIST_SIZE],
}

impl Default for ThreadCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadCache {
    pub const fn new() -> Self {
        Self {
            lists: [const { FreeList::new() }; FREE_LIST_SIZE],
        }
    }

    /// Allocate a block of size class `index`. Returns null when the
    /// lower tiers are out of memory.
    #[inline]
    pub unsafe fn allocate(
        &mut self,
        index: usize,
        central: &CentralCache,
        pages: &PageCache,
    ) -> *mut u8 {
        let block = self.lists[index].pop();
        if !block.is_null() {
            stat_inc!(thread_cache_hits);
            return block as *mut u8;
        }
        unsafe { self.refill(index, central, pages) }
    }

    /// Return a block of size class `index` to this cache, draining the
    /// class list when it crosses its high-water mark.
    #[inline]
    pub unsafe fn deallocate(
        &mut self,
        ptr: *mut u8,
        index: usize,
        central: &CentralCache,
        pages: &PageCache,
    ) {
        let list = &mut self.lists[index];
        list.push(ptr as *mut FreeBlock);
        if list.len > high_watermark(index) {
            unsafe { self.release_excess(index, central, pages) };
        }
    }

    /// Hand every cached block back to the central cache. Called when the
    /// owning thread exits.
    pub unsafe fn flush(&mut self, central: &CentralCache, pages: &PageCache) {
        for index in 0..FREE_LIST_SIZE {
            let list = &mut self.lists[index];
            if list.head.is_null() {
                continue;
            }
            let count = list.len;
            let (popped, head) = list.pop_batch(count);
            debug_assert_eq!(popped, count);
            unsafe { central.return_range(head, popped * class_to_size(index), index, pages) };
        }
    }

    /// Blocks currently parked for a size class.
    pub fn cached_blocks(&self, index: usize) -> usize {
        self.lists[index].len
    }

    /// Slow path: fetch a batch from the central cache, keep the first
    /// block for the caller, park the rest.
    #[cold]
    unsafe fn refill(
        &mut self,
        index: usize,
        central: &CentralCache,
        pages: &PageCache,
    ) -> *mut u8 {
        stat_inc!(thread_cache_misses);
        let (count, head) = unsafe { central.fetch_range(index, refill_batch(index), pages) };
        if count == 0 || head.is_null() {
            return ptr::null_mut();
        }

        let rest = unsafe { (*head).next };
        if count > 1 {
            self.lists[index].push_chain(rest, count - 1);
        }
        head as *mut u8
    }

    /// Drain half of an over-full class list to the central cache.
    unsafe fn release_excess(&mut self, index: usize, central: &CentralCache, pages: &PageCache) {
        stat_inc!(thread_cache_flushes);
        let list = &mut self.lists[index];
        let (count, head) = list.pop_batch(list.len / 2);
        if count > 0 {
            unsafe { central.return_range(head, count * class_to_size(index), index, pages) };
        }
    }
}
