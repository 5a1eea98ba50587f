//! Walks the allocator through its three tiers: thread-cache reuse,
//! watermark drains into the central cache, a delayed-return pass handing
//! an idle span back to the page cache, page-budget exhaustion, and lock
//! independence of disjoint size classes.

use rsmempool::central_cache::CentralCache;
use rsmempool::config::{MAX_DELAY_COUNT, PAGE_SIZE, SPAN_PAGES};
use rsmempool::page_cache::PageCache;
use rsmempool::size_class::{class_index, class_to_size};
use rsmempool::{allocate, deallocate};

// A private middle tier for the span-lifecycle sections, so their page
// traffic is observable in isolation from the process-wide singletons.
static CENTRAL: CentralCache = CentralCache::new();

fn main() {
    println!("rsmempool demo");
    println!("==============\n");

    thread_cache_reuse();
    watermark_churn();
    span_lifecycle();
    page_budget();
    class_independence();

    #[cfg(feature = "stats")]
    {
        let snap = rsmempool::stats::snapshot();
        println!("\nProcess-wide stats:");
        println!("  allocations:         {}", snap.alloc_count);
        println!("  thread cache hits:   {}", snap.thread_cache_hits);
        println!("  thread cache misses: {}", snap.thread_cache_misses);
        println!("  central returns:     {}", snap.central_returns);
        println!("  delayed-return runs: {}", snap.delayed_return_runs);
        println!("  spans carved:        {}", snap.spans_carved);
        println!("  spans released:      {}", snap.spans_released);
        println!("  OS mappings:         {}", snap.os_map_count);
        println!("  lock contentions:    {}", snap.lock_contentions);
    }

    println!("\nDone.");
}

/// A freed block parks in this thread's cache and the next allocation of
/// the same class pops it straight back.
fn thread_cache_reuse() {
    let first = allocate(24);
    assert!(!first.is_null());
    unsafe {
        first.write_bytes(0xA5, 24);
        deallocate(first, 24);
    }
    let second = allocate(24);
    println!(
        "Thread cache: freed 24 B block {first:p} came back as {second:p} (LIFO reuse: {})",
        first == second
    );
    unsafe { deallocate(second, 24) };
}

/// Churn one size class past its high-water mark so the thread cache
/// drains batches into the central free list.
fn watermark_churn() {
    const SIZE: usize = 56;
    const N: usize = 2000;

    #[cfg(feature = "stats")]
    let before = rsmempool::stats::snapshot();

    let ptrs: Vec<*mut u8> = (0..N).map(|_| allocate(SIZE)).collect();
    assert!(ptrs.iter().all(|p| !p.is_null()));
    for ptr in ptrs {
        unsafe { deallocate(ptr, SIZE) };
    }

    #[cfg(feature = "stats")]
    {
        let after = rsmempool::stats::snapshot();
        println!(
            "Watermark:    {N} x {SIZE} B churned; {} watermark drains pushed {} chains back to the central list",
            after.thread_cache_flushes - before.thread_cache_flushes,
            after.central_returns - before.central_returns,
        );
    }
    #[cfg(not(feature = "stats"))]
    println!("Watermark:    {N} x {SIZE} B churned through the thread cache");
}

/// Drive a span through its whole life on the demo's own central cache:
/// carve, single-block round trips, and the delayed-return pass that
/// finds the span idle and hands it back whole.
fn span_lifecycle() {
    let index = class_index(96);
    let block_size = class_to_size(index);
    let pages = PageCache::new();

    unsafe {
        let (count, block) = CENTRAL.fetch_range(index, 1, &pages);
        assert_eq!(count, 1);
        let blocks = (SPAN_PAGES * PAGE_SIZE) / block_size;
        println!(
            "Span carve:   one {SPAN_PAGES}-page span became {blocks} blocks of {block_size} B"
        );
        CENTRAL.return_range(block, block_size, index, &pages);

        // Every return bumps the class's delay counter; once it crosses
        // MAX_DELAY_COUNT the reconciliation pass runs, finds all blocks
        // back on the list, and releases the span.
        let mut cycles = 1;
        for _ in 0..2 * MAX_DELAY_COUNT {
            if pages.spans_returned() == 1 {
                break;
            }
            let (_, b) = CENTRAL.fetch_range(index, 1, &pages);
            CENTRAL.return_range(b, block_size, index, &pages);
            cycles += 1;
        }
        println!(
            "Span release: after {cycles} returns the delayed-return pass released the idle span \
             (page cache now holds {} cached span)",
            pages.cached_spans()
        );
    }
}

/// A page budget turns span requests into clean OOM: fetches come back
/// empty until the budget is raised.
fn page_budget() {
    let index = class_index(1024);
    let budgeted = PageCache::with_budget(0);

    unsafe {
        let (count, _) = CENTRAL.fetch_range(index, 1, &budgeted);
        println!("Page budget:  0 pages -> fetch returned {count} blocks (null allocation)");

        budgeted.set_budget_pages(SPAN_PAGES);
        let (count, block) = CENTRAL.fetch_range(index, 1, &budgeted);
        println!("              {SPAN_PAGES} pages -> fetch returned {count} block");
        CENTRAL.return_range(block, class_to_size(index), index, &budgeted);
    }
}

/// Two threads hammering disjoint size classes take disjoint class locks.
/// Each working set fits inside one already-carved span and a pinned
/// block keeps that span alive, so after warm-up neither thread reaches
/// a shared lock.
fn class_independence() {
    use std::sync::{Arc, Barrier};

    fn worker(size: usize, working_set: usize, rounds: usize, warmed: Arc<Barrier>, go: Arc<Barrier>) {
        // Leaked on purpose: a live block keeps the span from being
        // released back to the page cache mid-run.
        let pin = allocate(size);
        assert!(!pin.is_null());

        // Warm up: carve the span and fill the thread cache before the
        // measured window opens.
        let mut ptrs = Vec::with_capacity(working_set);
        for _ in 0..working_set {
            let ptr = allocate(size);
            assert!(!ptr.is_null());
            ptrs.push(ptr);
        }
        for ptr in ptrs.drain(..) {
            unsafe { deallocate(ptr, size) };
        }

        warmed.wait();
        go.wait();

        for _ in 0..rounds {
            for _ in 0..working_set {
                let ptr = allocate(size);
                assert!(!ptr.is_null());
                ptrs.push(ptr);
            }
            for ptr in ptrs.drain(..) {
                unsafe { deallocate(ptr, size) };
            }
        }
    }

    let warmed = Arc::new(Barrier::new(3));
    let go = Arc::new(Barrier::new(3));
    let handles: Vec<_> = [(40usize, 600usize), (160, 120)]
        .into_iter()
        .map(|(size, working_set)| {
            let warmed = Arc::clone(&warmed);
            let go = Arc::clone(&go);
            std::thread::spawn(move || worker(size, working_set, 100, warmed, go))
        })
        .collect();

    warmed.wait();
    #[cfg(feature = "stats")]
    let before = rsmempool::stats::snapshot();
    go.wait();

    for h in handles {
        h.join().unwrap();
    }

    #[cfg(feature = "stats")]
    {
        let after = rsmempool::stats::snapshot();
        println!(
            "Independence: 2 threads on 40 B / 160 B classes finished with {} lock contentions",
            after.lock_contentions - before.lock_contentions
        );
    }
    #[cfg(not(feature = "stats"))]
    println!("Independence: 2 threads on 40 B / 160 B classes finished");
}
