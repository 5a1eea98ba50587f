//! Spinlocks for the allocator's shared tiers.
//!
//! Three structures need mutual exclusion: a size class's
//! `CentralFreeList`, the span tracker registry's writer side, and the
//! page cache's recycle lists. All of them keep their critical sections
//! to a bounded list splice, so a test-and-set lock that yields to the
//! scheduler between attempts is enough — and `std::sync::Mutex` is off
//! the table anyway, since it may allocate and these locks sit inside
//! the allocator.

use crate::stat_inc;
use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

/// Test-and-set spinlock. Acquisition is the linearization point for
/// whatever state the lock guards.
pub struct SpinLock {
    held: AtomicBool,
}

impl SpinLock {
    pub const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }

    /// Acquire the lock, yielding the thread between failed attempts.
    #[inline]
    pub fn lock(&self) {
        if !self.held.swap(true, Ordering::Acquire) {
            return;
        }
        self.lock_contended();
    }

    /// Contended path. Counted, so tests can verify that traffic on
    /// disjoint size classes never meets on a lock. Critical sections
    /// here are short list splices; the holder is typically gone after
    /// a yield or two.
    #[cold]
    fn lock_contended(&self) {
        stat_inc!(lock_contentions);
        while self.held.swap(true, Ordering::Acquire) {
            std::thread::yield_now();
        }
    }

    #[inline]
    pub fn unlock(&self) {
        self.held.store(false, Ordering::Release);
    }

    /// Acquire only if free. Used where waiting is pointless.
    #[inline]
    pub fn try_lock(&self) -> bool {
        !self.held.swap(true, Ordering::Acquire)
    }
}

impl Default for SpinLock {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for SpinLock {}
unsafe impl Sync for SpinLock {}

/// A [`SpinLock`] wrapping its protected state, const-constructible so a
/// per-class array of these can live in a `static`. Access goes through
/// an RAII guard, which keeps the lock released on every exit path —
/// including unwinding out of a failed accounting assertion.
pub struct SpinMutex<T> {
    lock: SpinLock,
    state: UnsafeCell<T>,
}

impl<T> SpinMutex<T> {
    pub const fn new(state: T) -> Self {
        Self {
            lock: SpinLock::new(),
            state: UnsafeCell::new(state),
        }
    }

    #[inline]
    pub fn lock(&self) -> SpinMutexGuard<'_, T> {
        self.lock.lock();
        SpinMutexGuard { owner: self }
    }

    #[inline]
    pub fn try_lock(&self) -> Option<SpinMutexGuard<'_, T>> {
        if self.lock.try_lock() {
            Some(SpinMutexGuard { owner: self })
        } else {
            None
        }
    }
}

unsafe impl<T: Send> Send for SpinMutex<T> {}
unsafe impl<T: Send> Sync for SpinMutex<T> {}

/// Exclusive view of a [`SpinMutex`]'s state. Unlocks on drop.
pub struct SpinMutexGuard<'a, T> {
    owner: &'a SpinMutex<T>,
}

impl<T> Deref for SpinMutexGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { &*self.owner.state.get() }
    }
}

impl<T> DerefMut for SpinMutexGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.owner.state.get() }
    }
}

impl<T> Drop for SpinMutexGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        self.owner.lock.unlock();
    }
}
