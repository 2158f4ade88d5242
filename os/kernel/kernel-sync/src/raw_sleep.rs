use crate::{RawLock, RawUnlock};
use core::hint::spin_loop;
use core::sync::atomic::{AtomicBool, Ordering};

/// Polls before a waiter starts backing off.
const SPINS_BEFORE_BACKOFF: u32 = 64;

/// Raw lock for long holds.
///
/// A holder may block while holding it, e.g. across a full device I/O
/// round-trip. Waiters poll briefly, then back off between polls: with the
/// `std` feature they yield the thread, otherwise they pause for a burst of
/// spin hints. A slow holder costs waiters latency, not a hot cache line.
pub struct RawSleep {
    locked: AtomicBool,
}

impl Default for RawSleep {
    fn default() -> Self {
        Self::new()
    }
}

impl RawSleep {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    pub fn lock(&self) {
        let mut polls = 0_u32;
        while !self.try_lock() {
            while self.locked.load(Ordering::Relaxed) {
                if polls < SPINS_BEFORE_BACKOFF {
                    polls += 1;
                    spin_loop();
                } else {
                    relax();
                }
            }
        }
    }

    /// # Safety
    /// The caller must own the lock.
    #[inline]
    pub unsafe fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

/// Give other contexts a chance to run while polling for a condition.
///
/// Yields the thread with the `std` feature; otherwise pauses for a burst
/// of spin hints.
#[cfg(feature = "std")]
#[inline]
pub fn relax() {
    std::thread::yield_now();
}

/// Give other contexts a chance to run while polling for a condition.
///
/// Yields the thread with the `std` feature; otherwise pauses for a burst
/// of spin hints.
#[cfg(not(feature = "std"))]
#[inline]
pub fn relax() {
    for _ in 0..SPINS_BEFORE_BACKOFF {
        spin_loop();
    }
}

impl RawLock for RawSleep {
    fn raw_lock(&self) {
        self.lock();
    }

    fn raw_try_lock(&self) -> bool {
        self.try_lock()
    }

    fn raw_is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

impl RawUnlock for RawSleep {
    unsafe fn raw_unlock(&self) {
        unsafe { self.unlock() }
    }
}
