//! # Kernel synchronization primitives
//!
//! All locks are a [`Mutex`] over a raw lock that decides how waiters wait:
//!
//! | Alias | Raw lock | Use |
//! |-------|----------|-----|
//! | [`SpinMutex`] | [`RawSpin`] | short metadata sections, e.g. one cache bucket |
//! | [`TicketMutex`] | [`RawTicket`] | short sections with many contenders; FIFO fair |
//! | [`SleepLock`] | [`RawSleep`] | long holds that may block, e.g. across disk I/O |
//!
//! A [`SleepLock`] must never be acquired while a spin-type lock is held.

#![cfg_attr(not(any(test, doctest, feature = "std")), no_std)]
#![allow(unsafe_code)]

mod mutex;
mod raw_sleep;
mod raw_spin;
mod raw_ticket;

pub use mutex::{Mutex, MutexGuard};
pub use raw_sleep::{RawSleep, relax};
pub use raw_spin::RawSpin;
pub use raw_ticket::RawTicket;

pub type SpinMutex<T> = Mutex<T, RawSpin>;
pub type TicketMutex<T> = Mutex<T, RawTicket>;
pub type SleepLock<T> = Mutex<T, RawSleep>;

pub type SpinMutexGuard<'a, T> = MutexGuard<'a, T, RawSpin>;
pub type TicketMutexGuard<'a, T> = MutexGuard<'a, T, RawTicket>;
pub type SleepLockGuard<'a, T> = MutexGuard<'a, T, RawSleep>;

impl<T> SpinMutex<T> {
    pub const fn new(value: T) -> Self {
        Self::from_raw(RawSpin::new(), value)
    }
}

impl<T> TicketMutex<T> {
    pub const fn new(value: T) -> Self {
        Self::from_raw(RawTicket::new(), value)
    }
}

impl<T> SleepLock<T> {
    pub const fn new(value: T) -> Self {
        Self::from_raw(RawSleep::new(), value)
    }
}

pub trait RawLock {
    fn raw_lock(&self);
    fn raw_try_lock(&self) -> bool;
    /// Snapshot of the lock state; may be stale as soon as it is returned.
    fn raw_is_locked(&self) -> bool;
}

pub trait RawUnlock {
    /// # Safety
    /// The caller must own the lock.
    unsafe fn raw_unlock(&self);
}
