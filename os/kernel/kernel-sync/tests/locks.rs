use kernel_sync::{
    Mutex, RawLock, RawUnlock, SleepLock, SpinMutex, SpinMutexGuard, TicketMutex, TicketMutexGuard,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;
use std::{panic, thread};

#[test]
fn basic_lock_and_raii() {
    let l = SpinMutex::new(0_u32);

    // take the lock, mutate, and drop
    {
        let mut g: SpinMutexGuard<'_, u32> = l.lock();
        *g = 41;
    }

    // lock again; previous drop must have unlocked
    {
        let mut g = l.lock();
        *g += 1;
        assert_eq!(*g, 42);
    }
}

fn check_try_lock<R: RawLock + RawUnlock>(l: &Mutex<u8, R>) {
    let g1 = l.try_lock();
    assert!(g1.is_some());
    assert!(l.is_locked());

    // while held, try_lock must fail
    assert!(l.try_lock().is_none());

    drop(g1);
    assert!(!l.is_locked());
    assert!(l.try_lock().is_some());
}

#[test]
fn try_lock_semantics_for_every_flavor() {
    check_try_lock(&SpinMutex::new(1));
    check_try_lock(&TicketMutex::new(1));
    check_try_lock(&SleepLock::new(1));
}

#[test]
fn ticket_lock_survives_many_rounds() {
    let l = TicketMutex::new(0_u64);
    for _ in 0..10_000 {
        l.with_lock(|v| *v += 1);
    }
    let g: TicketMutexGuard<'_, u64> = l.lock();
    assert!(l.is_locked());
    drop(g);
    assert_eq!(l.with_lock(|v| *v), 10_000);
    assert!(!l.is_locked());
}

#[test]
fn get_mut_and_into_inner_skip_locking() {
    let mut l = SleepLock::new(vec![1, 2, 3]);
    l.get_mut().push(4);
    assert_eq!(l.lock().as_slice(), &[1, 2, 3, 4]);
    assert_eq!(l.into_inner(), vec![1, 2, 3, 4]);
}

fn hammer<R>(lock: Arc<Mutex<usize, R>>) -> usize
where
    R: RawLock + RawUnlock + Send + Sync + 'static,
{
    let threads = 8; // keep small for determinism
    let iters = 2_000;

    let in_cs = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let lock = Arc::clone(&lock);
            let in_cs = Arc::clone(&in_cs);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for _ in 0..iters {
                    lock.with_lock(|v| {
                        let prev = in_cs.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(prev, 0, "mutual exclusion violated");
                        *v += 1;
                        in_cs.fetch_sub(1, Ordering::SeqCst);
                    });
                    thread::yield_now();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(in_cs.load(Ordering::SeqCst), 0);
    lock.with_lock(|v| *v) / (threads * iters)
}

#[test]
fn contended_increments_are_exact_and_exclusive() {
    assert_eq!(hammer(Arc::new(SpinMutex::new(0))), 1);
    assert_eq!(hammer(Arc::new(TicketMutex::new(0))), 1);
    assert_eq!(hammer(Arc::new(SleepLock::new(0))), 1);
}

#[test]
fn sleep_lock_waiter_blocks_until_long_holder_releases() {
    let lock = Arc::new(SleepLock::new(0_u32));
    let acquired = Arc::new(AtomicBool::new(false));

    let guard = lock.lock();
    let waiter = {
        let lock = Arc::clone(&lock);
        let acquired = Arc::clone(&acquired);
        thread::spawn(move || {
            let mut g = lock.lock();
            acquired.store(true, Ordering::SeqCst);
            *g += 1;
        })
    };

    // a slow holder, e.g. waiting on a disk
    thread::sleep(Duration::from_millis(50));
    assert!(!acquired.load(Ordering::SeqCst));

    drop(guard);
    waiter.join().unwrap();
    assert!(acquired.load(Ordering::SeqCst));
    assert_eq!(*lock.lock(), 1);
}

#[test]
fn lock_is_released_on_panic() {
    let l = SpinMutex::new(0u32);

    let res = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        l.with_lock(|v| {
            *v = 123;
            panic!("boom");
        });
    }));
    assert!(res.is_err(), "expected panic");

    // We should be able to lock again right away.
    assert_eq!(l.with_lock(|v| *v), 123);
}

/// Spot-check concrete instantiations compile as Sync.
#[test]
fn locks_are_sync_for_send_t() {
    fn takes_sync<S: Sync>(_s: &S) {}
    takes_sync(&SpinMutex::new(0u8));
    takes_sync(&TicketMutex::new(0u8));
    takes_sync(&SleepLock::new([0u8; 16]));
}
