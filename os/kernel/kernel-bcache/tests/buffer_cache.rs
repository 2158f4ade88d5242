use kernel_bcache::{BlockBuf, BlockDevice, BlockId, BufferCache, CacheError, SlotInfo};
use kernel_info::fs::BLOCK_SIZE;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DiskError(BlockId);

/// A RAM disk that counts transfers and can be told to fail.
struct MemDisk {
    blocks: Mutex<BTreeMap<BlockId, BlockBuf>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    failing: AtomicBool,
}

impl MemDisk {
    const fn new() -> Self {
        Self {
            blocks: Mutex::new(BTreeMap::new()),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn stored(&self, block: BlockId) -> BlockBuf {
        self.blocks
            .lock()
            .unwrap()
            .get(&block)
            .copied()
            .unwrap_or_else(|| factory_content(block))
    }
}

/// What a block holds before anybody wrote it.
fn factory_content(block: BlockId) -> BlockBuf {
    [(block.dev * 31 + block.blockno) as u8; BLOCK_SIZE]
}

impl BlockDevice for MemDisk {
    type Error = DiskError;

    fn read_block(&self, block: BlockId, buf: &mut BlockBuf) -> Result<(), DiskError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DiskError(block));
        }
        self.reads.fetch_add(1, Ordering::SeqCst);
        *buf = self.stored(block);
        Ok(())
    }

    fn write_block(&self, block: BlockId, buf: &BlockBuf) -> Result<(), DiskError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DiskError(block));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.blocks.lock().unwrap().insert(block, *buf);
        Ok(())
    }
}

fn counter(buf: &BlockBuf) -> u32 {
    u32::from_le_bytes(buf[..4].try_into().unwrap())
}

fn set_counter(buf: &mut BlockBuf, value: u32) {
    buf[..4].copy_from_slice(&value.to_le_bytes());
}

fn small<const BUCKETS: usize, const SLOTS: usize>() -> Arc<BufferCache<MemDisk, BUCKETS, SLOTS>> {
    Arc::new(BufferCache::new(MemDisk::new()))
}

#[test]
fn first_acquire_binds_an_invalid_slot_and_loads_once() {
    static CACHE: BufferCache<MemDisk> = BufferCache::new(MemDisk::new());
    let block = BlockId::new(1, 5);

    assert_eq!(CACHE.resident(block), None);

    let mut slot = CACHE.acquire(block);
    assert_eq!(slot.bucket(), 5);
    assert!(!slot.is_valid());
    assert_eq!(
        CACHE.resident(block),
        Some(SlotInfo {
            bucket: 5,
            index: 0,
            ref_count: 1,
            valid: false
        })
    );

    slot.ensure_loaded().unwrap();
    slot.ensure_loaded().unwrap();
    assert_eq!(CACHE.device().reads(), 1);
    assert_eq!(slot.data(), &factory_content(block));
    slot.release();

    // unreferenced but still cached
    let info = CACHE.resident(block).unwrap();
    assert_eq!((info.ref_count, info.valid), (0, true));

    let again = CACHE.read(block).unwrap();
    assert_eq!((again.bucket(), again.index()), (info.bucket, info.index));
    assert_eq!(CACHE.device().reads(), 1);
}

#[test]
fn equal_block_numbers_on_different_devices_share_a_bucket_not_a_slot() {
    let cache = small::<13, 2>();
    let a = cache.read(BlockId::new(1, 5)).unwrap();
    let b = cache.read(BlockId::new(2, 5)).unwrap();

    assert_eq!(a.bucket(), b.bucket());
    assert_ne!(a.index(), b.index());
    assert_eq!(a.data(), &factory_content(BlockId::new(1, 5)));
    assert_eq!(b.data(), &factory_content(BlockId::new(2, 5)));
    assert_eq!((a.device(), a.block_no()), (1, 5));
    assert_eq!((b.device(), b.block_no()), (2, 5));
}

#[test]
fn concurrent_holders_of_one_block_share_a_slot_and_take_turns() {
    static CACHE: BufferCache<MemDisk> = BufferCache::new(MemDisk::new());
    let block = BlockId::new(1, 7);
    let threads = 8;
    let iters = 200;

    let start = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                let mut seen = Vec::new();
                for _ in 0..iters {
                    let mut slot = CACHE.read(block).unwrap();
                    seen.push((slot.bucket(), slot.index()));
                    let value = counter(slot.data());
                    thread::yield_now();
                    set_counter(slot.data_mut(), value + 1);
                }
                seen
            })
        })
        .collect();

    let mut identities: Vec<_> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    identities.dedup();
    assert_eq!(identities.len(), 1, "block served from more than one slot");

    let initial = counter(&factory_content(block));
    let slot = CACHE.acquire(block);
    assert_eq!(counter(slot.data()), initial + (threads * iters) as u32);
    assert_eq!(CACHE.device().reads(), 1);
}

#[test]
fn written_back_content_survives_eviction() {
    let cache = small::<1, 1>();
    let block = BlockId::new(1, 3);

    let mut slot = cache.read(block).unwrap();
    slot.data_mut().fill(0xEE);
    slot.write_back().unwrap();
    slot.release();
    assert_eq!(cache.device().writes(), 1);

    // the only slot gets recycled for another block
    let other = cache.read(BlockId::new(1, 4)).unwrap();
    assert_eq!(cache.resident(block), None);
    other.release();

    let slot = cache.read(block).unwrap();
    assert_eq!(cache.device().reads(), 3);
    assert!(slot.data().iter().all(|&b| b == 0xEE));
}

#[test]
fn never_used_slots_are_taken_before_resident_blocks_are_recycled() {
    let cache = small::<1, 3>();
    let first = BlockId::new(1, 1);

    cache.read(first).unwrap().release();
    cache.read(BlockId::new(1, 2)).unwrap().release();
    cache.read(BlockId::new(1, 3)).unwrap().release();
    assert!(cache.resident(first).is_some());

    // bucket full of unreferenced blocks: the first one in order goes
    cache.read(BlockId::new(1, 4)).unwrap().release();
    assert_eq!(cache.resident(first), None);
    assert_eq!(cache.resident(BlockId::new(1, 4)).unwrap().index, 0);
}

#[test]
fn pinned_slot_outlives_its_handle_until_unpinned() {
    let cache = small::<1, 1>();
    let block = BlockId::new(1, 9);

    let slot = cache.read(block).unwrap();
    let pin = slot.pin();
    assert_eq!(cache.resident(block).unwrap().ref_count, 2);
    slot.release();
    assert_eq!(cache.resident(block).unwrap().ref_count, 1);

    // the pinned slot is exempt from recycling
    assert!(matches!(
        cache.try_acquire(BlockId::new(1, 10)),
        Err(CacheError::Exhausted { bucket: 0, .. })
    ));

    // still resident and still loaded for the next holder
    let slot = cache.acquire(block);
    assert!(slot.is_valid());
    slot.release();

    assert_eq!(pin.block(), block);
    pin.unpin();
    assert_eq!(cache.resident(block).unwrap().ref_count, 0);
    assert!(cache.try_acquire(BlockId::new(1, 10)).is_ok());
}

#[test]
fn full_bucket_fails_try_acquire_and_never_rebinds_a_referenced_slot() {
    let cache = small::<1, 2>();
    let a = cache.read(BlockId::new(1, 1)).unwrap();
    let b = cache.read(BlockId::new(1, 2)).unwrap();

    assert_eq!(
        cache.try_acquire(BlockId::new(1, 3)).err(),
        Some(CacheError::Exhausted {
            bucket: 0,
            block: BlockId::new(1, 3)
        })
    );
    assert_eq!(cache.resident(BlockId::new(1, 1)).unwrap().ref_count, 1);
    assert_eq!(cache.resident(BlockId::new(1, 2)).unwrap().ref_count, 1);
    assert_eq!(a.data(), &factory_content(BlockId::new(1, 1)));
    assert_eq!(b.data(), &factory_content(BlockId::new(1, 2)));
}

#[test]
fn acquire_on_a_full_bucket_waits_for_a_release() {
    let cache = small::<1, 2>();
    let a = cache.read(BlockId::new(1, 1)).unwrap();
    let b = cache.read(BlockId::new(1, 2)).unwrap();
    let b_index = b.index();

    let done = Arc::new(AtomicBool::new(false));
    let waiter = {
        let cache = Arc::clone(&cache);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let slot = cache.read(BlockId::new(1, 3)).unwrap();
            done.store(true, Ordering::SeqCst);
            slot.index()
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert!(!done.load(Ordering::SeqCst), "referenced slot was rebound");
    assert_eq!(a.data(), &factory_content(BlockId::new(1, 1)));

    b.release();
    assert_eq!(waiter.join().unwrap(), b_index);
    assert!(done.load(Ordering::SeqCst));
    assert_eq!(cache.resident(BlockId::new(1, 1)).unwrap().ref_count, 1);
    assert_eq!(cache.resident(BlockId::new(1, 2)), None);
}

#[test]
fn blocks_in_other_buckets_are_not_held_up_by_a_full_bucket() {
    let cache = small::<2, 1>();
    // fill bucket 0 and keep a waiter spinning on it
    let held = cache.acquire(BlockId::new(1, 0));
    let waiter = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || cache.acquire(BlockId::new(1, 2)).bucket())
    };

    let other = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || cache.read(BlockId::new(1, 1)).unwrap().bucket())
    };
    assert_eq!(other.join().unwrap(), 1);

    drop(held);
    assert_eq!(waiter.join().unwrap(), 0);
}

#[test]
fn a_slow_holder_does_not_block_lookups_of_other_blocks_in_its_bucket() {
    let cache = small::<1, 4>();
    let slow = cache.read(BlockId::new(1, 1)).unwrap();

    let other = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            let slot = cache.read(BlockId::new(1, 2)).unwrap();
            slot.data()[0]
        })
    };
    assert_eq!(other.join().unwrap(), factory_content(BlockId::new(1, 2))[0]);
    drop(slow);
}

#[test]
fn device_failures_reach_the_caller_unchanged() {
    let cache = small::<1, 2>();
    let block = BlockId::new(1, 6);

    cache.device().failing.store(true, Ordering::SeqCst);
    let mut slot = cache.acquire(block);
    assert_eq!(slot.ensure_loaded(), Err(DiskError(block)));
    assert!(!slot.is_valid());
    assert_eq!(slot.write_back(), Err(DiskError(block)));
    slot.release();

    assert_eq!(cache.read(block).err(), Some(DiskError(block)));
    assert_eq!(cache.resident(block).unwrap().ref_count, 0);

    cache.device().failing.store(false, Ordering::SeqCst);
    let slot = cache.read(block).unwrap();
    assert!(slot.is_valid());
    assert_eq!(slot.data(), &factory_content(block));
}

#[test]
fn eviction_under_contention_loses_no_written_update() {
    let cache = small::<2, 2>();
    let threads = 8;
    let ops = 300;
    let blocks = 12_u32;

    let start = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let cache = Arc::clone(&cache);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                let mut state = 0x9E37_79B9_u32 ^ (t as u32 + 1);
                start.wait();
                for _ in 0..ops {
                    // xorshift32
                    state ^= state << 13;
                    state ^= state >> 17;
                    state ^= state << 5;
                    let block = BlockId::new(1, 100 + state % blocks);

                    let mut slot = cache.read(block).unwrap();
                    let value = counter(slot.data());
                    set_counter(slot.data_mut(), value + 1);
                    slot.write_back().unwrap();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    let total: u32 = (0..blocks)
        .map(|i| {
            let block = BlockId::new(1, 100 + i);
            counter(&cache.device().stored(block)) - counter(&factory_content(block))
        })
        .sum();
    assert_eq!(total, (threads * ops) as u32);
    for i in 0..blocks {
        if let Some(info) = cache.resident(BlockId::new(1, 100 + i)) {
            assert_eq!(info.ref_count, 0);
        }
    }
}
