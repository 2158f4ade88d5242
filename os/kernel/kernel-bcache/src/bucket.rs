//! One lock-protected partition of the slot pool.

use crate::error::{SlotViolation, fatal};
use crate::{BlockBuf, BlockId};
use core::sync::atomic::{AtomicBool, Ordering};
use kernel_info::fs::BLOCK_SIZE;
use kernel_sync::{SleepLock, SpinMutex};

/// Membership of one slot. Only touched under the bucket lock.
#[derive(Copy, Clone, Debug)]
pub(crate) struct SlotMeta {
    /// `None` until the slot caches its first block.
    pub block: Option<BlockId>,
    pub refs: u32,
}

impl SlotMeta {
    const UNBOUND: Self = Self {
        block: None,
        refs: 0,
    };
}

/// Content of one slot.
pub(crate) struct Slot {
    /// Whether `data` holds the block's content. Cleared under the bucket
    /// lock when the slot is rebound, set under the content lock when loaded.
    pub valid: AtomicBool,
    pub data: SleepLock<BlockBuf>,
}

impl Slot {
    const fn new() -> Self {
        Self {
            valid: AtomicBool::new(false),
            data: SleepLock::new([0; BLOCK_SIZE]),
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }
}

/// Outcome of [`Bucket::claim`].
pub(crate) enum Claim {
    /// The block was resident at this index and gained a reference.
    Hit(usize),
    /// The slot at this index was (re)bound to the block.
    Bound {
        index: usize,
        evicted: Option<BlockId>,
    },
    /// Every slot is referenced.
    Full,
}

pub(crate) struct Bucket<const SLOTS: usize> {
    meta: SpinMutex<[SlotMeta; SLOTS]>,
    slots: [Slot; SLOTS],
}

impl<const SLOTS: usize> Bucket<SLOTS> {
    pub const fn new() -> Self {
        Self {
            meta: SpinMutex::new([SlotMeta::UNBOUND; SLOTS]),
            slots: [const { Slot::new() }; SLOTS],
        }
    }

    #[inline]
    pub fn slot(&self, index: usize) -> &Slot {
        &self.slots[index]
    }

    /// Take a reference to the slot caching `block`, binding one if needed.
    ///
    /// A miss prefers a slot that never cached anything, then the first
    /// unreferenced one in array order. Referenced slots are never rebound.
    pub fn claim(&self, bucket: usize, block: BlockId) -> Claim {
        let mut meta = self.meta.lock();

        if let Some(index) = meta.iter().position(|m| m.block == Some(block)) {
            let Some(refs) = meta[index].refs.checked_add(1) else {
                drop(meta);
                fatal(SlotViolation::RefCountOverflow {
                    bucket,
                    index,
                    block,
                });
            };
            meta[index].refs = refs;
            return Claim::Hit(index);
        }

        let victim = meta
            .iter()
            .position(|m| m.block.is_none())
            .or_else(|| meta.iter().position(|m| m.refs == 0));
        let Some(index) = victim else {
            return Claim::Full;
        };

        // Unreferenced, so nobody holds or waits for the content lock.
        self.slots[index].valid.store(false, Ordering::Release);
        let evicted = meta[index].block.replace(block);
        meta[index].refs = 1;
        Claim::Bound { index, evicted }
    }

    /// Whether some slot could be claimed for a new block right now.
    pub fn has_unreferenced(&self) -> bool {
        self.meta.lock().iter().any(|m| m.refs == 0)
    }

    /// Add a reference to the slot at `index`, which must still cache `block`.
    pub fn retain(&self, bucket: usize, index: usize, block: BlockId) -> u32 {
        self.adjust(bucket, index, block, |refs| {
            refs.checked_add(1).ok_or(SlotViolation::RefCountOverflow {
                bucket,
                index,
                block,
            })
        })
    }

    /// Drop a reference to the slot at `index`, which must still cache `block`.
    pub fn unref(&self, bucket: usize, index: usize, block: BlockId) -> u32 {
        self.adjust(bucket, index, block, |refs| {
            refs.checked_sub(1).ok_or(SlotViolation::RefCountUnderflow {
                bucket,
                index,
                block,
            })
        })
    }

    fn adjust(
        &self,
        bucket: usize,
        index: usize,
        block: BlockId,
        f: impl FnOnce(u32) -> Result<u32, SlotViolation>,
    ) -> u32 {
        let mut meta = self.meta.lock();
        let slot = &mut meta[index];
        let result = if slot.block == Some(block) {
            f(slot.refs)
        } else {
            Err(SlotViolation::IdentityLost {
                bucket,
                index,
                block,
            })
        };
        match result {
            Ok(refs) => {
                slot.refs = refs;
                refs
            }
            Err(violation) => {
                drop(meta);
                fatal(violation)
            }
        }
    }

    /// Snapshot of the slot caching `block`, if resident.
    pub fn find(&self, block: BlockId) -> Option<(usize, SlotMeta)> {
        let meta = self.meta.lock();
        meta.iter()
            .position(|m| m.block == Some(block))
            .map(|index| (index, meta[index]))
    }
}
