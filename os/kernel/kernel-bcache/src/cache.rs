use crate::bucket::{Bucket, Claim};
use crate::{BlockDevice, BlockId, CacheError, LockedSlot};
use kernel_info::fs::{NBUCKET, NBUF};

/// Where a resident block lives and how it is used, at one instant.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SlotInfo {
    pub bucket: usize,
    pub index: usize,
    pub ref_count: u32,
    pub valid: bool,
}

/// The kernel's block buffer cache.
///
/// Holds at most one in-memory copy of each block, so every reader and
/// writer of a block synchronizes through the same slot. Slots are split
/// into `BUCKETS` buckets of `SLOTS` slots; block `n` always lives in bucket
/// `n % BUCKETS`, whatever its device.
///
/// Constructed once at boot (it is `const`, so it can live in a `static`)
/// and shared by reference with the filesystem layer.
pub struct BufferCache<D, const BUCKETS: usize = NBUCKET, const SLOTS: usize = NBUF> {
    device: D,
    buckets: [Bucket<SLOTS>; BUCKETS],
}

impl<D: BlockDevice, const BUCKETS: usize, const SLOTS: usize> BufferCache<D, BUCKETS, SLOTS> {
    /// An empty cache in front of `device`.
    pub const fn new(device: D) -> Self {
        const {
            assert!(BUCKETS > 0 && SLOTS > 0, "cache needs at least one slot");
        }
        Self {
            device,
            buckets: [const { Bucket::new() }; BUCKETS],
        }
    }

    /// Bucket that caches block number `blockno` on any device.
    #[inline]
    #[must_use]
    pub const fn bucket_of(blockno: u32) -> usize {
        blockno as usize % BUCKETS
    }

    #[inline]
    #[must_use]
    pub const fn device(&self) -> &D {
        &self.device
    }

    /// Lock the slot caching `block`, binding a slot if the block is not resident.
    ///
    /// The content is not loaded; call [`LockedSlot::ensure_loaded`] before
    /// reading it. Blocks while another context holds the slot, and while
    /// every slot of the block's bucket is referenced.
    pub fn acquire(&self, block: BlockId) -> LockedSlot<'_, D, SLOTS> {
        let bucket = Self::bucket_of(block.blockno);
        let mut announced = false;
        loop {
            match self.try_acquire(block) {
                Ok(slot) => return slot,
                Err(CacheError::Exhausted { .. }) => {
                    if !announced {
                        log::debug!("buffer cache: bucket {bucket} full, waiting to cache {block}");
                        announced = true;
                    }
                    // Wait without the bucket lock, then rescan: the block
                    // may have been bound by someone else meanwhile.
                    while !self.buckets[bucket].has_unreferenced() {
                        kernel_sync::relax();
                    }
                }
            }
        }
    }

    /// Like [`acquire`](Self::acquire), but fails instead of waiting for a
    /// slot when every slot of the block's bucket is referenced.
    ///
    /// Still blocks on the content lock of the slot once one is claimed.
    ///
    /// # Errors
    /// [`CacheError::Exhausted`] if the bucket has no unreferenced slot.
    pub fn try_acquire(&self, block: BlockId) -> Result<LockedSlot<'_, D, SLOTS>, CacheError> {
        let bucket = Self::bucket_of(block.blockno);
        let index = match self.buckets[bucket].claim(bucket, block) {
            Claim::Hit(index) => {
                log::trace!("buffer cache: hit {block} in slot {bucket}/{index}");
                index
            }
            Claim::Bound { index, evicted } => {
                match evicted {
                    Some(old) => log::debug!(
                        "buffer cache: slot {bucket}/{index} recycled from {old} to {block}"
                    ),
                    None => log::trace!("buffer cache: slot {bucket}/{index} bound to {block}"),
                }
                index
            }
            Claim::Full => return Err(CacheError::Exhausted { bucket, block }),
        };

        // The bucket lock is released; now wait for the content.
        Ok(LockedSlot::lock(
            &self.device,
            &self.buckets[bucket],
            bucket,
            index,
            block,
        ))
    }

    /// Lock the slot caching `block` and make sure it holds the block's content.
    ///
    /// # Errors
    /// Device read failures, as reported by the device. The slot is released.
    pub fn read(&self, block: BlockId) -> Result<LockedSlot<'_, D, SLOTS>, D::Error> {
        let mut slot = self.acquire(block);
        slot.ensure_loaded()?;
        Ok(slot)
    }

    /// Where `block` is cached right now, if anywhere.
    #[must_use]
    pub fn resident(&self, block: BlockId) -> Option<SlotInfo> {
        let bucket = Self::bucket_of(block.blockno);
        let slots = &self.buckets[bucket];
        slots.find(block).map(|(index, meta)| SlotInfo {
            bucket,
            index,
            ref_count: meta.refs,
            valid: slots.slot(index).is_valid(),
        })
    }
}
