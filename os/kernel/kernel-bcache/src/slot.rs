//! Handles to cache slots.

use crate::bucket::Bucket;
use crate::{BlockBuf, BlockDevice, BlockId};
use core::mem::ManuallyDrop;
use core::sync::atomic::Ordering;
use kernel_sync::SleepLockGuard;

/// A cache slot bound to one block, with its content lock held.
///
/// Holding a `LockedSlot` is the proof of owning the content lock: loading,
/// writing back and pinning all go through it, and dropping it (or calling
/// [`release`](Self::release)) unlocks the content and then drops the
/// reference in the bucket.
pub struct LockedSlot<'c, D: BlockDevice, const SLOTS: usize> {
    device: &'c D,
    bucket: &'c Bucket<SLOTS>,
    bucket_index: usize,
    index: usize,
    block: BlockId,
    data: ManuallyDrop<SleepLockGuard<'c, BlockBuf>>,
}

impl<'c, D: BlockDevice, const SLOTS: usize> LockedSlot<'c, D, SLOTS> {
    /// Block on the content lock of a slot the caller holds a reference to.
    pub(crate) fn lock(
        device: &'c D,
        bucket: &'c Bucket<SLOTS>,
        bucket_index: usize,
        index: usize,
        block: BlockId,
    ) -> Self {
        let data = bucket.slot(index).data.lock();
        Self {
            device,
            bucket,
            bucket_index,
            index,
            block,
            data: ManuallyDrop::new(data),
        }
    }

    #[inline]
    #[must_use]
    pub const fn block(&self) -> BlockId {
        self.block
    }

    #[inline]
    #[must_use]
    pub const fn device(&self) -> u32 {
        self.block.dev
    }

    #[inline]
    #[must_use]
    pub const fn block_no(&self) -> u32 {
        self.block.blockno
    }

    /// Bucket holding this slot.
    #[inline]
    #[must_use]
    pub const fn bucket(&self) -> usize {
        self.bucket_index
    }

    /// Position of this slot inside its bucket.
    #[inline]
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Whether the slot holds the block's content.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.bucket.slot(self.index).is_valid()
    }

    #[inline]
    #[must_use]
    pub fn data(&self) -> &BlockBuf {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut BlockBuf {
        &mut self.data
    }

    /// Read the block from the device unless the slot already holds it.
    ///
    /// # Errors
    /// The device's read error, unchanged; the slot stays invalid.
    pub fn ensure_loaded(&mut self) -> Result<(), D::Error> {
        let slot = self.bucket.slot(self.index);
        if slot.is_valid() {
            return Ok(());
        }
        log::debug!("buffer cache: reading {}", self.block);
        self.device.read_block(self.block, &mut self.data)?;
        slot.valid.store(true, Ordering::Release);
        Ok(())
    }

    /// Write the slot's content to the device, synchronously.
    ///
    /// # Errors
    /// The device's write error, unchanged.
    pub fn write_back(&self) -> Result<(), D::Error> {
        log::debug!("buffer cache: writing {}", self.block);
        self.device.write_block(self.block, &self.data)
    }

    /// Keep the slot resident beyond this handle until the pin is dropped.
    ///
    /// Only the bucket lock is taken.
    pub fn pin(&self) -> PinnedSlot<'c, SLOTS> {
        let refs = self
            .bucket
            .retain(self.bucket_index, self.index, self.block);
        log::trace!("buffer cache: pinned {} ({refs} references)", self.block);
        PinnedSlot {
            bucket: self.bucket,
            bucket_index: self.bucket_index,
            index: self.index,
            block: self.block,
        }
    }

    /// Unlock the content and drop this handle's reference.
    pub fn release(self) {
        drop(self);
    }
}

impl<D: BlockDevice, const SLOTS: usize> Drop for LockedSlot<'_, D, SLOTS> {
    fn drop(&mut self) {
        // Content lock first: nobody may wait on it while holding the bucket lock.
        // SAFETY: `data` is never touched again.
        unsafe { ManuallyDrop::drop(&mut self.data) };
        self.bucket.unref(self.bucket_index, self.index, self.block);
    }
}

/// An extra reference that keeps a slot bound to its block.
///
/// While any pin exists the slot is never recycled, even when no
/// [`LockedSlot`] for it is alive. Dropping the pin, or passing it to
/// [`unpin`](Self::unpin), takes the reference away again.
#[must_use = "dropping the pin unpins the slot immediately"]
pub struct PinnedSlot<'c, const SLOTS: usize> {
    bucket: &'c Bucket<SLOTS>,
    bucket_index: usize,
    index: usize,
    block: BlockId,
}

impl<const SLOTS: usize> PinnedSlot<'_, SLOTS> {
    #[inline]
    #[must_use]
    pub const fn block(&self) -> BlockId {
        self.block
    }

    pub fn unpin(self) {
        drop(self);
    }
}

impl<const SLOTS: usize> Drop for PinnedSlot<'_, SLOTS> {
    fn drop(&mut self) {
        let refs = self.bucket.unref(self.bucket_index, self.index, self.block);
        log::trace!("buffer cache: unpinned {} ({refs} references)", self.block);
    }
}
