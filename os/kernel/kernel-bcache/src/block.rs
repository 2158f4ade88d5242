//! Blocks and the device that stores them.

use core::fmt;
use kernel_info::fs::BLOCK_SIZE;

/// Payload of one disk block. Opaque to the cache.
pub type BlockBuf = [u8; BLOCK_SIZE];

/// A block on a device: the identity of a resident cache slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BlockId {
    pub dev: u32,
    pub blockno: u32,
}

impl BlockId {
    #[inline]
    #[must_use]
    pub const fn new(dev: u32, blockno: u32) -> Self {
        Self { dev, blockno }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.dev, self.blockno)
    }
}

/// Synchronous block storage, e.g. a virtio disk driver.
///
/// Both calls return only once the transfer has completed or failed. The
/// cache neither retries nor inspects failures; they reach its caller as-is.
pub trait BlockDevice {
    type Error;

    /// Fill `buf` with the content of `block`.
    fn read_block(&self, block: BlockId, buf: &mut BlockBuf) -> Result<(), Self::Error>;

    /// Store `buf` as the new content of `block`.
    fn write_block(&self, block: BlockId, buf: &BlockBuf) -> Result<(), Self::Error>;
}

impl<D: BlockDevice> BlockDevice for &D {
    type Error = D::Error;

    fn read_block(&self, block: BlockId, buf: &mut BlockBuf) -> Result<(), Self::Error> {
        (**self).read_block(block, buf)
    }

    fn write_block(&self, block: BlockId, buf: &BlockBuf) -> Result<(), Self::Error> {
        (**self).write_block(block, buf)
    }
}
