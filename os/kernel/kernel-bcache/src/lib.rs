//! # Block Buffer Cache
//!
//! In-memory copies of disk blocks, shared by everything above the disk
//! driver. The cache guarantees at most one resident copy of each
//! `(device, block)` pair, so all readers and writers of a block
//! synchronize through one slot, and it spreads lock contention by
//! sharding slots into buckets.
//!
//! ## Structure
//!
//! ```text
//!  BufferCache
//!  ├── bucket 0  (blocks 0, 13, 26, …)   SpinMutex ─ slot membership + refcounts
//!  │   ├── slot 0   valid flag, SleepLock<[u8; BLOCK_SIZE]>
//!  │   ├── slot 1
//!  │   └── …  NBUF slots
//!  ├── bucket 1  (blocks 1, 14, 27, …)
//!  └── …  NBUCKET buckets
//! ```
//!
//! Two locks guard every slot:
//!
//! * the **bucket lock**, a spin lock held for a scan of one bucket, guards
//!   which block a slot caches and its reference count;
//! * the **content lock**, a sleep lock that may be held across disk I/O,
//!   guards the payload bytes.
//!
//! No code path waits for a content lock while holding a bucket lock, and no
//! code path holds two bucket locks. Blocks in different buckets never
//! contend.
//!
//! ## Slot Lifecycle
//!
//! ```text
//! unbound ──acquire──▶ bound, invalid ──ensure_loaded──▶ bound, valid
//!                          ▲                                   │
//!                          └──── recycled once refcount is 0 ◀─┘
//! ```
//!
//! A slot with references (holders, waiters or pins) is never recycled.
//! When a bucket has no unreferenced slot, [`BufferCache::acquire`] waits
//! for one and [`BufferCache::try_acquire`] fails with
//! [`CacheError::Exhausted`].
//!
//! ## Usage
//!
//! ```rust
//! use kernel_bcache::{BlockBuf, BlockDevice, BlockId, BufferCache};
//!
//! struct Zeroes;
//!
//! impl BlockDevice for Zeroes {
//!     type Error = core::convert::Infallible;
//!
//!     fn read_block(&self, _: BlockId, buf: &mut BlockBuf) -> Result<(), Self::Error> {
//!         buf.fill(0);
//!         Ok(())
//!     }
//!
//!     fn write_block(&self, _: BlockId, _: &BlockBuf) -> Result<(), Self::Error> {
//!         Ok(())
//!     }
//! }
//!
//! static CACHE: BufferCache<Zeroes, 3, 2> = BufferCache::new(Zeroes);
//!
//! let mut slot = CACHE.acquire(BlockId::new(1, 5));
//! slot.ensure_loaded().unwrap();
//! slot.data_mut()[0] = 42;
//! slot.write_back().unwrap();
//! slot.release();
//!
//! let info = CACHE.resident(BlockId::new(1, 5)).unwrap();
//! assert_eq!((info.bucket, info.ref_count, info.valid), (2, 0, true));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod block;
mod bucket;
mod cache;
mod error;
mod slot;

pub use block::{BlockBuf, BlockDevice, BlockId};
pub use cache::{BufferCache, SlotInfo};
pub use error::{CacheError, SlotViolation, fatal};
pub use slot::{LockedSlot, PinnedSlot};
