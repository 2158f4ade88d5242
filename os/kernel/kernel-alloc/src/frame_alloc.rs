//! Reference-counted physical frame allocator.
//!
//! Hands out whole 4 KiB frames for user memory, kernel stacks, page-table
//! pages and pipe buffers. Every frame carries a reference count so the
//! address-space layer can share a frame between owners (copy-on-write); the
//! frame returns to the free list when its last owner lets go.
//!
//! The free list is a stack of frame indices threaded through a fixed table,
//! so frame contents never hold allocator state and the table's size is
//! fixed at build time. The table is large (two words per frame of RAM), so
//! the allocator is meant to live in a `static`: [`PageAllocator::new`] is
//! `const` and [`PageAllocator::init`] fills the table in place.

use crate::address::{ManagedMemory, PhysicalAddress, PhysicalFrame};
use crate::error::{AllocError, InvariantViolation, LayoutError, fatal};
use crate::phys_mapper::PhysMapper;
use kernel_info::memory::{ALLOC_JUNK, FREE_JUNK, MANAGED_FRAMES, PAGE_SHIFT, PAGE_SIZE};
use kernel_sync::{TicketMutex, TicketMutexGuard};

/// End-of-list marker in [`FrameTable::next`].
const NIL: u32 = u32::MAX;

/// Bytes in a frame, as an array length.
const FRAME_BYTES: usize = PAGE_SIZE as usize;

/// Managed range, reference counts and free list, guarded together by one lock.
struct FrameTable<const FRAMES: usize> {
    memory: ManagedMemory,
    ready: bool,
    refs: [u32; FRAMES],
    next: [u32; FRAMES],
    head: u32,
    free: usize,
}

impl<const FRAMES: usize> FrameTable<FRAMES> {
    const fn new() -> Self {
        Self {
            memory: ManagedMemory::UNSET,
            ready: false,
            refs: [0; FRAMES],
            next: [NIL; FRAMES],
            head: NIL,
            free: 0,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn push(&mut self, index: usize) {
        self.next[index] = self.head;
        self.head = index as u32;
        self.free += 1;
    }

    fn pop(&mut self) -> Option<usize> {
        if self.head == NIL {
            return None;
        }
        let index = self.head as usize;
        self.head = self.next[index];
        self.next[index] = NIL;
        self.free -= 1;
        Some(index)
    }

    /// Table index of the frame at `pa`, if `pa` is a frame `free` may accept.
    fn index_of(&self, pa: PhysicalAddress) -> Result<usize, InvariantViolation> {
        if !pa.is_page_aligned() {
            Err(InvariantViolation::Unaligned(pa))
        } else if pa < self.memory.first_free() {
            Err(InvariantViolation::Reserved(pa))
        } else if pa >= self.memory.top() {
            Err(InvariantViolation::OutOfRange(pa))
        } else {
            Ok(index_in(&self.memory, pa))
        }
    }
}

/// The kernel's physical page allocator.
///
/// Constructed once at boot and shared by reference with every caller; the
/// single [`TicketMutex`] inside is the only serialization point for frame
/// bookkeeping. Each operation holds it for a bounded section: constant
/// bookkeeping, plus the junk fill of a frame being reclaimed.
///
/// `FRAMES` sizes the reference count table and must cover the managed range.
///
/// ```rust
/// use kernel_alloc::{OffsetPhysMapper, PageAllocator};
///
/// static PAGES: PageAllocator<OffsetPhysMapper> = PageAllocator::new(OffsetPhysMapper::identity());
///
/// // Owns nothing until `init` hands it the RAM above the kernel image.
/// assert_eq!(PAGES.memory(), None);
/// assert_eq!(PAGES.free_frames(), 0);
/// assert!(PAGES.allocate().is_err());
/// ```
pub struct PageAllocator<M: PhysMapper, const FRAMES: usize = MANAGED_FRAMES> {
    mapper: M,
    table: TicketMutex<FrameTable<FRAMES>>,
}

impl<M: PhysMapper, const FRAMES: usize> PageAllocator<M, FRAMES> {
    /// An allocator that owns no memory yet.
    ///
    /// Meant for `static` initializers; with the default `FRAMES` the value
    /// is far larger than a kernel stack.
    #[must_use]
    pub const fn new(mapper: M) -> Self {
        Self {
            mapper,
            table: TicketMutex::new(FrameTable::new()),
        }
    }

    /// Take ownership of `memory` and put every allocatable frame on the free list.
    ///
    /// All frames start out referenced once and are then swept through
    /// [`free`](Self::free), so boot exercises the same path as any later
    /// reclamation and scribbles [`FREE_JUNK`] over all of free RAM.
    ///
    /// # Safety
    /// The mapper must map every frame of `memory` above
    /// [`ManagedMemory::first_free`], and nothing else may use those frames.
    ///
    /// # Errors
    /// - [`LayoutError::TableTooSmall`] if `FRAMES` cannot index the range.
    /// - [`LayoutError::AlreadyInitialized`] on a second call.
    #[allow(clippy::cast_possible_truncation)]
    pub unsafe fn init(&self, memory: ManagedMemory) -> Result<(), LayoutError> {
        let needed = memory.total_frames();
        if needed > FRAMES as u64 || FRAMES >= NIL as usize {
            return Err(LayoutError::TableTooSmall {
                needed,
                capacity: FRAMES,
            });
        }

        let first = index_in(&memory, memory.first_free());
        let last = needed as usize;
        {
            let mut table = self.table.lock();
            if table.ready {
                return Err(LayoutError::AlreadyInitialized);
            }
            table.memory = memory;
            table.ready = true;
            table.refs[first..last].fill(1);
        }

        for index in first..last {
            self.free(frame_at(&memory, index));
        }

        log::info!(
            "page allocator: {} frames free ({} KiB) in {}..{}",
            self.free_frames(),
            self.free_memory() / 1024,
            memory.first_free(),
            memory.top()
        );
        Ok(())
    }

    /// Allocate one frame with a reference count of 1.
    ///
    /// The frame is filled with [`ALLOC_JUNK`]; callers must initialize what
    /// they read. Never blocks.
    ///
    /// # Errors
    /// [`AllocError::ResourceExhausted`] when no frame is free.
    pub fn allocate(&self) -> Result<PhysicalFrame, AllocError> {
        let frame = {
            let mut table = self.table.lock();
            let Some(index) = table.pop() else {
                drop(table);
                log::debug!("page allocator: out of frames");
                return Err(AllocError::ResourceExhausted);
            };
            let frame = frame_at(&table.memory, index);
            let refs = table.refs[index];
            if refs != 0 {
                drop(table);
                fatal(InvariantViolation::CorruptFreeList {
                    frame: frame.base(),
                    refs,
                });
            }
            table.refs[index] = 1;
            frame
        };

        // SAFETY: the frame was free, so we are its only owner.
        unsafe { self.fill(frame, ALLOC_JUNK) };
        log::trace!("page allocator: allocated {frame}");
        Ok(frame)
    }

    /// Drop one reference to the frame at `pa`.
    ///
    /// When the last reference goes, the frame is filled with [`FREE_JUNK`]
    /// and returned to the free list in the same critical section, so a
    /// count of 0 always means the frame can be allocated.
    ///
    /// Halts the calling context if `pa` is unaligned, outside of the managed
    /// range, part of the kernel image, or already free.
    pub fn free(&self, pa: impl Into<PhysicalAddress>) {
        let pa = pa.into();
        let (mut table, index) = self.lock_frame(pa);

        let refs = table.refs[index];
        match refs {
            0 => {
                drop(table);
                fatal(InvariantViolation::DoubleFree(pa));
            }
            1 => {
                let frame = frame_at(&table.memory, index);
                // SAFETY: we dropped the last reference.
                unsafe { self.fill(frame, FREE_JUNK) };
                table.refs[index] = 0;
                table.push(index);
                drop(table);
                log::trace!("page allocator: freed {frame}");
            }
            refs => {
                table.refs[index] = refs - 1;
                drop(table);
                log::trace!("page allocator: {pa} now has {} references", refs - 1);
            }
        }
    }

    /// Add a reference to an allocated frame, e.g. when a copy-on-write
    /// mapping starts sharing it.
    ///
    /// Halts the calling context on an invalid address, a free frame, or a
    /// reference count that would overflow.
    pub fn add_ref(&self, pa: impl Into<PhysicalAddress>) {
        let pa = pa.into();
        let (mut table, index) = self.lock_frame(pa);

        let refs = table.refs[index];
        let violation = match refs.checked_add(1) {
            _ if refs == 0 => InvariantViolation::ShareOfFreeFrame(pa),
            None => InvariantViolation::RefCountOverflow(pa),
            Some(refs) => {
                table.refs[index] = refs;
                drop(table);
                log::trace!("page allocator: {pa} now has {refs} references");
                return;
            }
        };
        drop(table);
        fatal(violation);
    }

    /// Current reference count of the frame at `pa`; 0 means free.
    ///
    /// Halts the calling context on an invalid address.
    #[must_use]
    pub fn ref_count(&self, pa: impl Into<PhysicalAddress>) -> u32 {
        let (table, index) = self.lock_frame(pa.into());
        table.refs[index]
    }

    /// Number of frames on the free list.
    #[must_use]
    pub fn free_frames(&self) -> usize {
        self.table.lock().free
    }

    /// Free memory in bytes.
    #[must_use]
    pub fn free_memory(&self) -> u64 {
        self.free_frames() as u64 * PAGE_SIZE
    }

    /// The range handed to [`init`](Self::init), if any.
    #[must_use]
    pub fn memory(&self) -> Option<ManagedMemory> {
        let table = self.table.lock();
        table.ready.then_some(table.memory)
    }

    /// The bytes of `frame`.
    ///
    /// # Safety
    /// The caller must own a reference to `frame` and must not let the slice
    /// alias another live reference to the same frame, nor outlive the
    /// caller's reference.
    pub unsafe fn frame_bytes<'a>(&self, frame: PhysicalFrame) -> &'a mut [u8; FRAME_BYTES] {
        unsafe { self.mapper.phys_to_mut(frame.base()) }
    }

    /// # Safety
    /// The caller must exclusively own `frame`.
    unsafe fn fill(&self, frame: PhysicalFrame, junk: u8) {
        let bytes = unsafe { self.frame_bytes(frame) };
        bytes.fill(junk);
    }

    /// Lock the table and validate `pa` against the managed range.
    fn lock_frame(&self, pa: PhysicalAddress) -> (TicketMutexGuard<'_, FrameTable<FRAMES>>, usize) {
        let table = self.table.lock();
        match table.index_of(pa) {
            Ok(index) => (table, index),
            Err(violation) => {
                drop(table);
                fatal(violation)
            }
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn index_in(memory: &ManagedMemory, pa: PhysicalAddress) -> usize {
    ((pa.as_u64() - memory.base().as_u64()) >> PAGE_SHIFT) as usize
}

fn frame_at(memory: &ManagedMemory, index: usize) -> PhysicalFrame {
    let base = memory.base().as_u64() + ((index as u64) << PAGE_SHIFT);
    PhysicalFrame::containing(PhysicalAddress::new(base))
}
