//! # Memory Layout

/// Size of a physical page frame in bytes.
pub const PAGE_SIZE: u64 = 4096;

/// log2 of [`PAGE_SIZE`].
pub const PAGE_SHIFT: u32 = 12;

/// Start of RAM; the kernel image is loaded here.
pub const KERNBASE: u64 = 0x8000_0000;

/// End of the RAM managed by the page allocator (exclusive).
pub const PHYSTOP: u64 = KERNBASE + 128 * 1024 * 1024;

/// Number of page frames between [`KERNBASE`] and [`PHYSTOP`].
///
/// This sizes the allocator's reference count table.
pub const MANAGED_FRAMES: usize = ((PHYSTOP - KERNBASE) / PAGE_SIZE) as usize;

/// Byte pattern written into a frame when it is handed out.
///
/// Reads of memory the caller never initialized show up as `0x05`.
pub const ALLOC_JUNK: u8 = 0x05;

/// Byte pattern written into a frame when it returns to the free list.
///
/// Dangling references into freed memory show up as `0x01`.
pub const FREE_JUNK: u8 = 0x01;

const _: () = {
    assert!(PAGE_SIZE == 1 << PAGE_SHIFT);
    assert!(KERNBASE.is_multiple_of(PAGE_SIZE));
    assert!(PHYSTOP.is_multiple_of(PAGE_SIZE));
    assert!(PHYSTOP > KERNBASE);
    assert!(ALLOC_JUNK != FREE_JUNK);
};
