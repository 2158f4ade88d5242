//! Typed physical addresses.
//!
//! [`PhysicalAddress`] is any physical address; [`PhysicalFrame`] is the
//! page-aligned base of a 4 KiB frame and is what the allocator hands out.
//! [`ManagedMemory`] describes the range of frames the allocator owns.

use crate::LayoutError;
use core::fmt;
use kernel_info::memory::PAGE_SIZE;

/// A raw physical address.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct PhysicalAddress(u64);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn is_page_aligned(self) -> bool {
        self.0.is_multiple_of(PAGE_SIZE)
    }

    /// Round up to the next page boundary (identity if already aligned).
    ///
    /// Returns `None` if rounding would overflow the address space.
    #[inline]
    #[must_use]
    pub const fn align_up(self) -> Option<Self> {
        match self.0.checked_add(PAGE_SIZE - 1) {
            Some(v) => Some(Self(v & !(PAGE_SIZE - 1))),
            None => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn align_down(self) -> Self {
        Self(self.0 & !(PAGE_SIZE - 1))
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalAddress({:#018X})", self.0)
    }
}

impl From<u64> for PhysicalAddress {
    #[inline]
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Page-aligned base of a physical page frame.
///
/// ### Invariants
/// - The low 12 bits of the base are always zero.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalFrame(PhysicalAddress);

impl PhysicalFrame {
    /// The frame starting at `base`, or `None` if `base` is not page aligned.
    #[inline]
    #[must_use]
    pub const fn from_base(base: PhysicalAddress) -> Option<Self> {
        if base.is_page_aligned() {
            Some(Self(base))
        } else {
            None
        }
    }

    /// The frame that contains `addr`.
    #[inline]
    #[must_use]
    pub const fn containing(addr: PhysicalAddress) -> Self {
        Self(addr.align_down())
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        self.0
    }
}

impl fmt::Display for PhysicalFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for PhysicalFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalFrame({:#018X})", self.0.as_u64())
    }
}

impl From<PhysicalFrame> for PhysicalAddress {
    #[inline]
    fn from(frame: PhysicalFrame) -> Self {
        frame.0
    }
}

/// The physical range handed to the page allocator at boot.
///
/// ```text
/// base         first_free                         top
///  │ kernel image │  allocatable frames ...         │
///  └──────────────┴─────────────────────────────────┘
/// ```
///
/// `base` anchors the reference count table (frame index 0). Frames below
/// `first_free` are part of the kernel image and can never be freed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ManagedMemory {
    base: PhysicalAddress,
    first_free: PhysicalAddress,
    top: PhysicalAddress,
}

impl ManagedMemory {
    /// The empty range an allocator owns before boot hands it RAM.
    pub(crate) const UNSET: Self = Self {
        base: PhysicalAddress::new(0),
        first_free: PhysicalAddress::new(0),
        top: PhysicalAddress::new(0),
    };

    /// Describe the RAM between `base` and `top`, of which everything below
    /// `kernel_end` (rounded up to a page) is occupied by the kernel image.
    ///
    /// # Errors
    /// If `base` or `top` are unaligned, or `kernel_end` lies outside of
    /// `base ..= top`.
    pub const fn new(
        base: PhysicalAddress,
        kernel_end: PhysicalAddress,
        top: PhysicalAddress,
    ) -> Result<Self, LayoutError> {
        if !base.is_page_aligned() {
            return Err(LayoutError::UnalignedBase(base));
        }
        if !top.is_page_aligned() {
            return Err(LayoutError::UnalignedTop(top));
        }
        if kernel_end.as_u64() < base.as_u64() || kernel_end.as_u64() > top.as_u64() {
            return Err(LayoutError::KernelOutsideRange(kernel_end));
        }
        let Some(first_free) = kernel_end.align_up() else {
            return Err(LayoutError::KernelOutsideRange(kernel_end));
        };
        // `top` is aligned, so rounding `kernel_end` up never passes it.
        Ok(Self {
            base,
            first_free,
            top,
        })
    }

    #[inline]
    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.base
    }

    /// First address past the kernel image; the lowest frame `free` accepts.
    #[inline]
    #[must_use]
    pub const fn first_free(&self) -> PhysicalAddress {
        self.first_free
    }

    #[inline]
    #[must_use]
    pub const fn top(&self) -> PhysicalAddress {
        self.top
    }

    /// Number of frames from `base` to `top`, i.e. the table size needed.
    #[inline]
    #[must_use]
    pub const fn total_frames(&self) -> u64 {
        (self.top.as_u64() - self.base.as_u64()) / PAGE_SIZE
    }

    /// Number of frames from `first_free` to `top`.
    #[inline]
    #[must_use]
    pub const fn allocatable_frames(&self) -> u64 {
        (self.top.as_u64() - self.first_free.as_u64()) / PAGE_SIZE
    }
}
