//! # Access to physical memory
//!
//! The allocator scribbles over frames on allocation and reclamation, so it
//! needs to turn a physical address into something it can write through.
//! How that works depends on the environment:
//!
//! - the kernel identity-maps RAM (`va == pa`) or uses a direct map at a
//!   fixed offset,
//! - hosted tests back the managed range with a heap arena.
//!
//! Both are a fixed offset between physical and virtual addresses, which is
//! what [`OffsetPhysMapper`] implements.

use crate::PhysicalAddress;

/// Converts physical addresses into usable references.
pub trait PhysMapper {
    /// # Safety
    /// - `pa` must be mapped, writable and suitably aligned for `T`.
    /// - The caller picks `'a` and must ensure no other reference aliases the
    ///   returned one while it lives.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;
}

impl<M: PhysMapper> PhysMapper for &M {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        unsafe { (**self).phys_to_mut(pa) }
    }
}

/// [`PhysMapper`] for memory visible at a fixed offset from its physical address.
///
/// `phys_base` is reachable at virtual address `virt_base`; every other
/// address keeps the same distance.
///
/// # Example
/// ```rust
/// use kernel_alloc::{OffsetPhysMapper, PhysMapper, PhysicalAddress};
///
/// let mut page = [0u64; 512];
/// let mapper = OffsetPhysMapper::new(
///     PhysicalAddress::new(0x8000_0000),
///     page.as_mut_ptr() as usize,
/// );
/// unsafe {
///     let word: &mut u64 = mapper.phys_to_mut(PhysicalAddress::new(0x8000_0008));
///     *word = 7;
/// }
/// assert_eq!(page[1], 7);
/// ```
#[derive(Copy, Clone, Debug)]
pub struct OffsetPhysMapper {
    phys_base: PhysicalAddress,
    virt_base: usize,
}

impl OffsetPhysMapper {
    #[must_use]
    pub const fn new(phys_base: PhysicalAddress, virt_base: usize) -> Self {
        Self {
            phys_base,
            virt_base,
        }
    }

    /// Physical memory mapped one-to-one into the kernel's address space.
    #[must_use]
    pub const fn identity() -> Self {
        Self::new(PhysicalAddress::new(0), 0)
    }
}

impl PhysMapper for OffsetPhysMapper {
    #[allow(clippy::cast_possible_truncation)]
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let delta = pa.as_u64().wrapping_sub(self.phys_base.as_u64()) as usize;
        let va = self.virt_base.wrapping_add(delta) as *mut T;
        // SAFETY: Caller must ensure the physical address is valid and mapped.
        unsafe { &mut *va }
    }
}
