use crate::PhysicalAddress;

/// Recoverable allocation failure, returned to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error("out of physical page frames")]
    ResourceExhausted,
}

/// Boot-time misconfiguration of the managed range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("managed memory base {0} is not page aligned")]
    UnalignedBase(PhysicalAddress),
    #[error("managed memory top {0} is not page aligned")]
    UnalignedTop(PhysicalAddress),
    #[error("kernel image end {0} lies outside the managed range")]
    KernelOutsideRange(PhysicalAddress),
    #[error("frame table holds {capacity} frames, managed range needs {needed}")]
    TableTooSmall { needed: u64, capacity: usize },
    #[error("page allocator already owns a managed range")]
    AlreadyInitialized,
}

/// Corrupted allocator bookkeeping or a caller bug.
///
/// Never returned: it is handed to [`fatal`], which halts the violating
/// execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("frame address {0} is not page aligned")]
    Unaligned(PhysicalAddress),
    #[error("frame address {0} lies below the first allocatable frame")]
    Reserved(PhysicalAddress),
    #[error("frame address {0} lies at or beyond the top of managed memory")]
    OutOfRange(PhysicalAddress),
    #[error("double free of frame {0}")]
    DoubleFree(PhysicalAddress),
    #[error("frame {0} is free and cannot gain a reference")]
    ShareOfFreeFrame(PhysicalAddress),
    #[error("reference count of frame {0} overflowed")]
    RefCountOverflow(PhysicalAddress),
    #[error("free list yielded frame {frame} holding {refs} references")]
    CorruptFreeList { frame: PhysicalAddress, refs: u32 },
}

/// Halt the current execution context on a broken allocator invariant.
///
/// In the kernel the panic handler stops the CPU; hosted, the panic ends the
/// violating thread only. There is no local recovery.
#[cold]
#[track_caller]
pub fn fatal(violation: InvariantViolation) -> ! {
    log::error!("page allocator invariant violated: {violation}");
    panic!("page allocator: {violation}");
}
