use crate::BlockId;

/// Recoverable cache failure, returned to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// Every slot of the bucket `block` maps to is referenced.
    #[error("all slots of bucket {bucket} are in use, cannot cache block {block}")]
    Exhausted { bucket: usize, block: BlockId },
}

/// Broken slot bookkeeping. Handed to [`fatal`], never returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SlotViolation {
    #[error("reference count of slot {bucket}/{index} ({block}) dropped below zero")]
    RefCountUnderflow {
        bucket: usize,
        index: usize,
        block: BlockId,
    },
    #[error("reference count of slot {bucket}/{index} ({block}) overflowed")]
    RefCountOverflow {
        bucket: usize,
        index: usize,
        block: BlockId,
    },
    #[error("referenced slot {bucket}/{index} no longer holds block {block}")]
    IdentityLost {
        bucket: usize,
        index: usize,
        block: BlockId,
    },
}

/// Halt the current execution context on broken buffer cache bookkeeping.
#[cold]
#[track_caller]
pub fn fatal(violation: SlotViolation) -> ! {
    log::error!("buffer cache invariant violated: {violation}");
    panic!("buffer cache: {violation}");
}
