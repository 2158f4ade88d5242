//! # Block Storage Geometry

/// Size of a disk block, and of every buffer cache slot, in bytes.
pub const BLOCK_SIZE: usize = 1024;

/// Number of slots per buffer cache bucket.
pub const NBUF: usize = 30;

/// Number of buffer cache buckets.
///
/// A prime, so consecutive block numbers spread over all buckets.
pub const NBUCKET: usize = 13;

const _: () = {
    assert!(BLOCK_SIZE.is_power_of_two());
    assert!(NBUF > 0);
    assert!(NBUCKET > 0);
};
