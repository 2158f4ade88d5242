//! # Kernel Configuration
//!
//! This crate is the single source of truth for the compile-time parameters
//! shared by the physical page allocator (`kernel-alloc`) and the block buffer
//! cache (`kernel-bcache`). Every value is a plain `const`, and layout
//! constraints between them are checked at compile time.
//!
//! ## Modules
//!
//! ### Memory Layout ([`memory`])
//! Describes the physical memory managed by the page allocator:
//! * **Page Size**: the allocation granule, 4 KiB
//! * **Managed Range**: `KERNBASE .. PHYSTOP`, the RAM handed to the allocator
//! * **Frame Table Size**: number of frames in the managed range
//! * **Sentinels**: junk bytes written on allocation and reclamation
//!
//! ### Block Storage ([`fs`])
//! Describes the geometry of the buffer cache:
//! * **Block Size**: bytes per cached disk block
//! * **Buckets**: number of independently locked partitions
//! * **Slots**: fixed capacity of each partition
//!
//! ```text
//! Physical Memory Layout:
//! KERNBASE    ┌─────────────────────────────────┐ 0x8000_0000
//!             │       Kernel Image              │
//!             │   (Text, Data, BSS)             │
//! end         ├─────────────────────────────────┤ first allocatable page
//!             │    Available RAM                │
//!             │  (Managed by kernel-alloc)      │
//! PHYSTOP     └─────────────────────────────────┘ 0x8800_0000
//! ```
//!
//! The position of `end` is only known at link time, which is why the page
//! allocator receives it at boot instead of reading it from here.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod fs;
pub mod memory;
