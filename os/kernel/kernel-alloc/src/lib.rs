//! # Physical Page Allocation
//!
//! This crate owns the kernel's pool of physical page frames. It hands out
//! whole 4 KiB frames, counts how many owners each frame has, and takes a
//! frame back once the last owner lets go.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │      Callers: address spaces, kernel stacks, pipes  │
//! │    • allocate / free / add_ref (copy-on-write)      │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │              PageAllocator                          │
//! │    • one ticket lock over refcounts + free list     │
//! │    • O(1) bookkeeping per call                      │
//! │    • junk fill on allocate and on reclaim           │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │              PhysMapper                             │
//! │    • physical address → writable reference          │
//! │    • identity map, direct map, or a test arena      │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Frame Lifecycle
//!
//! ```text
//!         init(): refs = 1, then swept through free()
//!                          │
//!                          ▼
//!   ┌──────────┐ allocate ┌───────────┐ add_ref ┌──────────────┐
//!   │  free    │─────────▶│ allocated │────────▶│ shared (≥ 2) │
//!   │ refs = 0 │◀─────────│ refs = 1  │◀────────│              │
//!   └──────────┘   free   └───────────┘  free   └──────────────┘
//! ```
//!
//! A frame is on the free list if and only if its reference count is 0.
//!
//! ## Error Model
//!
//! * [`AllocError::ResourceExhausted`] is an ordinary result: the caller
//!   decides whether to fail its operation or reclaim memory first.
//! * Anything that means kernel state is already corrupt (unaligned or
//!   foreign addresses, double frees, sharing a free frame, refcount
//!   overflow) is an [`InvariantViolation`] and goes to [`fatal`], which halts
//!   the violating execution context. It is never repaired locally.
//!
//! ## Usage
//!
//! ```rust
//! use kernel_alloc::{ManagedMemory, OffsetPhysMapper, PageAllocator, PhysicalAddress};
//! use std::alloc::{Layout, alloc_zeroed, dealloc};
//!
//! let layout = Layout::from_size_align(8 * 4096, 4096).unwrap();
//! let arena = unsafe { alloc_zeroed(layout) };
//!
//! let base = PhysicalAddress::new(0x8000_0000);
//! let memory = ManagedMemory::new(base, PhysicalAddress::new(0x8000_1000), PhysicalAddress::new(0x8000_8000)).unwrap();
//! let pages: PageAllocator<_, 8> = PageAllocator::new(OffsetPhysMapper::new(base, arena as usize));
//! unsafe { pages.init(memory) }.unwrap();
//!
//! let frame = pages.allocate().unwrap();
//! pages.add_ref(frame); // a second owner, e.g. after fork
//! pages.free(frame);
//! assert_eq!(pages.ref_count(frame), 1);
//! pages.free(frame);
//! assert_eq!(pages.free_frames(), 7);
//!
//! drop(pages);
//! unsafe { dealloc(arena, layout) };
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod address;
mod error;
pub mod frame_alloc;
pub mod phys_mapper;

pub use address::{ManagedMemory, PhysicalAddress, PhysicalFrame};
pub use error::{AllocError, InvariantViolation, LayoutError, fatal};
pub use frame_alloc::PageAllocator;
pub use phys_mapper::{OffsetPhysMapper, PhysMapper};
