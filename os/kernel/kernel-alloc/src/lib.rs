//! # Kernel Memory Allocation
//!
//! Physical frames, virtual mappings and the kernel heap for the i686
//! kernel.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Kernel heap (heap)                  │
//! │    • first-fit free list, grows page by page        │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ HeapBacking
//! ┌─────────────────▼───────────────────────────────────┐
//! │          Virtual Memory Manager (vmm)               │
//! │    • map / unmap / translate                        │
//! │    • free-run search for anonymous regions          │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ TableMapper (recursive slot 1023)
//! ┌─────────────────▼───────────────────────────────────┐
//! │        Physical Frame Allocator (frame_alloc)       │
//! │    • one bit per 4 KiB frame, 4 GiB coverage        │
//! │    • no heap, usable from the first boot steps      │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use kernel_alloc::frame_alloc::BitmapFrameAlloc;
//! use kernel_info::boot::PhysicalRange;
//! use kernel_memory_addresses::PhysicalAddress;
//!
//! let mut frames = Box::new(BitmapFrameAlloc::new());
//! // The kernel image occupies the first MiB of the usable range.
//! frames
//!     .init(PhysicalRange::new(
//!         PhysicalAddress::new(0x0010_0000),
//!         PhysicalAddress::new(0x0020_0000),
//!     ))
//!     .unwrap();
//! let frame = frames.alloc_frame().unwrap();
//! assert_eq!(frame.base().as_u32(), 0x0020_0000);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod frame_alloc;
mod free_list;
pub mod heap;
pub mod table_mapper;
pub mod vmm;
