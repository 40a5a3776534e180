//! # Typed 32-bit memory addresses
//!
//! Strongly typed physical and virtual addresses for i686 two-level paging.
//! A [`PhysicalAddress`] and a [`VirtualAddress`] never mix without an
//! explicit conversion; [`PhysicalPage<S>`] / [`VirtualPage<S>`] are
//! page-aligned bases for a [`PageSize`] `S` and
//! [`MemoryAddressOffset<S>`] is the in-page remainder.
//!
//! Two page sizes exist: [`Size4K`] (one page table entry) and [`Size4M`]
//! (the span of one page directory entry).
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0xD000_1234);
//! let (page, off) = va.split::<Size4K>();
//! assert_eq!(page.base().as_u32(), 0xD000_1000);
//! assert_eq!(off.as_u32(), 0x234);
//! assert_eq!(page.join(off), va);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod memory_address;
mod memory_address_offset;
mod memory_page;
mod page_size;
mod physical_address;
mod physical_page;
mod virtual_address;
mod virtual_page;

pub use memory_address::MemoryAddress;
pub use memory_address_offset::MemoryAddressOffset;
pub use memory_page::MemoryPage;
pub use page_size::{PageSize, Size4K, Size4M};
pub use physical_address::PhysicalAddress;
pub use physical_page::PhysicalPage;
pub use virtual_address::VirtualAddress;
pub use virtual_page::VirtualPage;
