//! # Page directory and page table
//!
//! A 32-bit virtual address splits into three fields:
//!
//! ```text
//! | 31‒22 | 21‒12 | 11‒0   |
//! |  PD   |  PT   | Offset |
//! ```

pub mod pd;
pub mod pt;

use crate::page_table::pd::PdIndex;
use crate::page_table::pt::PtIndex;
use kernel_memory_addresses::VirtualAddress;

/// Entries per directory or table.
pub const ENTRIES: usize = 1024;

#[inline]
#[must_use]
pub const fn split_indices(va: VirtualAddress) -> (PdIndex, PtIndex) {
    (PdIndex::from(va), PtIndex::from(va))
}

/// Inverse of [`split_indices`] for the page base.
#[inline]
#[must_use]
pub const fn join_indices(pdi: PdIndex, pti: PtIndex) -> VirtualAddress {
    VirtualAddress::new(((pdi.as_usize() as u32) << 22) | ((pti.as_usize() as u32) << 12))
}
