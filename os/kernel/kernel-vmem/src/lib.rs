//! # Virtual Memory Support
//!
//! i686 two-level paging structures and the seams the memory manager is
//! built on.
//!
//! ## Virtual Address → Physical Address Walk
//!
//! ```text
//! | 31‒22 | 21‒12 | 11‒0   |
//! |  PD   |  PT   | Offset |
//!
//!  CR3 → Page Directory (1024 PDEs) → Page Table (1024 PTEs) → 4 KiB frame
//!                         └─ PS=1 → 4 MiB frame
//! ```
//!
//! | Level | Table          | Entry | Maps                             |
//! |:------|:---------------|:------|:---------------------------------|
//! | 2     | Page Directory | PDE   | a page table, or 4 MiB if `PS=1` |
//! | 1     | Page Table     | PTE   | one 4 KiB frame                  |
//!
//! ## Recursive self-map
//!
//! Directory slot 1023 points at the directory itself. With that entry in
//! place, the page table of slot `i` is visible at `0xFFC0_0000 + i * 4096`
//! and the directory at `0xFFFF_F000`. The kernel's [`TableMapper`] uses this
//! window; tests use the in-memory [`testing::TestPhys`] instead.
//!
//! ## What you get
//! - [`PageEntryBits`]: the shared 32-bit entry layout.
//! - [`PageDirectory`] / [`PageTable`] with typed indices and entries.
//! - [`AddressSpace`]: map/unmap/query and page classification.
//! - [`FrameAlloc`] / [`TableMapper`]: where frames come from and how tables are reached.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

#[cfg(any(test, feature = "test-support"))]
extern crate alloc;

pub mod address_space;
mod page_entry_bits;
mod page_table;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use crate::address_space::{AddressSpace, AddressSpaceError, PageSlot};
pub use crate::page_entry_bits::PageEntryBits;
pub use crate::page_table::pd::{PageDirectory, PdEntry, PdEntryKind, PdIndex};
pub use crate::page_table::pt::{PageTable, PtEntry, PtIndex};
pub use crate::page_table::{ENTRIES, join_indices, split_indices};

/// Re-export of the layout constants.
pub use kernel_info::memory as info;

use kernel_memory_addresses::{PhysicalPage, Size4K, VirtualAddress};

/// Source of physical 4 KiB frames for page tables.
///
/// Returns `None` when out of memory.
pub trait FrameAlloc {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>>;
}

/// Typed access to the paging structures of the active address space.
///
/// # Safety
/// Implementations must return references to the real, writable structures:
/// the active directory, and for [`table_mut`](Self::table_mut) the table
/// linked from directory slot `index` (whose frame is `frame`). The lifetime
/// is unchecked; callers must not hold two references to the same table.
pub trait TableMapper {
    /// The active page directory.
    ///
    /// # Safety
    /// See the trait documentation.
    unsafe fn directory_mut<'a>(&self) -> &'a mut PageDirectory;

    /// The page table linked from directory slot `index`.
    ///
    /// # Safety
    /// `frame` must be the table frame currently linked from `index`.
    unsafe fn table_mut<'a>(&self, index: PdIndex, frame: PhysicalPage<Size4K>) -> &'a mut PageTable;

    /// Drop the TLB entry for `va` after its PTE changed.
    #[inline]
    fn invalidate(&self, _va: VirtualAddress) {}

    /// Drop stale translations after directory slot `index` was linked.
    #[inline]
    fn invalidate_table(&self, _index: PdIndex) {}
}

/// Invalidate the TLB entry for one page on this CPU.
///
/// # Safety
/// Must run at CPL0.
#[cfg(target_arch = "x86")]
#[inline(always)]
pub unsafe fn invalidate_tlb_page(va: VirtualAddress) {
    unsafe {
        core::arch::asm!(
            "invlpg [{}]",
            in(reg) va.as_u32(),
            options(nostack, preserves_flags)
        );
    }
}

/// Round `x` down to a multiple of `a` (a power of two).
///
/// ```rust
/// # use kernel_vmem::align_down;
/// assert_eq!(align_down(0x1234, 4096), 0x1000);
/// assert_eq!(align_down(0x2000, 4096), 0x2000);
/// ```
#[inline(always)]
#[must_use]
pub const fn align_down(x: u64, a: u64) -> u64 {
    x & !(a - 1)
}

/// Round `x` up to a multiple of `a` (a power of two).
///
/// Operates on `u64` so that the end of a span reaching 4 GiB does not wrap.
///
/// ```rust
/// # use kernel_vmem::align_up;
/// assert_eq!(align_up(0, 4096), 0);
/// assert_eq!(align_up(1, 4096), 4096);
/// assert_eq!(align_up(0xFFFF_FFFF, 4096), 0x1_0000_0000);
/// ```
#[inline(always)]
#[must_use]
pub const fn align_up(x: u64, a: u64) -> u64 {
    (x + a - 1) & !(a - 1)
}
