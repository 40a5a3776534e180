//! # Page Directory (PD)
//!
//! - [`PdIndex`]: index for virtual-address bits `[31:22]`.
//! - [`PdEntry`]: either a link to a page table (`PS=0`) or a 4 MiB leaf (`PS=1`).
//! - [`PdEntryKind`]: decoded view of a present entry.
//! - [`PageDirectory`]: 4 KiB-aligned array of 1024 PDEs.
//!
//! Slot 1023 holds the recursive self-map installed by the boot code.

use crate::PageEntryBits;
use crate::page_table::ENTRIES;
use kernel_memory_addresses::{PhysicalPage, Size4K, Size4M, VirtualAddress};

/// Index into the Page Directory (`0..1024`). One slot spans 4 MiB.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PdIndex(u16);

#[doc(alias = "PDE")]
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PdEntry(PageEntryBits);

/// Decoded present directory entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PdEntryKind {
    /// `PS=0`: the 4 MiB span is described by the page table in this frame.
    NextPageTable(PhysicalPage<Size4K>, PageEntryBits),
    /// `PS=1`: the whole span maps one 4 MiB frame.
    Leaf4MiB(PhysicalPage<Size4M>, PageEntryBits),
}

#[doc(alias = "PD")]
#[repr(C, align(4096))]
pub struct PageDirectory {
    entries: [PdEntry; ENTRIES],
}

impl PdIndex {
    /// Directory slot of the recursive self-map.
    pub const RECURSIVE: Self = Self(1023);

    /// Extract bits `[31:22]` of `va`.
    #[inline]
    #[must_use]
    pub const fn from(va: VirtualAddress) -> Self {
        Self::new((va.as_u32() >> 22) as u16)
    }

    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!(v < 1024);
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// First virtual address covered by this slot.
    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress::new((self.0 as u32) << 22)
    }
}

impl PdEntry {
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(PageEntryBits::new())
    }

    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        self.0.present()
    }

    #[inline]
    #[must_use]
    pub const fn flags(self) -> PageEntryBits {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn kind(self) -> Option<PdEntryKind> {
        if !self.is_present() {
            return None;
        }
        if self.0.large_page() {
            Some(PdEntryKind::Leaf4MiB(
                self.0.physical_page_4m(),
                self.0.flags_only(),
            ))
        } else {
            Some(PdEntryKind::NextPageTable(
                self.0.physical_page(),
                self.0.flags_only(),
            ))
        }
    }

    /// Link to the page table in `table`; forces `PS=0` and `present`.
    #[inline]
    #[must_use]
    pub const fn make_next(table: PhysicalPage<Size4K>, mut flags: PageEntryBits) -> Self {
        flags.set_large_page(false);
        flags.set_present(true);
        flags.set_physical_address(table.base());
        Self(flags)
    }

    /// 4 MiB leaf (requires CR4.PSE); forces `PS=1` and `present`.
    #[inline]
    #[must_use]
    pub const fn make_4m(page: PhysicalPage<Size4M>, mut flags: PageEntryBits) -> Self {
        flags.set_large_page(true);
        flags.set_present(true);
        flags.set_physical_address(page.base());
        Self(flags)
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0.into_bits()
    }
}

impl PageDirectory {
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [PdEntry::zero(); ENTRIES],
        }
    }

    #[inline]
    pub fn zero(&mut self) {
        self.entries.fill(PdEntry::zero());
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, i: PdIndex) -> PdEntry {
        self.entries[i.as_usize()]
    }

    /// Caller handles TLB invalidation when changing active mappings.
    #[inline]
    pub const fn set(&mut self, i: PdIndex, e: PdEntry) {
        self.entries[i.as_usize()] = e;
    }
}
