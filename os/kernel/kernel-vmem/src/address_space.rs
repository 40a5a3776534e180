//! # Address Space (i686, two-level)
//!
//! Typed walker over the active page directory.
//!
//! - [`AddressSpace::map_one`] installs one 4 KiB leaf, creating the page
//!   table on demand (zeroed, linked with [`PageEntryBits::directory_link`]).
//! - [`AddressSpace::unmap_one`] clears a 4 KiB leaf.
//! - [`AddressSpace::query`] translates a VA to `(PA, flags)`.
//! - [`AddressSpace::slot`] classifies a page for free-range searches.
//!
//! Every table access goes through the [`TableMapper`]; after each entry
//! change the mapper is asked to invalidate the affected TLB entry.

use crate::page_table::pd::{PdEntry, PdEntryKind, PdIndex};
use crate::page_table::pt::{PageTable, PtEntry};
use crate::page_table::split_indices;
use crate::{FrameAlloc, PageEntryBits, TableMapper};
use kernel_info::memory::PAGE_LIMIT;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, Size4M, VirtualAddress};

/// Handle to the (single) kernel address space.
pub struct AddressSpace<'m, M: TableMapper> {
    mapper: &'m M,
}

/// State of one 4 KiB virtual page.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PageSlot {
    /// No page table backs the enclosing 4 MiB span; the whole span is free.
    NoTable,
    /// A page table exists, the entry is absent.
    Free,
    /// A present 4 KiB leaf.
    Mapped(PhysicalPage<Size4K>, PageEntryBits),
    /// Covered by a present 4 MiB directory leaf; the whole span is used.
    Huge(PhysicalPage<Size4M>),
    /// At or above [`PAGE_LIMIT`]: the self-map window.
    Reserved,
}

impl PageSlot {
    #[inline]
    #[must_use]
    pub const fn is_free(self) -> bool {
        matches!(self, Self::NoTable | Self::Free)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum AddressSpaceError {
    #[error("no frame available for a page table")]
    OutOfMemory,
    #[error("virtual page {0} is already mapped")]
    AlreadyMapped(VirtualAddress),
    #[error("virtual page {0} is not mapped")]
    NotMapped(VirtualAddress),
    #[error("virtual page {0} lies in the self-map window")]
    Reserved(VirtualAddress),
}

impl<'m, M: TableMapper> AddressSpace<'m, M> {
    #[inline]
    pub const fn new(mapper: &'m M) -> Self {
        Self { mapper }
    }

    #[inline]
    #[must_use]
    pub const fn mapper(&self) -> &'m M {
        self.mapper
    }

    /// Read a directory entry.
    #[inline]
    #[must_use]
    pub fn directory_entry(&self, pdi: PdIndex) -> PdEntry {
        // SAFETY: the mapper hands out the active directory.
        unsafe { self.mapper.directory_mut() }.get(pdi)
    }

    /// The page table linked from `pdi`, if there is one.
    fn table(&self, pdi: PdIndex) -> Option<&'m mut PageTable> {
        match self.directory_entry(pdi).kind()? {
            PdEntryKind::NextPageTable(frame, _) => {
                // SAFETY: the directory links `frame` as the table of `pdi`.
                Some(unsafe { self.mapper.table_mut(pdi, frame) })
            }
            PdEntryKind::Leaf4MiB(..) => None,
        }
    }

    /// Classify the page containing `va`.
    #[must_use]
    pub fn slot(&self, va: VirtualAddress) -> PageSlot {
        if va.as_u32() >= PAGE_LIMIT {
            return PageSlot::Reserved;
        }
        let (pdi, pti) = split_indices(va);
        match self.directory_entry(pdi).kind() {
            None => PageSlot::NoTable,
            Some(PdEntryKind::Leaf4MiB(page, _)) => PageSlot::Huge(page),
            Some(PdEntryKind::NextPageTable(frame, _)) => {
                // SAFETY: the directory links `frame` as the table of `pdi`.
                let table = unsafe { self.mapper.table_mut(pdi, frame) };
                match table.get(pti).page_4k() {
                    Some((page, flags)) => PageSlot::Mapped(page, flags),
                    None => PageSlot::Free,
                }
            }
        }
    }

    /// Page table for `pdi`, allocating and linking a zeroed one if absent.
    ///
    /// # Errors
    /// [`AddressSpaceError::OutOfMemory`] if no frame is available, or
    /// [`AddressSpaceError::AlreadyMapped`] if the slot holds a 4 MiB leaf.
    pub fn ensure_table<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        pdi: PdIndex,
    ) -> Result<&'m mut PageTable, AddressSpaceError> {
        match self.directory_entry(pdi).kind() {
            Some(PdEntryKind::NextPageTable(frame, _)) => {
                // SAFETY: the directory links `frame` as the table of `pdi`.
                Ok(unsafe { self.mapper.table_mut(pdi, frame) })
            }
            Some(PdEntryKind::Leaf4MiB(..)) => Err(AddressSpaceError::AlreadyMapped(pdi.base())),
            None => {
                let frame = alloc.alloc_4k().ok_or(AddressSpaceError::OutOfMemory)?;
                log::trace!("page table {frame} for {}", pdi.base());
                // SAFETY: the directory is the active one.
                let dir = unsafe { self.mapper.directory_mut() };
                dir.set(pdi, PdEntry::make_next(frame, PageEntryBits::directory_link()));
                self.mapper.invalidate_table(pdi);

                // SAFETY: just linked; visible through the mapper from now on.
                let table = unsafe { self.mapper.table_mut(pdi, frame) };
                table.zero();
                Ok(table)
            }
        }
    }

    /// Map the 4 KiB page at `va` to `frame` with `flags`.
    ///
    /// # Errors
    /// Fails if `va` is in the self-map window, already mapped, or a page
    /// table cannot be allocated.
    pub fn map_one<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        va: VirtualAddress,
        frame: PhysicalPage<Size4K>,
        flags: PageEntryBits,
    ) -> Result<(), AddressSpaceError> {
        if va.as_u32() >= PAGE_LIMIT {
            return Err(AddressSpaceError::Reserved(va));
        }
        let (pdi, pti) = split_indices(va);
        let table = self.ensure_table(alloc, pdi)?;
        if table.get(pti).is_present() {
            return Err(AddressSpaceError::AlreadyMapped(va.page::<Size4K>().base()));
        }
        table.set(pti, PtEntry::make_4k(frame, flags));
        self.mapper.invalidate(va);
        Ok(())
    }

    /// Clear the 4 KiB leaf at `va` and return the frame it referenced.
    ///
    /// The frame is not released; the caller owns it.
    ///
    /// # Errors
    /// [`AddressSpaceError::NotMapped`] if there is no 4 KiB leaf at `va`.
    pub fn unmap_one(&self, va: VirtualAddress) -> Result<PhysicalPage<Size4K>, AddressSpaceError> {
        let (pdi, pti) = split_indices(va);
        let table = self.table(pdi).ok_or(AddressSpaceError::NotMapped(va))?;
        let (frame, _) = table.get(pti).page_4k().ok_or(AddressSpaceError::NotMapped(va))?;
        table.set(pti, PtEntry::zero());
        self.mapper.invalidate(va);
        Ok(frame)
    }

    /// Translate `va` to the physical address and leaf flags, if mapped.
    #[must_use]
    pub fn query(&self, va: VirtualAddress) -> Option<(PhysicalAddress, PageEntryBits)> {
        let (pdi, pti) = split_indices(va);
        match self.directory_entry(pdi).kind()? {
            PdEntryKind::Leaf4MiB(base, flags) => Some((base.join(va.offset::<Size4M>()), flags)),
            PdEntryKind::NextPageTable(frame, _) => {
                // SAFETY: the directory links `frame` as the table of `pdi`.
                let table = unsafe { self.mapper.table_mut(pdi, frame) };
                let (page, flags) = table.get(pti).page_4k()?;
                Some((page.join(va.offset::<Size4K>()), flags))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BumpAlloc, TestPhys};

    fn setup() -> (TestPhys, BumpAlloc) {
        let phys = TestPhys::new(PhysicalPage::from_index(0x100));
        let alloc = BumpAlloc::new(0x0020_0000, 0x0030_0000);
        (phys, alloc)
    }

    #[test]
    fn map_one_creates_table_and_leaf() {
        let (phys, mut alloc) = setup();
        let aspace = AddressSpace::new(&phys);

        let va = VirtualAddress::new(0xC000_5000);
        let frame = PhysicalAddress::new(0x0030_0000).page::<Size4K>();
        assert_eq!(aspace.slot(va), PageSlot::NoTable);

        aspace
            .map_one(&mut alloc, va, frame, PageEntryBits::kernel_rw())
            .unwrap();

        let pde = aspace.directory_entry(PdIndex::from(va));
        assert_eq!(
            pde.kind(),
            Some(PdEntryKind::NextPageTable(
                PhysicalPage::from_index(0x200),
                PageEntryBits::directory_link()
            ))
        );
        assert_eq!(
            aspace.query(va + 0x123),
            Some((PhysicalAddress::new(0x0030_0123), PageEntryBits::kernel_rw()))
        );
        assert_eq!(aspace.slot(va + 0x1000), PageSlot::Free);
        assert_eq!(phys.invalidations(), 2);
    }

    #[test]
    fn second_mapping_reuses_table() {
        let (phys, mut alloc) = setup();
        let aspace = AddressSpace::new(&phys);
        let flags = PageEntryBits::kernel_rw();

        aspace
            .map_one(&mut alloc, VirtualAddress::new(0xD000_0000), PhysicalPage::from_index(1), flags)
            .unwrap();
        aspace
            .map_one(&mut alloc, VirtualAddress::new(0xD000_1000), PhysicalPage::from_index(2), flags)
            .unwrap();
        assert_eq!(alloc.allocated(), 1);

        let err = aspace
            .map_one(&mut alloc, VirtualAddress::new(0xD000_1000), PhysicalPage::from_index(3), flags)
            .unwrap_err();
        assert_eq!(err, AddressSpaceError::AlreadyMapped(VirtualAddress::new(0xD000_1000)));
    }

    #[test]
    fn unmap_returns_frame() {
        let (phys, mut alloc) = setup();
        let aspace = AddressSpace::new(&phys);
        let va = VirtualAddress::new(0x0040_0000);
        aspace
            .map_one(&mut alloc, va, PhysicalPage::from_index(7), PageEntryBits::kernel_rw())
            .unwrap();

        assert_eq!(aspace.unmap_one(va), Ok(PhysicalPage::from_index(7)));
        assert_eq!(aspace.query(va), None);
        assert_eq!(aspace.unmap_one(va), Err(AddressSpaceError::NotMapped(va)));
    }

    #[test]
    fn self_map_window_is_reserved() {
        let (phys, mut alloc) = setup();
        let aspace = AddressSpace::new(&phys);
        let va = VirtualAddress::new(0xFFC0_0000);
        assert_eq!(aspace.slot(va), PageSlot::Reserved);
        assert_eq!(
            aspace.map_one(&mut alloc, va, PhysicalPage::from_index(1), PageEntryBits::kernel_rw()),
            Err(AddressSpaceError::Reserved(va))
        );
    }

    #[test]
    fn huge_directory_entry_covers_whole_span() {
        let (phys, mut alloc) = setup();
        let aspace = AddressSpace::new(&phys);
        phys.install_4m(PdIndex::new(0x300), PhysicalPage::from_index(0));

        let va = VirtualAddress::new(0xC012_3456);
        assert_eq!(aspace.slot(va), PageSlot::Huge(PhysicalPage::from_index(0)));
        assert_eq!(aspace.query(va).map(|(pa, _)| pa), Some(PhysicalAddress::new(0x0012_3456)));
        assert!(aspace
            .map_one(&mut alloc, va, PhysicalPage::from_index(1), PageEntryBits::kernel_rw())
            .is_err());
    }

    #[test]
    fn table_allocation_failure_is_reported() {
        let phys = TestPhys::new(PhysicalPage::from_index(0x100));
        let mut alloc = BumpAlloc::new(0x1000, 0x1000);
        let aspace = AddressSpace::new(&phys);
        assert_eq!(
            aspace.map_one(
                &mut alloc,
                VirtualAddress::new(0x0080_0000),
                PhysicalPage::from_index(1),
                PageEntryBits::kernel_rw()
            ),
            Err(AddressSpaceError::OutOfMemory)
        );
        assert!(!aspace.directory_entry(PdIndex::new(2)).is_present());
    }
}
