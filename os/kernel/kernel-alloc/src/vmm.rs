//! Virtual Memory Manager (VMM) for the kernel address space.
//!
//! Combines the [`AddressSpace`] walker with the [`BitmapFrameAlloc`] so that
//! every frame reachable through a present PTE is marked used.
//!
//! - [`Vmm::map_page`] / [`Vmm::map_range`] place known physical frames at
//!   the first free virtual run at or above a hint.
//! - [`Vmm::map_physical_span`] does the same for an unaligned byte span.
//! - [`Vmm::alloc_region`] backs a fixed virtual range with fresh frames.
//!
//! The free-run search treats a directory slot without a page table as
//! 4 MiB of free pages and steps over it in one go. The NULL page and the
//! self-map window are never chosen.
//!
//! # Example
//! ```ignore
//! use kernel_alloc::{frame_alloc::BitmapFrameAlloc, table_mapper::RecursiveMapper, vmm::Vmm};
//! let mut frames = BitmapFrameAlloc::new();
//! let mut vmm = Vmm::new(&RecursiveMapper, &mut frames);
//! let va = vmm.map_page(VirtualAddress::new(K_MEM_DEV_START), PhysicalAddress::new(0xB8000), PageEntryBits::device_rw())?;
//! ```

use crate::frame_alloc::{BitmapFrameAlloc, FrameAllocError};
use kernel_info::memory::{DIRECTORY_SPAN, PAGE_LIMIT, PAGE_SIZE};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};
use kernel_vmem::{AddressSpace, AddressSpaceError, PageEntryBits, PageSlot, TableMapper, align_down, align_up};
use log::{error, warn};

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum VmmError {
    #[error("out of physical memory")]
    OutOfMemory,
    #[error("no free virtual range of the requested size")]
    NoVirtualSpace,
    #[error("address not page aligned")]
    Unaligned,
    #[error("virtual range already mapped")]
    AlreadyMapped,
    #[error("virtual range exceeds its limit")]
    ExceedsLimit,
    #[error("invalid range")]
    InvalidRange,
    #[error("access to unmapped memory")]
    Unmapped,
    #[error("frame allocator: {0}")]
    Frames(FrameAllocError),
}

impl From<FrameAllocError> for VmmError {
    fn from(value: FrameAllocError) -> Self {
        match value {
            FrameAllocError::OutOfMemory => Self::OutOfMemory,
            other => Self::Frames(other),
        }
    }
}

impl From<AddressSpaceError> for VmmError {
    fn from(value: AddressSpaceError) -> Self {
        match value {
            AddressSpaceError::OutOfMemory => Self::OutOfMemory,
            AddressSpaceError::AlreadyMapped(_) => Self::AlreadyMapped,
            AddressSpaceError::NotMapped(_) => Self::Unmapped,
            AddressSpaceError::Reserved(_) => Self::ExceedsLimit,
        }
    }
}

/// Kernel virtual memory manager.
pub struct Vmm<'m, M: TableMapper> {
    aspace: AddressSpace<'m, M>,
    frames: &'m mut BitmapFrameAlloc,
}

impl<'m, M: TableMapper> Vmm<'m, M> {
    pub const fn new(mapper: &'m M, frames: &'m mut BitmapFrameAlloc) -> Self {
        Self {
            aspace: AddressSpace::new(mapper),
            frames,
        }
    }

    #[must_use]
    pub const fn address_space(&self) -> &AddressSpace<'m, M> {
        &self.aspace
    }

    #[must_use]
    pub fn frames(&mut self) -> &mut BitmapFrameAlloc {
        self.frames
    }

    /// Translate `va` to its physical address and leaf flags, if mapped.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<(PhysicalAddress, PageEntryBits)> {
        self.aspace.query(va)
    }

    /// Map the frame at `phys` at the first free page at or above `virt_min`.
    ///
    /// # Errors
    /// See [`map_range`](Self::map_range).
    pub fn map_page(
        &mut self,
        virt_min: VirtualAddress,
        phys: PhysicalAddress,
        flags: PageEntryBits,
    ) -> Result<VirtualAddress, VmmError> {
        self.map_range(virt_min, 1, phys, flags)
    }

    /// Map `n_pages` contiguous frames starting at `phys_start` to the first
    /// free run of `n_pages` virtual pages at or above `virt_min`.
    ///
    /// Frames already marked used are mapped anyway, with a warning.
    ///
    /// # Errors
    /// - [`VmmError::Unaligned`] if `phys_start` is not frame aligned.
    /// - [`VmmError::InvalidRange`] for zero pages or a run past 4 GiB.
    /// - [`VmmError::NoVirtualSpace`] if no free run exists below the self-map window.
    /// - [`VmmError::OutOfMemory`] if a page table cannot be allocated.
    pub fn map_range(
        &mut self,
        virt_min: VirtualAddress,
        n_pages: u32,
        phys_start: PhysicalAddress,
        flags: PageEntryBits,
    ) -> Result<VirtualAddress, VmmError> {
        if !phys_start.is_aligned::<Size4K>() {
            error!("vmm: physical address not page aligned: {phys_start}");
            return Err(VmmError::Unaligned);
        }
        if n_pages == 0
            || phys_start.as_u64() + u64::from(n_pages) * u64::from(PAGE_SIZE) > 1 << 32
        {
            return Err(VmmError::InvalidRange);
        }

        let virt = self.find_free_run(virt_min, n_pages)?;
        let first = phys_start.page::<Size4K>().index();
        let frames = (first..first + n_pages).map(PhysicalPage::<Size4K>::from_index);

        // The whole run is reserved before any page table gets allocated.
        let mut in_use = 0;
        for frame in frames.clone() {
            if self.frames.is_used(frame) {
                in_use += 1;
            }
            self.frames.mark_frame_used(frame);
        }
        if in_use > 0 {
            warn!("vmm: physical memory already mapped: {in_use} of {n_pages} frames at {phys_start}");
        }
        for (i, frame) in (0..n_pages).zip(frames) {
            self.aspace
                .map_one(self.frames, virt + i * PAGE_SIZE, frame, flags)?;
        }
        Ok(virt)
    }

    /// Map the byte span `[phys_start, phys_end)`, rounded out to whole
    /// frames, and return the virtual address of `phys_start`.
    ///
    /// # Errors
    /// [`VmmError::InvalidRange`] for an empty span, otherwise as
    /// [`map_range`](Self::map_range).
    pub fn map_physical_span(
        &mut self,
        virt_min: VirtualAddress,
        phys_start: PhysicalAddress,
        phys_end: PhysicalAddress,
        flags: PageEntryBits,
    ) -> Result<VirtualAddress, VmmError> {
        if phys_end <= phys_start {
            return Err(VmmError::InvalidRange);
        }
        let page = u64::from(PAGE_SIZE);
        let first = align_down(phys_start.as_u64(), page);
        let last = align_up(phys_end.as_u64(), page);
        let n_pages = u32::try_from((last - first) / page).map_err(|_| VmmError::InvalidRange)?;

        let base = self.map_range(virt_min, n_pages, phys_start.page::<Size4K>().base(), flags)?;
        Ok(base + phys_start.offset::<Size4K>().as_u32())
    }

    /// Back `[virt, virt + n_pages * 4096)` with freshly allocated frames.
    ///
    /// `virt_end_max` is the last address (inclusive) the region may touch.
    ///
    /// # Errors
    /// - [`VmmError::Unaligned`] if `virt` is not page aligned.
    /// - [`VmmError::InvalidRange`] for zero pages.
    /// - [`VmmError::ExceedsLimit`] if the region ends past `virt_end_max` or
    ///   reaches the self-map window.
    /// - [`VmmError::AlreadyMapped`] if any page in the range is in use.
    /// - [`VmmError::OutOfMemory`] when frames run out (pages mapped so far stay mapped).
    pub fn alloc_region(
        &mut self,
        virt: VirtualAddress,
        virt_end_max: VirtualAddress,
        n_pages: u32,
        flags: PageEntryBits,
    ) -> Result<VirtualAddress, VmmError> {
        if !virt.is_aligned::<Size4K>() {
            return Err(VmmError::Unaligned);
        }
        if n_pages == 0 {
            return Err(VmmError::InvalidRange);
        }
        let last = virt.as_u64() + u64::from(n_pages) * u64::from(PAGE_SIZE) - 1;
        if last > virt_end_max.as_u64() || last >= u64::from(PAGE_LIMIT) {
            return Err(VmmError::ExceedsLimit);
        }

        let all_free = (0..n_pages).all(|i| self.aspace.slot(virt + i * PAGE_SIZE).is_free());
        if !all_free {
            return Err(VmmError::AlreadyMapped);
        }

        for i in 0..n_pages {
            let frame = self.frames.alloc_frame()?;
            self.aspace
                .map_one(self.frames, virt + i * PAGE_SIZE, frame, flags)?;
        }
        Ok(virt)
    }

    /// Unmap the page at `va` and release its frame.
    ///
    /// # Errors
    /// [`VmmError::Unmapped`] if `va` is not mapped by a 4 KiB leaf.
    pub fn unmap_page(&mut self, va: VirtualAddress) -> Result<PhysicalPage<Size4K>, VmmError> {
        let frame = self.aspace.unmap_one(va)?;
        self.frames.free_frame(frame);
        Ok(frame)
    }

    /// First virtual address of a free run of `n_pages` pages at or above `virt_min`.
    fn find_free_run(&self, virt_min: VirtualAddress, n_pages: u32) -> Result<VirtualAddress, VmmError> {
        let page = u64::from(PAGE_SIZE);
        let span = u64::from(DIRECTORY_SPAN);
        let limit = u64::from(PAGE_LIMIT);
        let wanted = u64::from(n_pages);

        let mut va = align_up(virt_min.as_u64(), page).max(page);
        let mut run_start = va;
        let mut run_len = 0u64;

        while va < limit {
            if run_len == 0 {
                run_start = va;
            }
            #[allow(clippy::cast_possible_truncation)]
            let slot = self.aspace.slot(VirtualAddress::new(va as u32));
            match slot {
                PageSlot::NoTable => {
                    let span_end = align_down(va, span) + span;
                    run_len += (span_end - va) / page;
                    va = span_end;
                }
                PageSlot::Free => {
                    run_len += 1;
                    va += page;
                }
                PageSlot::Mapped(..) => {
                    run_len = 0;
                    va += page;
                }
                PageSlot::Huge(_) => {
                    run_len = 0;
                    va = align_down(va, span) + span;
                }
                PageSlot::Reserved => break,
            }
            if run_len >= wanted {
                #[allow(clippy::cast_possible_truncation)]
                return Ok(VirtualAddress::new(run_start as u32));
            }
        }

        error!("vmm: no free virtual range of {n_pages} pages above {virt_min}");
        Err(VmmError::NoVirtualSpace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_info::boot::PhysicalRange;
    use kernel_info::memory::{K_MEM_HEAP_END, K_MEM_HEAP_START, K_MEM_START};
    use kernel_vmem::PdIndex;
    use kernel_vmem::testing::TestPhys;

    fn setup() -> (TestPhys, Box<BitmapFrameAlloc>) {
        let mut frames = Box::new(BitmapFrameAlloc::new());
        frames
            .init(PhysicalRange::new(
                PhysicalAddress::new(0x0010_0000),
                PhysicalAddress::new(0x0020_0000),
            ))
            .unwrap();
        // The directory lives inside the kernel image.
        (TestPhys::new(PhysicalPage::from_index(0x100)), frames)
    }

    #[test]
    fn map_page_then_translate() {
        let (phys, mut frames) = setup();
        let mut vmm = Vmm::new(&phys, &mut frames);
        let flags = PageEntryBits::kernel_rw().with_user_access(true);

        let va = vmm
            .map_page(VirtualAddress::new(K_MEM_START), PhysicalAddress::new(0x00B8_0000), flags)
            .unwrap();
        assert_eq!(va.as_u32(), K_MEM_START);
        assert_eq!(vmm.translate(va), Some((PhysicalAddress::new(0x00B8_0000), flags)));
        assert!(vmm.frames().is_used(PhysicalPage::from_index(0xB80)));
    }

    #[test]
    fn map_range_never_uses_its_own_frames_as_tables() {
        let (phys, mut frames) = setup();
        let mut vmm = Vmm::new(&phys, &mut frames);
        let flags = PageEntryBits::kernel_rw();

        // Directly after the kernel image: the lowest free frames.
        let va = vmm
            .map_range(VirtualAddress::new(K_MEM_START), 3, PhysicalAddress::new(0x0020_0000), flags)
            .unwrap();
        for i in 0..3 {
            let (pa, _) = vmm.translate(va + i * PAGE_SIZE).unwrap();
            assert_eq!(pa.as_u32(), 0x0020_0000 + i * PAGE_SIZE);
        }
        // The page table went to the first frame past the run.
        assert!(vmm.frames().is_used(PhysicalPage::from_index(0x203)));
        assert_eq!(vmm.frames().alloc_frame().unwrap().base().as_u32(), 0x0020_4000);
    }

    #[test]
    fn map_page_takes_the_next_free_page() {
        let (phys, mut frames) = setup();
        let mut vmm = Vmm::new(&phys, &mut frames);
        let flags = PageEntryBits::kernel_rw();
        let start = VirtualAddress::new(K_MEM_START);

        let a = vmm.map_page(start, PhysicalAddress::new(0x0030_0000), flags).unwrap();
        let b = vmm.map_page(start, PhysicalAddress::new(0x0030_1000), flags).unwrap();
        assert_eq!(a, start);
        assert_eq!(b, start + PAGE_SIZE);
    }

    #[test]
    fn map_page_rejects_unaligned_frames() {
        let (phys, mut frames) = setup();
        let mut vmm = Vmm::new(&phys, &mut frames);
        assert_eq!(
            vmm.map_page(
                VirtualAddress::new(K_MEM_START),
                PhysicalAddress::new(0x0030_0010),
                PageEntryBits::kernel_rw()
            ),
            Err(VmmError::Unaligned)
        );
    }

    #[test]
    fn null_page_is_never_chosen() {
        let (phys, mut frames) = setup();
        let mut vmm = Vmm::new(&phys, &mut frames);
        let va = vmm
            .map_page(VirtualAddress::zero(), PhysicalAddress::new(0x0030_0000), PageEntryBits::kernel_rw())
            .unwrap();
        assert_eq!(va.as_u32(), 0x1000);
    }

    #[test]
    fn map_range_is_contiguous() {
        let (phys, mut frames) = setup();
        let mut vmm = Vmm::new(&phys, &mut frames);
        let flags = PageEntryBits::kernel_rw();

        let va = vmm
            .map_range(VirtualAddress::new(K_MEM_START), 5, PhysicalAddress::new(0x0040_0000), flags)
            .unwrap();
        for i in 0..5 {
            let (pa, _) = vmm.translate(va + i * PAGE_SIZE).unwrap();
            assert_eq!(pa.as_u32(), 0x0040_0000 + i * PAGE_SIZE);
        }
    }

    #[test]
    fn map_range_skips_occupied_pages() {
        let (phys, mut frames) = setup();
        let mut vmm = Vmm::new(&phys, &mut frames);
        let flags = PageEntryBits::kernel_rw();
        let start = VirtualAddress::new(K_MEM_START);

        // Occupy the third page of the span.
        vmm.alloc_region(start + 2 * PAGE_SIZE, VirtualAddress::new(u32::MAX), 1, flags)
            .unwrap();
        let va = vmm
            .map_range(start, 3, PhysicalAddress::new(0x0040_0000), flags)
            .unwrap();
        assert_eq!(va, start + 3 * PAGE_SIZE);
    }

    #[test]
    fn absent_directory_entries_are_skipped_in_bulk() {
        let (phys, mut frames) = setup();
        let mut vmm = Vmm::new(&phys, &mut frames);
        let flags = PageEntryBits::kernel_rw();

        // A run of 2048 pages fits in two table-less directory slots.
        let va = vmm
            .map_range(VirtualAddress::new(K_MEM_HEAP_START), 2048, PhysicalAddress::new(0x0100_0000), flags)
            .unwrap();
        assert_eq!(va.as_u32(), K_MEM_HEAP_START);
        assert!(vmm.address_space().directory_entry(PdIndex::from(va)).is_present());
        assert!(vmm
            .address_space()
            .directory_entry(PdIndex::from(va + DIRECTORY_SPAN))
            .is_present());
    }

    #[test]
    fn huge_directory_entries_are_used() {
        let (phys, mut frames) = setup();
        phys.install_4m(PdIndex::from(VirtualAddress::new(K_MEM_START)), PhysicalPage::from_index(0));
        let mut vmm = Vmm::new(&phys, &mut frames);

        let va = vmm
            .map_page(VirtualAddress::new(K_MEM_START), PhysicalAddress::new(0x0030_0000), PageEntryBits::kernel_rw())
            .unwrap();
        assert_eq!(va.as_u32(), K_MEM_START + DIRECTORY_SPAN);
    }

    #[test]
    fn search_stops_at_the_self_map_window() {
        let (phys, mut frames) = setup();
        let mut vmm = Vmm::new(&phys, &mut frames);
        assert_eq!(
            vmm.map_range(
                VirtualAddress::new(PAGE_LIMIT - PAGE_SIZE),
                2,
                PhysicalAddress::new(0x0030_0000),
                PageEntryBits::kernel_rw()
            ),
            Err(VmmError::NoVirtualSpace)
        );
    }

    #[test]
    fn map_physical_span_returns_offset_address() {
        let (phys, mut frames) = setup();
        let mut vmm = Vmm::new(&phys, &mut frames);

        let va = vmm
            .map_physical_span(
                VirtualAddress::new(K_MEM_START),
                PhysicalAddress::new(0x0030_0800),
                PhysicalAddress::new(0x0030_2001),
                PageEntryBits::kernel_rw(),
            )
            .unwrap();
        assert_eq!(va.as_u32(), K_MEM_START + 0x800);
        // Three frames: 0x300000, 0x301000, 0x302000.
        for i in 0..3 {
            assert!(vmm.translate(VirtualAddress::new(K_MEM_START + i * PAGE_SIZE)).is_some());
        }
        assert!(vmm.translate(VirtualAddress::new(K_MEM_START + 3 * PAGE_SIZE)).is_none());
        assert_eq!(
            vmm.map_physical_span(
                VirtualAddress::new(K_MEM_START),
                PhysicalAddress::new(0x0030_0000),
                PhysicalAddress::new(0x0030_0000),
                PageEntryBits::kernel_rw()
            ),
            Err(VmmError::InvalidRange)
        );
    }

    #[test]
    fn alloc_region_maps_exactly_at_virt() {
        let (phys, mut frames) = setup();
        let mut vmm = Vmm::new(&phys, &mut frames);
        let start = VirtualAddress::new(K_MEM_HEAP_START);
        let end = VirtualAddress::new(K_MEM_HEAP_END);

        let va = vmm.alloc_region(start, end, 4, PageEntryBits::kernel_rw()).unwrap();
        assert_eq!(va, start);
        let mut seen = Vec::new();
        for i in 0..4 {
            let (pa, _) = vmm.translate(start + i * PAGE_SIZE).unwrap();
            assert!(vmm.frames().is_used(pa.page()));
            seen.push(pa);
        }
        seen.dedup();
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn alloc_region_rejections() {
        let (phys, mut frames) = setup();
        let mut vmm = Vmm::new(&phys, &mut frames);
        let flags = PageEntryBits::kernel_rw();
        let start = VirtualAddress::new(K_MEM_HEAP_START);
        let end = VirtualAddress::new(K_MEM_HEAP_END);

        assert_eq!(vmm.alloc_region(start + 1, end, 1, flags), Err(VmmError::Unaligned));
        assert_eq!(
            vmm.alloc_region(VirtualAddress::new(K_MEM_HEAP_END - 0xFFF), end, 2, flags),
            Err(VmmError::ExceedsLimit)
        );
        assert_eq!(
            vmm.alloc_region(
                VirtualAddress::new(PAGE_LIMIT - PAGE_SIZE),
                VirtualAddress::new(u32::MAX),
                2,
                flags
            ),
            Err(VmmError::ExceedsLimit)
        );

        vmm.alloc_region(start + PAGE_SIZE, end, 1, flags).unwrap();
        assert_eq!(vmm.alloc_region(start, end, 2, flags), Err(VmmError::AlreadyMapped));
        // The first page was not touched by the failed call.
        assert!(vmm.translate(start).is_none());

        // Exactly up to the inclusive limit is fine.
        assert!(vmm
            .alloc_region(VirtualAddress::new(K_MEM_HEAP_END - 0xFFF), end, 1, flags)
            .is_ok());
    }

    #[test]
    fn alloc_region_reports_frame_exhaustion() {
        let (phys, mut frames) = setup();
        let free = frames.free_frames();
        frames.mark_used(0, 1 << 32);
        assert!(free > 0);
        let mut vmm = Vmm::new(&phys, &mut frames);
        assert_eq!(
            vmm.alloc_region(
                VirtualAddress::new(K_MEM_HEAP_START),
                VirtualAddress::new(K_MEM_HEAP_END),
                1,
                PageEntryBits::kernel_rw()
            ),
            Err(VmmError::OutOfMemory)
        );
    }

    #[test]
    fn alloc_region_before_frame_init_is_reported() {
        let phys = TestPhys::new(PhysicalPage::from_index(0x100));
        let mut frames = Box::new(BitmapFrameAlloc::new());
        let mut vmm = Vmm::new(&phys, &mut frames);
        assert_eq!(
            vmm.alloc_region(
                VirtualAddress::new(K_MEM_HEAP_START),
                VirtualAddress::new(K_MEM_HEAP_END),
                1,
                PageEntryBits::kernel_rw()
            ),
            Err(VmmError::Frames(FrameAllocError::Uninitialized))
        );
    }

    #[test]
    fn unmap_page_releases_the_frame() {
        let (phys, mut frames) = setup();
        let mut vmm = Vmm::new(&phys, &mut frames);
        let va = VirtualAddress::new(K_MEM_HEAP_START);
        vmm.alloc_region(va, VirtualAddress::new(K_MEM_HEAP_END), 1, PageEntryBits::kernel_rw())
            .unwrap();
        let frame = vmm.unmap_page(va).unwrap();
        assert!(!vmm.frames().is_used(frame));
        assert_eq!(vmm.unmap_page(va), Err(VmmError::Unmapped));
    }
}
