//! In-memory stand-ins for physical RAM and a frame source.
//!
//! [`TestPhys`] materializes 4 KiB frames lazily (zeroed) the first time
//! they are touched, so tests can use realistic physical addresses without
//! reserving the whole range up front.

use crate::page_table::pd::{PageDirectory, PdEntry, PdIndex};
use crate::page_table::pt::PageTable;
use crate::{FrameAlloc, PageEntryBits, TableMapper};
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use core::cell::{Cell, RefCell};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, Size4M, VirtualAddress};

#[repr(C, align(4096))]
struct Frame([u8; 4096]);

/// Sparse physical RAM with a page directory installed at a fixed frame.
pub struct TestPhys {
    directory: PhysicalPage<Size4K>,
    frames: RefCell<BTreeMap<u32, Box<Frame>>>,
    invalidations: Cell<usize>,
}

impl TestPhys {
    /// RAM whose page directory lives in `directory`, with the recursive
    /// slot pointing back at it the way the boot code leaves it.
    #[must_use]
    pub fn new(directory: PhysicalPage<Size4K>) -> Self {
        let phys = Self {
            directory,
            frames: RefCell::new(BTreeMap::new()),
            invalidations: Cell::new(0),
        };
        // SAFETY: the directory frame is owned by `phys`.
        let dir = unsafe { phys.directory_mut() };
        dir.set(
            PdIndex::RECURSIVE,
            PdEntry::make_next(directory, PageEntryBits::kernel_rw()),
        );
        phys
    }

    #[must_use]
    pub const fn directory_frame(&self) -> PhysicalPage<Size4K> {
        self.directory
    }

    /// Pointer to the first byte of `frame`, materializing it if needed.
    #[must_use]
    pub fn frame_ptr(&self, frame: PhysicalPage<Size4K>) -> *mut u8 {
        let mut frames = self.frames.borrow_mut();
        let slot = frames
            .entry(frame.index())
            .or_insert_with(|| Box::new(Frame([0; 4096])));
        slot.0.as_mut_ptr()
    }

    /// Copy of the bytes at `pa..pa + out.len()` (within one frame).
    pub fn read(&self, pa: PhysicalAddress, out: &mut [u8]) {
        let off = pa.offset::<Size4K>().as_usize();
        assert!(off + out.len() <= 4096, "read crosses a frame boundary");
        let base = self.frame_ptr(pa.page());
        // SAFETY: bounds checked above; frames are never freed while `self` lives.
        let src = unsafe { core::slice::from_raw_parts(base.add(off), out.len()) };
        out.copy_from_slice(src);
    }

    /// Number of TLB invalidations requested so far.
    #[must_use]
    pub fn invalidations(&self) -> usize {
        self.invalidations.get()
    }

    /// Install a 4 MiB leaf in directory slot `pdi`, as boot code with PSE would.
    pub fn install_4m(&self, pdi: PdIndex, page: PhysicalPage<Size4M>) {
        // SAFETY: the directory frame is owned by `self`.
        let dir = unsafe { self.directory_mut() };
        dir.set(pdi, PdEntry::make_4m(page, PageEntryBits::kernel_rw()));
    }
}

impl TableMapper for TestPhys {
    unsafe fn directory_mut<'a>(&self) -> &'a mut PageDirectory {
        // SAFETY: frames are 4 KiB aligned and zero-initialized.
        unsafe { &mut *self.frame_ptr(self.directory).cast::<PageDirectory>() }
    }

    unsafe fn table_mut<'a>(&self, _index: PdIndex, frame: PhysicalPage<Size4K>) -> &'a mut PageTable {
        // SAFETY: frames are 4 KiB aligned and zero-initialized.
        unsafe { &mut *self.frame_ptr(frame).cast::<PageTable>() }
    }

    fn invalidate(&self, _va: VirtualAddress) {
        self.invalidations.set(self.invalidations.get() + 1);
    }

    fn invalidate_table(&self, _index: PdIndex) {
        self.invalidations.set(self.invalidations.get() + 1);
    }
}

/// Hands out consecutive frames from `[next, end)`; never reuses them.
pub struct BumpAlloc {
    next: u32,
    end: u32,
    allocated: usize,
}

impl BumpAlloc {
    #[must_use]
    pub const fn new(start: u32, end: u32) -> Self {
        Self {
            next: start,
            end,
            allocated: 0,
        }
    }

    #[must_use]
    pub const fn allocated(&self) -> usize {
        self.allocated
    }
}

impl FrameAlloc for BumpAlloc {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        if self.next.checked_add(4096)? > self.end {
            return None;
        }
        let frame = PhysicalAddress::new(self.next).page();
        self.next += 4096;
        self.allocated += 1;
        Some(frame)
    }
}
