//! Physical frame allocator: one bit per 4 KiB frame of the 32-bit space.
//!
//! A set bit means the frame is used. Allocation is a first-fit scan over a
//! search window that starts as the range every PC is guaranteed to have
//! (`[1 MiB, 15 MiB)`) and widens once the bootloader reports how much memory
//! is installed.

use kernel_info::boot::PhysicalRange;
use kernel_info::memory::{LOW_MEMORY_END, PAGE_SIZE, PROT_PHYS_END, PROT_PHYS_START};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};
use kernel_vmem::FrameAlloc;
use log::{debug, error, info};

/// Frames in the 4 GiB physical space.
const FRAME_COUNT: u32 = 1 << 20;
const BITS_PER_WORD: u32 = u32::BITS;
const WORDS: usize = (FRAME_COUNT / BITS_PER_WORD) as usize;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FrameAllocError {
    #[error("no free physical frame left")]
    OutOfMemory,
    #[error("frame allocator used before init")]
    Uninitialized,
    #[error("frame allocator initialized twice")]
    AlreadyInitialized,
}

pub struct BitmapFrameAlloc {
    bitmap: [u32; WORDS],
    /// Search window in frame numbers, `[start, end)`.
    window_start: u32,
    window_end: u32,
    initialized: bool,
}

impl Default for BitmapFrameAlloc {
    fn default() -> Self {
        Self::new()
    }
}

impl BitmapFrameAlloc {
    /// Empty bitmap; allocation is restricted to the guaranteed-usable range
    /// until [`init_regions`](Self::init_regions) runs.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bitmap: [0; WORDS],
            window_start: PROT_PHYS_START / PAGE_SIZE,
            window_end: PROT_PHYS_END / PAGE_SIZE,
            initialized: false,
        }
    }

    /// Mark the kernel image used. Must run once, before any allocation.
    ///
    /// # Errors
    /// [`FrameAllocError::AlreadyInitialized`] on a second call.
    pub fn init(&mut self, kernel_image: PhysicalRange) -> Result<(), FrameAllocError> {
        if self.initialized {
            return Err(FrameAllocError::AlreadyInitialized);
        }
        self.mark_used(
            kernel_image.start.as_u64(),
            u64::from(kernel_image.len()),
        );
        self.initialized = true;
        info!(
            "frames: kernel image {}..{} reserved",
            kernel_image.start, kernel_image.end
        );
        Ok(())
    }

    /// Apply the bootloader's basic memory info: `[lower, 1 MiB)` is
    /// reserved and the window becomes `[0, 1 MiB + upper)`.
    pub fn init_regions(&mut self, lower_bytes: u64, upper_bytes: u64) {
        let low_end = u64::from(LOW_MEMORY_END);
        if lower_bytes < low_end {
            self.mark_used(lower_bytes, low_end - lower_bytes);
        }

        let top = (low_end + upper_bytes).min(u64::from(FRAME_COUNT) * u64::from(PAGE_SIZE));
        self.window_start = 0;
        self.window_end = frame_ceil(top);
        info!(
            "frames: lower {} KiB, upper {} KiB, {} frames searchable",
            lower_bytes / 1024,
            upper_bytes / 1024,
            self.window_end
        );
    }

    /// Mark every frame overlapping `[phys, phys + size)` used.
    ///
    /// Addresses beyond 4 GiB are ignored; `size == 0` marks nothing.
    pub fn mark_used(&mut self, phys: u64, size: u64) {
        if size == 0 {
            return;
        }
        let first = frame_floor(phys);
        let end = frame_ceil(phys.saturating_add(size));
        debug!("frames: reserve 0x{phys:08X} + 0x{size:X}");
        self.set_range(first, end);
    }

    /// Mark a single frame used.
    pub fn mark_frame_used(&mut self, frame: PhysicalPage<Size4K>) {
        let i = frame.index();
        self.bitmap[word(i)] |= bit(i);
    }

    /// Return a frame to the pool.
    pub fn free_frame(&mut self, frame: PhysicalPage<Size4K>) {
        let i = frame.index();
        self.bitmap[word(i)] &= !bit(i);
    }

    #[must_use]
    pub const fn is_used(&self, frame: PhysicalPage<Size4K>) -> bool {
        let i = frame.index();
        self.bitmap[word(i)] & bit(i) != 0
    }

    /// Take the lowest free frame in the search window.
    ///
    /// # Errors
    /// [`FrameAllocError::Uninitialized`] before [`init`](Self::init), and
    /// [`FrameAllocError::OutOfMemory`] when the window is exhausted.
    pub fn alloc_frame(&mut self) -> Result<PhysicalPage<Size4K>, FrameAllocError> {
        if !self.initialized {
            return Err(FrameAllocError::Uninitialized);
        }

        let mut i = self.window_start;
        while i < self.window_end {
            let w = self.bitmap[word(i)];
            if w == u32::MAX {
                // Whole word used; jump to the next word boundary.
                i = (i / BITS_PER_WORD + 1) * BITS_PER_WORD;
                continue;
            }
            if w & bit(i) == 0 {
                self.bitmap[word(i)] |= bit(i);
                return Ok(PhysicalPage::from_index(i));
            }
            i += 1;
        }

        error!("frames: out of physical memory");
        Err(FrameAllocError::OutOfMemory)
    }

    /// Free frames left in the search window.
    #[must_use]
    pub fn free_frames(&self) -> usize {
        (self.window_start..self.window_end)
            .filter(|&i| self.bitmap[word(i)] & bit(i) == 0)
            .count()
    }

    /// Current search window as a physical byte range `[start, end)`.
    #[must_use]
    pub fn window(&self) -> (PhysicalAddress, u64) {
        (
            PhysicalAddress::new(self.window_start * PAGE_SIZE),
            u64::from(self.window_end) * u64::from(PAGE_SIZE),
        )
    }

    fn set_range(&mut self, first: u32, end: u32) {
        let mut i = first;
        while i < end {
            if i % BITS_PER_WORD == 0 && end - i >= BITS_PER_WORD {
                self.bitmap[word(i)] = u32::MAX;
                i += BITS_PER_WORD;
            } else {
                self.bitmap[word(i)] |= bit(i);
                i += 1;
            }
        }
    }
}

impl FrameAlloc for BitmapFrameAlloc {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        self.alloc_frame().ok()
    }
}

#[inline]
const fn word(frame: u32) -> usize {
    (frame / BITS_PER_WORD) as usize
}

#[inline]
const fn bit(frame: u32) -> u32 {
    1 << (frame % BITS_PER_WORD)
}

/// Frame containing `addr`, clamped to the frame count.
#[allow(clippy::cast_possible_truncation)]
fn frame_floor(addr: u64) -> u32 {
    (addr / u64::from(PAGE_SIZE)).min(u64::from(FRAME_COUNT)) as u32
}

/// First frame at or above `addr`, clamped to the frame count.
#[allow(clippy::cast_possible_truncation)]
fn frame_ceil(addr: u64) -> u32 {
    addr.div_ceil(u64::from(PAGE_SIZE)).min(u64::from(FRAME_COUNT)) as u32
}
