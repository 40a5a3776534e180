//! # Growable kernel heap
//!
//! A [`FreeListAllocator`] over a virtual window `[start, limit]`. Only the
//! prefix `[start, end)` is backed by memory; when no free block fits a
//! request the heap asks its [`HeapBacking`] to commit more pages at `end`
//! and retries once.

use crate::free_list::{FreeListAllocator, normalize};
use crate::vmm::{Vmm, VmmError};
use core::alloc::Layout;
use core::ptr::NonNull;
use kernel_info::memory::{K_MEM_HEAP_END, K_MEM_HEAP_START, PAGE_SIZE};
use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::{PageEntryBits, TableMapper};
use log::{debug, error};

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum HeapError {
    #[error("heap window exhausted")]
    Exhausted,
    #[error("could not back heap pages: {0}")]
    Backing(#[from] VmmError),
}

/// Commits memory for the heap.
pub trait HeapBacking {
    /// Make `[at, at + bytes)` readable and writable. `at` and `bytes` are
    /// page multiples; `at` is the current end of the heap.
    ///
    /// # Errors
    /// Whatever prevented the pages from being committed.
    fn grow(&mut self, at: usize, bytes: usize) -> Result<(), HeapError>;
}

impl<M: TableMapper> HeapBacking for Vmm<'_, M> {
    #[allow(clippy::cast_possible_truncation)]
    fn grow(&mut self, at: usize, bytes: usize) -> Result<(), HeapError> {
        let pages = u32::try_from(bytes / PAGE_SIZE as usize).map_err(|_| HeapError::Exhausted)?;
        self.alloc_region(
            VirtualAddress::new(at as u32),
            VirtualAddress::new(K_MEM_HEAP_END),
            pages,
            PageEntryBits::kernel_rw(),
        )?;
        Ok(())
    }
}

pub struct KernelHeap {
    list: FreeListAllocator,
    start: usize,
    end: usize,
    /// Last usable address (inclusive).
    limit: usize,
}

impl KernelHeap {
    /// Heap over the kernel heap window, nothing committed yet.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_window(K_MEM_HEAP_START as usize, K_MEM_HEAP_END as usize)
    }

    /// Heap over `[start, limit]`; `start` must be page aligned.
    #[must_use]
    pub const fn with_window(start: usize, limit: usize) -> Self {
        Self {
            list: FreeListAllocator::new(),
            start,
            end: start,
            limit,
        }
    }

    /// Bytes committed so far.
    #[must_use]
    pub const fn committed(&self) -> usize {
        self.end - self.start
    }

    /// Bytes currently free among the committed ones.
    #[must_use]
    pub fn free_bytes(&self) -> usize {
        self.list.free_bytes()
    }

    /// Allocate a block for `layout`, growing the heap if needed.
    ///
    /// # Errors
    /// [`HeapError::Exhausted`] if the window cannot grow far enough, or the
    /// backing's error.
    pub fn allocate<B: HeapBacking>(
        &mut self,
        backing: &mut B,
        layout: Layout,
    ) -> Result<NonNull<u8>, HeapError> {
        let (size, align) = normalize(layout.size(), layout.align());

        // SAFETY: normalized request; the list only holds committed memory.
        if let Some(p) = NonNull::new(unsafe { self.list.find_region(size, align) }) {
            return Ok(p);
        }

        self.grow(backing, size + align)?;
        // SAFETY: as above.
        NonNull::new(unsafe { self.list.find_region(size, align) }).ok_or(HeapError::Exhausted)
    }

    /// Return a block to the heap.
    ///
    /// # Safety
    /// `ptr` must come from [`allocate`](Self::allocate) on this heap with
    /// the same `layout`.
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>, layout: Layout) {
        let (size, _) = normalize(layout.size(), layout.align());
        // SAFETY: forwarded caller contract.
        unsafe { self.list.deallocate(ptr.as_ptr(), size) };
    }

    fn grow<B: HeapBacking>(&mut self, backing: &mut B, at_least: usize) -> Result<(), HeapError> {
        let page = PAGE_SIZE as usize;
        let bytes = at_least.div_ceil(page) * page;
        let room = (self.limit + 1).saturating_sub(self.end);
        if bytes > room {
            error!("heap: cannot grow by {bytes} bytes, {room} left");
            return Err(HeapError::Exhausted);
        }

        backing.grow(self.end, bytes)?;
        debug!("heap: grew by {bytes} bytes at 0x{:X}", self.end);
        // SAFETY: the backing just committed `[end, end + bytes)`.
        unsafe { self.list.add_free_region(self.end, bytes) };
        self.end += bytes;
        Ok(())
    }
}

impl Default for KernelHeap {
    fn default() -> Self {
        Self::new()
    }
}
