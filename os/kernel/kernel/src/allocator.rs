//! # Kernel global allocator
//!
//! [`KernelAllocator`] serves `alloc` from a [`KernelHeap`] that grows into
//! the kernel heap window through the context's memory manager.
//!
//! Locks are always taken heap first, frames second. Code holding the frame
//! lock (everything inside [`KernelContext::with_vmm`]) must not allocate.

#![allow(unsafe_code)]

use crate::context::KernelContext;
use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull};
use kernel_alloc::heap::KernelHeap;
use kernel_sync::SpinLock;
use kernel_vmem::TableMapper;
use log::error;

pub struct KernelAllocator<'k, M: TableMapper> {
    heap: SpinLock<KernelHeap>,
    ctx: &'k KernelContext<'k, M>,
}

impl<'k, M: TableMapper> KernelAllocator<'k, M> {
    /// Allocator over the standard kernel heap window.
    pub const fn new(ctx: &'k KernelContext<'k, M>) -> Self {
        Self::with_heap(ctx, KernelHeap::new())
    }

    pub const fn with_heap(ctx: &'k KernelContext<'k, M>, heap: KernelHeap) -> Self {
        Self {
            heap: SpinLock::new(heap),
            ctx,
        }
    }

    /// Bytes of the heap window backed by memory.
    #[must_use]
    pub fn committed(&self) -> usize {
        self.heap.lock().committed()
    }
}

unsafe impl<M: TableMapper> GlobalAlloc for KernelAllocator<'_, M> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let mut backing = self.ctx;
        match self.heap.lock().allocate(&mut backing, layout) {
            Ok(p) => p.as_ptr(),
            Err(e) => {
                error!("heap: {} bytes (align {}): {e}", layout.size(), layout.align());
                ptr::null_mut()
            }
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let Some(ptr) = NonNull::new(ptr) else { return };
        // SAFETY: GlobalAlloc contract: `ptr` came from `alloc` with `layout`.
        unsafe { self.heap.lock().deallocate(ptr, layout) };
    }
}
