//! The object that owns the kernel-wide singletons.

use kernel_alloc::frame_alloc::BitmapFrameAlloc;
use kernel_alloc::heap::{HeapBacking, HeapError};
use kernel_alloc::vmm::Vmm;
use kernel_drivers::DeviceRegistry;
use kernel_sync::SpinLock;
use kernel_vmem::TableMapper;

/// Frame allocator, paging access and device registry of one kernel.
///
/// On the target these are statics; tests build their own with an
/// in-memory [`TableMapper`].
pub struct KernelContext<'k, M: TableMapper> {
    pub frames: &'k SpinLock<BitmapFrameAlloc>,
    pub mapper: &'k M,
    pub devices: &'k DeviceRegistry<'k>,
}

impl<'k, M: TableMapper> KernelContext<'k, M> {
    pub const fn new(
        frames: &'k SpinLock<BitmapFrameAlloc>,
        mapper: &'k M,
        devices: &'k DeviceRegistry<'k>,
    ) -> Self {
        Self {
            frames,
            mapper,
            devices,
        }
    }

    /// Run `f` with a memory manager over the locked frame allocator.
    ///
    /// The frame lock is held for the duration of `f`; `f` must not
    /// allocate from the kernel heap.
    pub fn with_vmm<R>(&self, f: impl FnOnce(&mut Vmm<'_, M>) -> R) -> R {
        self.frames.with_lock(|frames| {
            let mut vmm = Vmm::new(self.mapper, frames);
            f(&mut vmm)
        })
    }
}

/// Heap growth straight into the kernel address space.
impl<M: TableMapper> HeapBacking for &KernelContext<'_, M> {
    fn grow(&mut self, at: usize, bytes: usize) -> Result<(), HeapError> {
        self.with_vmm(|vmm| vmm.grow(at, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_info::boot::PhysicalRange;
    use kernel_info::memory::K_MEM_HEAP_START;
    use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, VirtualAddress};
    use kernel_vmem::testing::TestPhys;

    #[test]
    fn heap_growth_goes_through_the_shared_frames() {
        let frames = Box::new(SpinLock::new(BitmapFrameAlloc::new()));
        frames
            .lock()
            .init(PhysicalRange::new(
                PhysicalAddress::new(0x0010_0000),
                PhysicalAddress::new(0x0020_0000),
            ))
            .unwrap();
        let phys = TestPhys::new(PhysicalPage::from_index(0x100));
        let devices = DeviceRegistry::new();
        let ctx = KernelContext::new(&frames, &phys, &devices);

        let before = frames.lock().free_frames();
        (&ctx).grow(K_MEM_HEAP_START as usize, 4096).unwrap();

        assert!(!frames.is_locked());
        // One page table plus one heap page.
        assert_eq!(frames.lock().free_frames(), before - 2);
        let mapped = ctx.with_vmm(|vmm| vmm.translate(VirtualAddress::new(K_MEM_HEAP_START)));
        assert!(mapped.is_some());
    }
}
