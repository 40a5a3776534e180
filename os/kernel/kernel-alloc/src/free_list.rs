use core::ptr::{self, null_mut};

/// Header stored at the beginning of every **free** block.
///
/// ```text
/// +----------------------+-------------------------+
/// | ListNode             |  rest of the free block |
/// +----------------------+-------------------------+
/// ^ block start          ^ block start + NODE
/// ```
///
/// `size` covers the whole block including the header.
#[repr(C)]
struct ListNode {
    size: usize,
    next: *mut ListNode,
}

/// Size and granularity of every block: sizes and addresses handed out or
/// taken back are multiples of this, so any leftover can hold a header.
pub(crate) const NODE: usize = size_of::<ListNode>();

const _: () = assert!(NODE.is_power_of_two() && NODE >= align_of::<ListNode>());

#[inline]
const fn align_up(addr: usize, align: usize) -> usize {
    (addr + (align - 1)) & !(align - 1)
}

/// Round a request to the block granularity.
#[inline]
pub(crate) const fn normalize(size: usize, align: usize) -> (usize, usize) {
    let size = if size < NODE { NODE } else { align_up(size, NODE) };
    let align = if align < NODE { NODE } else { align };
    (size, align)
}

/// First-fit, split-and-coalesce free-list allocator.
///
/// The list is kept in **address order** so neighbors can be merged on
/// insertion. `head` is a sentinel; the first real block is `head.next`.
pub(crate) struct FreeListAllocator {
    head: ListNode,
}

// Safety: only used behind a lock; the raw pointers are never shared.
unsafe impl Send for FreeListAllocator {}

impl FreeListAllocator {
    pub(crate) const fn new() -> Self {
        Self {
            head: ListNode {
                size: 0,
                next: null_mut(),
            },
        }
    }

    /// Hand `[addr, addr + size)` to the allocator, merging with neighbors.
    ///
    /// # Safety
    /// - The range must be valid, writable, and not otherwise in use.
    /// - `addr` and `size` must be multiples of [`NODE`].
    pub(crate) unsafe fn add_free_region(&mut self, addr: usize, size: usize) {
        debug_assert!(addr.is_multiple_of(NODE) && size.is_multiple_of(NODE));
        if size < NODE {
            return;
        }

        let mut prev = &raw mut self.head;
        let mut current = unsafe { (*prev).next };
        while !current.is_null() && (current as usize) < addr {
            prev = current;
            current = unsafe { (*current).next };
        }

        let new = addr as *mut ListNode;
        unsafe {
            new.write(ListNode { size, next: current });
            (*prev).next = new;
            self.merge_with_next(new);
            if !ptr::eq(prev, &raw const self.head) {
                self.merge_with_next(prev);
            }
        }
    }

    /// Absorb `node.next` into `node` if the two touch.
    unsafe fn merge_with_next(&mut self, node: *mut ListNode) {
        unsafe {
            let next = (*node).next;
            if !next.is_null() && node as usize + (*node).size == next as usize {
                (*node).size += (*next).size;
                (*node).next = (*next).next;
            }
        }
    }

    /// Carve a block of `size` bytes aligned to `align` out of the first
    /// free block that fits. Leftovers before and after go back on the list.
    ///
    /// Returns null when nothing fits.
    ///
    /// # Safety
    /// `size`/`align` must come from [`normalize`].
    pub(crate) unsafe fn find_region(&mut self, size: usize, align: usize) -> *mut u8 {
        let mut prev = &raw mut self.head;
        let mut current = unsafe { (*prev).next };
        while !current.is_null() {
            let region_start = current as usize;
            let region_end = region_start + unsafe { (*current).size };
            let alloc_start = align_up(region_start, align);
            let alloc_end = alloc_start.saturating_add(size);

            if alloc_end <= region_end {
                unsafe {
                    (*prev).next = (*current).next;
                    if region_end > alloc_end {
                        self.add_free_region(alloc_end, region_end - alloc_end);
                    }
                    if alloc_start > region_start {
                        self.add_free_region(region_start, alloc_start - region_start);
                    }
                }
                return alloc_start as *mut u8;
            }
            prev = current;
            current = unsafe { (*current).next };
        }
        null_mut()
    }

    /// Give back a block obtained from [`find_region`](Self::find_region).
    ///
    /// # Safety
    /// `ptr`/`size` must describe a live block from this allocator, with
    /// `size` as passed to `find_region`.
    pub(crate) unsafe fn deallocate(&mut self, ptr: *mut u8, size: usize) {
        if ptr.is_null() {
            return;
        }
        unsafe { self.add_free_region(ptr as usize, size) };
    }

    /// Total bytes on the free list.
    pub(crate) fn free_bytes(&self) -> usize {
        self.blocks().map(|(_, size)| size).sum()
    }

    /// `(address, size)` of each free block in address order.
    pub(crate) fn blocks(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let mut current = self.head.next;
        core::iter::from_fn(move || {
            if current.is_null() {
                return None;
            }
            // SAFETY: list nodes stay valid while `self` is borrowed.
            let node = unsafe { &*current };
            let item = (current as usize, node.size);
            current = node.next;
            Some(item)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C, align(4096))]
    struct Arena([u8; 4096]);

    fn arena() -> (Box<Arena>, FreeListAllocator, usize) {
        let mut mem = Box::new(Arena([0; 4096]));
        let base = mem.0.as_mut_ptr() as usize;
        let mut list = FreeListAllocator::new();
        unsafe { list.add_free_region(base, 4096) };
        (mem, list, base)
    }

    #[test]
    fn split_and_coalesce_restore_one_block() {
        let (_mem, mut list, base) = arena();
        let (size, align) = normalize(100, 8);
        let a = unsafe { list.find_region(size, align) };
        let b = unsafe { list.find_region(size, align) };
        assert_eq!(a as usize, base);
        assert_eq!(b as usize, base + size);
        assert_eq!(list.free_bytes(), 4096 - 2 * size);

        unsafe {
            list.deallocate(a, size);
            list.deallocate(b, size);
        }
        assert_eq!(list.blocks().collect::<Vec<_>>(), vec![(base, 4096)]);
    }

    #[test]
    fn alignment_leaves_a_head_remainder() {
        let (_mem, mut list, base) = arena();
        let (size, align) = normalize(8, 8);
        let _small = unsafe { list.find_region(size, align) };
        let (size2, align2) = normalize(64, 256);
        let aligned = unsafe { list.find_region(size2, align2) };
        assert_eq!(aligned as usize, base + 256);
        let blocks: Vec<_> = list.blocks().collect();
        assert_eq!(blocks[0], (base + NODE, 256 - NODE));
        assert_eq!(blocks[1], (base + 256 + size2, 4096 - 256 - size2));
    }

    #[test]
    fn too_large_request_returns_null() {
        let (_mem, mut list, _) = arena();
        let (size, align) = normalize(8192, 8);
        assert!(unsafe { list.find_region(size, align) }.is_null());
        assert_eq!(list.free_bytes(), 4096);
    }

    #[test]
    fn freeing_middle_block_merges_both_sides() {
        let (_mem, mut list, base) = arena();
        let (size, align) = normalize(512, 8);
        let a = unsafe { list.find_region(size, align) };
        let b = unsafe { list.find_region(size, align) };
        let c = unsafe { list.find_region(size, align) };
        unsafe {
            list.deallocate(a, size);
            list.deallocate(c, size);
        }
        assert_eq!(list.blocks().count(), 2);
        unsafe { list.deallocate(b, size) };
        assert_eq!(list.blocks().collect::<Vec<_>>(), vec![(base, 4096)]);
    }
}
