//! # Recursive-window [`TableMapper`]
//!
//! The boot code points directory slot 1023 at the directory itself, so the
//! MMU resolves
//!
//! - `0xFFFF_F000` to the page directory, and
//! - `0xFFC0_0000 + i * 4096` to the page table linked from slot `i`.
//!
//! This mapper turns those fixed addresses into typed references. It is
//! only meaningful on the i686 target with paging enabled.

use kernel_info::memory::{PAGE_DIRECTORY_ADDR, PAGE_SIZE, PAGE_TABLES_BASE};
use kernel_memory_addresses::{PhysicalPage, Size4K, VirtualAddress};
use kernel_vmem::{PageDirectory, PageTable, PdIndex, TableMapper};

/// [`TableMapper`] over the recursive self-map window.
#[derive(Debug, Default, Copy, Clone)]
pub struct RecursiveMapper;

impl RecursiveMapper {
    /// Window address of the page table for directory slot `index`.
    #[inline]
    #[must_use]
    pub const fn table_address(index: PdIndex) -> VirtualAddress {
        VirtualAddress::new(PAGE_TABLES_BASE + index.as_usize() as u32 * PAGE_SIZE)
    }
}

impl TableMapper for RecursiveMapper {
    unsafe fn directory_mut<'a>(&self) -> &'a mut PageDirectory {
        // SAFETY: with the self-map installed this address is the directory.
        unsafe { &mut *VirtualAddress::new(PAGE_DIRECTORY_ADDR).as_mut_ptr::<PageDirectory>() }
    }

    unsafe fn table_mut<'a>(&self, index: PdIndex, _frame: PhysicalPage<Size4K>) -> &'a mut PageTable {
        // SAFETY: caller guarantees slot `index` links a page table.
        unsafe { &mut *Self::table_address(index).as_mut_ptr::<PageTable>() }
    }

    #[cfg(target_arch = "x86")]
    fn invalidate(&self, va: VirtualAddress) {
        // SAFETY: the kernel runs at CPL0.
        unsafe { kernel_vmem::invalidate_tlb_page(va) }
    }

    #[cfg(target_arch = "x86")]
    fn invalidate_table(&self, index: PdIndex) {
        // SAFETY: the kernel runs at CPL0.
        unsafe { kernel_vmem::invalidate_tlb_page(Self::table_address(index)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_addresses() {
        assert_eq!(RecursiveMapper::table_address(PdIndex::new(0)).as_u32(), 0xFFC0_0000);
        assert_eq!(RecursiveMapper::table_address(PdIndex::new(0x340)).as_u32(), 0xFFF4_0000);
        assert_eq!(
            RecursiveMapper::table_address(PdIndex::RECURSIVE).as_u32(),
            PAGE_DIRECTORY_ADDR
        );
    }
}
