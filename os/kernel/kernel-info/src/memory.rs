//! # Memory Layout
//!
//! Virtual and physical layout of the i686 kernel. Everything here is a
//! compile-time constant; the checks at the bottom keep the regions ordered.

/// Size of a page / frame in bytes.
pub const PAGE_SIZE: u32 = 4096;

/// Entries in a page directory or a page table.
pub const ENTRIES_PER_TABLE: u32 = 1024;

/// Bytes of virtual space covered by one page directory entry (4 MiB).
pub const DIRECTORY_SPAN: u32 = PAGE_SIZE * ENTRIES_PER_TABLE;

/// First user-space virtual address.
pub const U_MEM_START: u32 = 0x0010_0000;

/// Start of kernel space; the kernel image is linked here.
pub const K_MEM_START: u32 = 0xC000_0000;

/// First address of the kernel heap window.
pub const K_MEM_HEAP_START: u32 = 0xD000_0000;

/// Last address (inclusive) of the kernel heap window.
pub const K_MEM_HEAP_END: u32 = 0xEFFF_FFFF;

/// Start of the window for device memory mappings.
pub const K_MEM_DEV_START: u32 = 0xF000_0000;

/// Directory slot that maps the page directory onto itself.
pub const RECURSIVE_SLOT: u32 = ENTRIES_PER_TABLE - 1;

/// Page tables are visible at `PAGE_TABLES_BASE + pdi * PAGE_SIZE`.
pub const PAGE_TABLES_BASE: u32 = RECURSIVE_SLOT * DIRECTORY_SPAN;

/// Virtual address of the page directory itself.
pub const PAGE_DIRECTORY_ADDR: u32 = PAGE_TABLES_BASE + RECURSIVE_SLOT * PAGE_SIZE;

/// Nothing at or above this address is ever chosen as a mapping target.
pub const PAGE_LIMIT: u32 = PAGE_TABLES_BASE;

/// Start of the physical range guaranteed usable before the firmware map is known.
pub const PROT_PHYS_START: u32 = 0x0010_0000;

/// End (exclusive) of the guaranteed-usable physical range.
pub const PROT_PHYS_END: u32 = 0x00F0_0000;

/// Bytes below the 1 MiB line (real-mode memory, BIOS, VGA).
pub const LOW_MEMORY_END: u32 = 0x0010_0000;

const _: () = {
    assert!(DIRECTORY_SPAN == 4 * 1024 * 1024);
    assert!(PAGE_TABLES_BASE == 0xFFC0_0000);
    assert!(PAGE_DIRECTORY_ADDR == 0xFFFF_F000);
    assert!(U_MEM_START < K_MEM_START);
    assert!(K_MEM_START < K_MEM_HEAP_START);
    assert!(K_MEM_HEAP_END < K_MEM_DEV_START);
    assert!(K_MEM_HEAP_END + 1 == K_MEM_DEV_START);
    assert!(K_MEM_DEV_START < PAGE_LIMIT);
    assert!(K_MEM_HEAP_START.is_multiple_of(DIRECTORY_SPAN));
    assert!(PROT_PHYS_START < PROT_PHYS_END);
    assert!(PROT_PHYS_END.is_multiple_of(PAGE_SIZE));
};
