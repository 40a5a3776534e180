use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, Size4M};

/// A single 32-bit i686 paging entry in its raw bitfield form.
///
/// The same layout serves page directory entries (PDE) and page table
/// entries (PTE). Bit 7 is `PS` in a PDE (4 MiB leaf when set) and `PAT` in
/// a PTE; this view calls it `large_page` and the typed wrappers
/// ([`PdEntry`](crate::PdEntry), [`PtEntry`](crate::PtEntry)) keep it
/// consistent.
///
/// | Bits  | Name            | Meaning                        |
/// |-------|-----------------|--------------------------------|
/// | 0     | `P`             | present                        |
/// | 1     | `RW`            | writable                       |
/// | 2     | `US`            | user accessible                |
/// | 3     | `PWT`           | write-through                  |
/// | 4     | `PCD`           | cache disabled                 |
/// | 5     | `A`             | accessed (set by CPU)          |
/// | 6     | `D`             | dirty (set by CPU, leaf only)  |
/// | 7     | `PS` / `PAT`    | 4 MiB leaf (PDE) / PAT (PTE)   |
/// | 8     | `G`             | global                         |
/// | 9–11  | OS available    | ignored by hardware            |
/// | 12–31 | frame           | physical frame number          |
///
/// ```rust
/// # use kernel_vmem::PageEntryBits;
/// let e = PageEntryBits::from(0x0012_3003);
/// assert!(e.present() && e.writable());
/// assert_eq!(e.physical_address().as_u32(), 0x0012_3000);
/// assert_eq!(e.flags_only(), PageEntryBits::kernel_rw());
/// ```
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PageEntryBits {
    /// Present (P, bit 0).
    pub present: bool,
    /// Writable (RW, bit 1).
    pub writable: bool,
    /// User/Supervisor (US, bit 2).
    pub user_access: bool,
    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,
    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,
    /// Accessed (A, bit 5).
    pub accessed: bool,
    /// Dirty (D, bit 6).
    pub dirty: bool,
    /// Page Size in a PDE, PAT in a PTE (bit 7).
    pub large_page: bool,
    /// Global (G, bit 8).
    pub global_translation: bool,
    /// OS-available (bits 9..=11).
    #[bits(3)]
    pub os_available: u8,
    /// Physical frame number (bits 12..=31).
    #[bits(20)]
    frame: u32,
}

impl PageEntryBits {
    /// Mask of the non-address bits.
    pub const FLAG_MASK: u32 = 0xFFF;

    #[inline]
    pub const fn set_physical_address(&mut self, phys: PhysicalAddress) {
        self.set_frame(phys.as_u32() >> 12);
    }

    #[inline]
    #[must_use]
    pub const fn physical_address(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.frame() << 12)
    }

    #[inline]
    #[must_use]
    pub const fn physical_page(&self) -> PhysicalPage<Size4K> {
        PhysicalPage::from_index(self.frame())
    }

    /// Base of the 4 MiB frame referenced by a `PS=1` directory entry.
    #[inline]
    #[must_use]
    pub const fn physical_page_4m(&self) -> PhysicalPage<Size4M> {
        PhysicalPage::from_addr(self.physical_address())
    }

    /// The same entry with the frame bits cleared.
    #[inline]
    #[must_use]
    pub const fn flags_only(self) -> Self {
        self.with_frame(0)
    }

    /// Present + writable, supervisor only. Default for kernel data pages.
    #[inline]
    #[must_use]
    pub const fn kernel_rw() -> Self {
        Self::new().with_present(true).with_writable(true)
    }

    /// Present + writable + user: flags for directory entries that link a
    /// page table. Access is then restricted per page by the PTE.
    #[inline]
    #[must_use]
    pub const fn directory_link() -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_user_access(true)
    }

    /// Kernel RW mapping with caching disabled, for device memory.
    #[inline]
    #[must_use]
    pub const fn device_rw() -> Self {
        Self::kernel_rw()
            .with_write_through(true)
            .with_cache_disabled(true)
    }
}
