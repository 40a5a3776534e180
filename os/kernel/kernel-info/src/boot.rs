//! # Boot Information
//!
//! The subset of the multiboot handoff the kernel core consumes. Parsing the
//! raw tag list is the boot stub's job; it fills in a [`BootInfo`] and hands
//! it to the orchestrator.

use kernel_memory_addresses::PhysicalAddress;

/// A half-open physical byte range `[start, end)`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PhysicalRange {
    pub start: PhysicalAddress,
    pub end: PhysicalAddress,
}

impl PhysicalRange {
    #[must_use]
    pub const fn new(start: PhysicalAddress, end: PhysicalAddress) -> Self {
        Self { start, end }
    }

    /// Length in bytes; zero for an inverted range.
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.end.as_u32().saturating_sub(self.start.as_u32())
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lower/upper memory sizes from the basic meminfo tag, in KiB.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BasicMemInfo {
    /// Memory below 1 MiB.
    pub lower_kib: u32,
    /// Memory above 1 MiB up to the first hole.
    pub upper_kib: u32,
}

impl BasicMemInfo {
    #[must_use]
    pub const fn lower_bytes(&self) -> u64 {
        self.lower_kib as u64 * 1024
    }

    #[must_use]
    pub const fn upper_bytes(&self) -> u64 {
        self.upper_kib as u64 * 1024
    }
}

/// Firmware classification of a memory map entry.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MemoryKind {
    Available,
    Reserved,
    AcpiReclaimable,
    AcpiNvs,
    BadRam,
    Other(u32),
}

impl From<u32> for MemoryKind {
    fn from(value: u32) -> Self {
        match value {
            1 => Self::Available,
            2 => Self::Reserved,
            3 => Self::AcpiReclaimable,
            4 => Self::AcpiNvs,
            5 => Self::BadRam,
            other => Self::Other(other),
        }
    }
}

/// One firmware memory map entry. Addresses may lie above 4 GiB.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MemoryMapEntry {
    pub addr: u64,
    pub len: u64,
    pub kind: MemoryKind,
}

impl MemoryMapEntry {
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.kind == MemoryKind::Available
    }
}

/// A boot module (initial RAM disk image), `[start, end)` in physical memory.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BootModule<'a> {
    pub range: PhysicalRange,
    pub cmdline: &'a str,
}

/// Everything the orchestrator needs from the bootloader.
#[derive(Debug, Clone, Default)]
pub struct BootInfo<'a> {
    /// Absent when the bootloader did not provide a basic meminfo tag.
    pub meminfo: Option<BasicMemInfo>,
    pub memory_map: &'a [MemoryMapEntry],
    pub modules: &'a [BootModule<'a>],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meminfo_converts_kib_to_bytes() {
        let info = BasicMemInfo {
            lower_kib: 639,
            upper_kib: 0x1_0000,
        };
        assert_eq!(info.lower_bytes(), 639 * 1024);
        assert_eq!(info.upper_bytes(), 64 * 1024 * 1024);
    }

    #[test]
    fn memory_kind_from_multiboot_type() {
        assert_eq!(MemoryKind::from(1), MemoryKind::Available);
        assert_eq!(MemoryKind::from(2), MemoryKind::Reserved);
        assert_eq!(MemoryKind::from(5), MemoryKind::BadRam);
        assert_eq!(MemoryKind::from(17), MemoryKind::Other(17));
    }

    #[test]
    fn range_length_saturates() {
        let r = PhysicalRange::new(PhysicalAddress::new(0x2000), PhysicalAddress::new(0x1000));
        assert!(r.is_empty());
        let r = PhysicalRange::new(PhysicalAddress::new(0x1000), PhysicalAddress::new(0x1800));
        assert_eq!(r.len(), 0x800);
    }
}
