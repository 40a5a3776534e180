//! Well-known major numbers. Character and block majors are separate
//! namespaces.

/// Memory devices: null, zero, full, port, urandom.
pub const CHR_MEMDEV: u8 = 1;
/// Terminals: the virtual console and serial lines.
pub const CHR_TTY: u8 = 2;

/// In-memory block devices.
pub const BLK_RAMDISK: u8 = 1;
