//! Device numbers.

use core::fmt;

/// Packed `major:minor` pair: bits 0..8 hold the major, bits 8..32 the minor.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[repr(transparent)]
pub struct DeviceNumber(u32);

impl DeviceNumber {
    /// `0:0`, the "no device" number.
    pub const NULL: Self = Self(0);

    /// Largest minor that fits.
    pub const MAX_MINOR: u32 = (1 << 24) - 1;

    /// Minors wider than 24 bits are truncated.
    #[must_use]
    pub const fn new(major: u8, minor: u32) -> Self {
        Self((minor << 8) | major as u32)
    }

    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn major(self) -> u8 {
        self.0 as u8
    }

    #[must_use]
    pub const fn minor(self) -> u32 {
        self.0 >> 8
    }

    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for DeviceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major(), self.minor())
    }
}

impl fmt::Debug for DeviceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dev({self})")
    }
}

impl From<u32> for DeviceNumber {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing() {
        let d = DeviceNumber::new(2, 1);
        assert_eq!(d.raw(), 0x102);
        assert_eq!(d.major(), 2);
        assert_eq!(d.minor(), 1);
        assert_eq!(format!("{d}"), "2:1");
        assert_eq!(format!("{d:?}"), "Dev(2:1)");
    }

    #[test]
    fn null_device() {
        assert!(DeviceNumber::NULL.is_null());
        assert!(DeviceNumber::default().is_null());
        assert!(!DeviceNumber::new(1, 0).is_null());
        assert_eq!(DeviceNumber::new(1, 0).raw(), 1);
    }

    #[test]
    fn minor_keeps_24_bits() {
        let d = DeviceNumber::new(0xFF, DeviceNumber::MAX_MINOR);
        assert_eq!(d.raw(), u32::MAX);
        assert_eq!(d.minor(), DeviceNumber::MAX_MINOR);
    }
}
