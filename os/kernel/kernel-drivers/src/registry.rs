//! Driver contracts and the major-number registry.

use crate::device::DeviceNumber;
use crate::errno::{Errno, KResult};
use core::fmt;
use kernel_sync::SpinLock;
use log::{debug, error};

/// Byte-stream device.
///
/// Both calls return the number of bytes transferred.
pub trait CharDriver: Sync {
    /// # Errors
    /// Driver specific; [`Errno::NoDev`] for minors the driver doesn't serve.
    fn read(&self, dev: DeviceNumber, pos: u64, buf: &mut [u8]) -> KResult<usize>;

    /// # Errors
    /// Driver specific; [`Errno::NoDev`] for minors the driver doesn't serve.
    fn write(&self, dev: DeviceNumber, pos: u64, buf: &[u8]) -> KResult<usize>;
}

/// Device addressed in fixed-size blocks. Every transfer moves exactly one
/// block; buffers must hold at least [`block_size`](Self::block_size) bytes.
pub trait BlockDriver: Sync {
    /// Block size of `dev`, 0 if the device doesn't exist.
    fn block_size(&self, dev: DeviceNumber) -> u32;

    /// # Errors
    /// [`Errno::NoDev`] for unknown devices, [`Errno::Fault`] past the end.
    fn read_block(&self, dev: DeviceNumber, blk: u64, buf: &mut [u8]) -> KResult<usize>;

    /// # Errors
    /// [`Errno::NoDev`] for unknown devices, [`Errno::Fault`] past the end.
    fn write_block(&self, dev: DeviceNumber, blk: u64, buf: &[u8]) -> KResult<usize>;
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DeviceClass {
    Char,
    Block,
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Char => "char",
            Self::Block => "block",
        })
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("{class} major {major} is already taken")]
    MajorTaken { class: DeviceClass, major: u8 },
}

const MAJORS: usize = 256;

/// Maps 8-bit major numbers to drivers.
///
/// Registration goes through `&self` so a registry can sit in a static and
/// be shared with the filesystems. The table locks are released before a
/// driver is called.
pub struct DeviceRegistry<'d> {
    chars: SpinLock<[Option<&'d dyn CharDriver>; MAJORS]>,
    blocks: SpinLock<[Option<&'d dyn BlockDriver>; MAJORS]>,
}

impl<'d> DeviceRegistry<'d> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            chars: SpinLock::new([None; MAJORS]),
            blocks: SpinLock::new([None; MAJORS]),
        }
    }

    /// Install a character driver. An occupied major keeps its first driver.
    ///
    /// # Errors
    /// [`RegistryError::MajorTaken`] if `major` already has a driver.
    pub fn register_char(&self, major: u8, driver: &'d dyn CharDriver) -> Result<(), RegistryError> {
        let mut chars = self.chars.lock();
        let slot = &mut chars[usize::from(major)];
        if slot.is_some() {
            error!("devices: char major {major} is taken, keeping the first driver");
            return Err(RegistryError::MajorTaken {
                class: DeviceClass::Char,
                major,
            });
        }
        *slot = Some(driver);
        debug!("devices: char major {major} registered");
        Ok(())
    }

    /// Install a block driver. An occupied major keeps its first driver.
    ///
    /// # Errors
    /// [`RegistryError::MajorTaken`] if `major` already has a driver.
    pub fn register_block(&self, major: u8, driver: &'d dyn BlockDriver) -> Result<(), RegistryError> {
        let mut blocks = self.blocks.lock();
        let slot = &mut blocks[usize::from(major)];
        if slot.is_some() {
            error!("devices: block major {major} is taken, keeping the first driver");
            return Err(RegistryError::MajorTaken {
                class: DeviceClass::Block,
                major,
            });
        }
        *slot = Some(driver);
        debug!("devices: block major {major} registered");
        Ok(())
    }

    fn char_driver(&self, dev: DeviceNumber) -> KResult<&'d dyn CharDriver> {
        self.chars.lock()[usize::from(dev.major())].ok_or(Errno::NoDev)
    }

    fn block_driver(&self, dev: DeviceNumber) -> Option<&'d dyn BlockDriver> {
        self.blocks.lock()[usize::from(dev.major())]
    }

    /// # Errors
    /// [`Errno::NoDev`] without a driver for the major, else the driver's.
    pub fn read_char(&self, dev: DeviceNumber, pos: u64, buf: &mut [u8]) -> KResult<usize> {
        self.char_driver(dev)?.read(dev, pos, buf)
    }

    /// # Errors
    /// [`Errno::NoDev`] without a driver for the major, else the driver's.
    pub fn write_char(&self, dev: DeviceNumber, pos: u64, buf: &[u8]) -> KResult<usize> {
        self.char_driver(dev)?.write(dev, pos, buf)
    }

    /// Block size of `dev`; 0 when nothing serves it.
    #[must_use]
    pub fn block_size(&self, dev: DeviceNumber) -> u32 {
        self.block_driver(dev).map_or(0, |d| d.block_size(dev))
    }

    /// # Errors
    /// [`Errno::NoDev`] without a driver for the major, else the driver's.
    pub fn read_block(&self, dev: DeviceNumber, blk: u64, buf: &mut [u8]) -> KResult<usize> {
        self.block_driver(dev).ok_or(Errno::NoDev)?.read_block(dev, blk, buf)
    }

    /// # Errors
    /// [`Errno::NoDev`] without a driver for the major, else the driver's.
    pub fn write_block(&self, dev: DeviceNumber, blk: u64, buf: &[u8]) -> KResult<usize> {
        self.block_driver(dev).ok_or(Errno::NoDev)?.write_block(dev, blk, buf)
    }

    #[must_use]
    pub fn has_char(&self, major: u8) -> bool {
        self.chars.lock()[usize::from(major)].is_some()
    }

    #[must_use]
    pub fn has_block(&self, major: u8) -> bool {
        self.blocks.lock()[usize::from(major)].is_some()
    }
}

impl Default for DeviceRegistry<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DeviceRegistry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chars = self.chars.lock().iter().filter(|d| d.is_some()).count();
        let blocks = self.blocks.lock().iter().filter(|d| d.is_some()).count();
        f.debug_struct("DeviceRegistry")
            .field("char_drivers", &chars)
            .field("block_drivers", &blocks)
            .finish()
    }
}
