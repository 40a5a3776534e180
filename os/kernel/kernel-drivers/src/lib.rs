//! # Device drivers
//!
//! Character and block drivers are looked up by the 8-bit major half of a
//! [`DeviceNumber`]; the driver interprets the minor half.
//!
//! ```text
//!  DeviceRegistry
//!  ├── char  1  MemDevices   null, zero, full, port, urandom
//!  ├── char  2  Tty          console, serial lines
//!  └── block 1  RamDisks     up to eight memory-backed disks
//! ```
//!
//! ```rust
//! use kernel_drivers::{DeviceNumber, DeviceRegistry, Errno, RamDisks, major};
//!
//! let disks = RamDisks::new();
//! let devices = DeviceRegistry::new();
//! devices.register_block(major::BLK_RAMDISK, &disks).unwrap();
//!
//! let ram0 = disks.add(512, vec![0xAA; 1024].leak()).unwrap();
//! let mut block = [0; 512];
//! assert_eq!(devices.read_block(ram0, 1, &mut block), Ok(512));
//! assert_eq!(
//!     devices.read_block(DeviceNumber::new(9, 0), 0, &mut block),
//!     Err(Errno::NoDev)
//! );
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod device;
mod errno;
pub mod major;
pub mod memdev;
pub mod port;
pub mod ramdisk;
mod registry;
pub mod ring_buffer;
pub mod tty;

pub use device::DeviceNumber;
pub use errno::{Errno, KResult};
pub use memdev::MemDevices;
pub use port::PortIo;
pub use ramdisk::RamDisks;
pub use registry::{BlockDriver, CharDriver, DeviceClass, DeviceRegistry, RegistryError};
pub use tty::{TerminalPort, Tty};
