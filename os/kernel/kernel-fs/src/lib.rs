//! # Kernel filesystems
//!
//! The filesystem driver contract ([`FileSystemDriver`], [`FileSystem`]),
//! the inode model it works on, and [`Tmpfs`], an in-memory filesystem whose
//! device nodes forward to the [`DeviceRegistry`](kernel_drivers::DeviceRegistry).
//!
//! ```rust
//! use kernel_drivers::DeviceRegistry;
//! use kernel_fs::{FileSystem, FileSystemDriver, FileType, Mode, TmpfsDriver};
//!
//! let devices = DeviceRegistry::new();
//! let mut fs = TmpfsDriver.mount(&devices, 0o755, "").unwrap();
//! let root = fs.root();
//!
//! let foo = fs.create(root, "foo", Mode::of(FileType::Directory, 0o755)).unwrap();
//! let bar = fs.create(foo, "bar", Mode::of(FileType::Regular, 0o644)).unwrap();
//! fs.write(bar, 0, b"Hello, files!\n").unwrap();
//!
//! let mut buf = [0; 15];
//! assert_eq!(fs.read(bar, 0, &mut buf), Ok(14));
//! assert_eq!(&buf[..14], b"Hello, files!\n");
//! TmpfsDriver.destroy(fs);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod driver;
mod inode;
mod mode;
mod tmpfs;

pub use driver::{FileSystem, FileSystemDriver};
pub use inode::{BLOCK_SIZE, Block, Dentry, FileData, FsId, Inode, InodeData, InodeId};
pub use mode::{FileType, Mode};
pub use tmpfs::{Tmpfs, TmpfsDriver};
