//! Filesystem driver contract.

use crate::inode::{Dentry, Inode, InodeId};
use crate::mode::Mode;
use kernel_drivers::{DeviceRegistry, KResult};

/// Creates and tears down filesystem instances.
pub trait FileSystemDriver<'d> {
    type Instance: FileSystem;

    /// Short name, as used in mount tables.
    fn name(&self) -> &'static str;

    /// Create a fresh instance. The low nine bits of `flags` become the
    /// permissions of the root directory.
    ///
    /// # Errors
    /// Driver specific.
    fn mount(&self, devices: &'d DeviceRegistry<'d>, flags: u32, args: &str) -> KResult<Self::Instance>;

    /// Release an instance and everything it owns.
    fn destroy(&self, instance: Self::Instance);
}

/// Operations on a mounted instance.
pub trait FileSystem {
    fn root(&self) -> InodeId;

    fn inode(&self, id: InodeId) -> Option<&Inode>;

    /// Add `name` to directory `dir` as a new inode of `mode`'s type.
    ///
    /// # Errors
    /// `NotDir`, `Exist`, or `Perm` for unsupported types.
    fn create(&mut self, dir: InodeId, name: &str, mode: Mode) -> KResult<InodeId>;

    /// Exact-name search of `dir`; `None` if absent or not a directory.
    fn lookup(&self, dir: InodeId, name: &str) -> Option<&Dentry>;

    /// Copy up to `out.len()` entry names of `dir` in insertion order.
    ///
    /// # Errors
    /// `NotDir` if `dir` is not a directory.
    fn readdir<'a>(&'a self, dir: InodeId, out: &mut [&'a str]) -> KResult<usize>;

    /// # Errors
    /// `IsDir` for directories, device errors for device nodes.
    fn read(&self, ino: InodeId, pos: u64, buf: &mut [u8]) -> KResult<usize>;

    /// # Errors
    /// `IsDir` for directories, device errors for device nodes.
    fn write(&mut self, ino: InodeId, pos: u64, buf: &[u8]) -> KResult<usize>;
}
