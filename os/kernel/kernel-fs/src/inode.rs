//! Inodes and directory entries.

use crate::mode::{FileType, Mode};
use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use kernel_drivers::DeviceNumber;

/// Bytes per file block.
pub const BLOCK_SIZE: usize = 4096;

pub type Block = [u8; BLOCK_SIZE];

/// Index of an inode within its filesystem instance.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct InodeId(pub(crate) u32);

impl InodeId {
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies a mounted filesystem instance.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct FsId(pub(crate) u32);

/// Name to inode binding inside a directory.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Dentry {
    name: String,
    inode: InodeId,
}

impl Dentry {
    pub(crate) fn new(name: &str, inode: InodeId) -> Self {
        Self {
            name: String::from(name),
            inode,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn inode(&self) -> InodeId {
        self.inode
    }
}

/// Contents of a regular file: a chain of blocks and the logical size.
///
/// The chain only grows; bytes past `size` inside the last block are zero.
#[derive(Clone, Default)]
pub struct FileData {
    pub(crate) blocks: Vec<Box<Block>>,
    pub(crate) size: u64,
}

impl FileData {
    /// Empty file with its first block in place.
    pub(crate) fn new() -> Self {
        Self {
            blocks: alloc::vec![Box::new([0; BLOCK_SIZE])],
            size: 0,
        }
    }

    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Blocks in the chain.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

impl fmt::Debug for FileData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileData")
            .field("blocks", &self.blocks.len())
            .field("size", &self.size)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum InodeData {
    Regular(FileData),
    /// Entries in insertion order.
    Directory(Vec<Dentry>),
    CharDevice(DeviceNumber),
    BlockDevice(DeviceNumber),
}

impl InodeData {
    #[must_use]
    pub const fn file_type(&self) -> FileType {
        match self {
            Self::Regular(_) => FileType::Regular,
            Self::Directory(_) => FileType::Directory,
            Self::CharDevice(_) => FileType::CharDevice,
            Self::BlockDevice(_) => FileType::BlockDevice,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Inode {
    pub(crate) links: u16,
    pub(crate) mode: Mode,
    pub(crate) uid: u32,
    pub(crate) gid: u32,
    pub(crate) fs: FsId,
    pub(crate) data: InodeData,
}

impl Inode {
    pub(crate) fn new(fs: FsId, perms: u16, data: InodeData) -> Self {
        Self {
            links: 0,
            mode: Mode::of(data.file_type(), perms),
            uid: 0,
            gid: 0,
            fs,
            data,
        }
    }

    /// Number of directory entries naming this inode.
    #[must_use]
    pub const fn links(&self) -> u16 {
        self.links
    }

    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub const fn file_type(&self) -> FileType {
        self.data.file_type()
    }

    #[must_use]
    pub const fn uid(&self) -> u32 {
        self.uid
    }

    #[must_use]
    pub const fn gid(&self) -> u32 {
        self.gid
    }

    /// Instance the inode belongs to.
    #[must_use]
    pub const fn fs(&self) -> FsId {
        self.fs
    }

    #[must_use]
    pub const fn data(&self) -> &InodeData {
        &self.data
    }

    /// Logical size; 0 for anything but regular files.
    #[must_use]
    pub const fn size(&self) -> u64 {
        match &self.data {
            InodeData::Regular(f) => f.size,
            _ => 0,
        }
    }

    /// Device number of a device node.
    #[must_use]
    pub const fn device(&self) -> Option<DeviceNumber> {
        match self.data {
            InodeData::CharDevice(d) | InodeData::BlockDevice(d) => Some(d),
            _ => None,
        }
    }

    /// Directory listing, if this is a directory.
    #[must_use]
    pub fn entries(&self) -> Option<&[Dentry]> {
        match &self.data {
            InodeData::Directory(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_inode_takes_type_from_payload() {
        let ino = Inode::new(FsId(1), 0o640, InodeData::CharDevice(DeviceNumber::new(2, 0)));
        assert_eq!(ino.file_type(), FileType::CharDevice);
        assert_eq!(ino.mode().into_bits(), Mode::CHR | 0o640);
        assert_eq!(ino.links(), 0);
        assert_eq!(ino.device(), Some(DeviceNumber::new(2, 0)));
        assert_eq!(ino.size(), 0);
        assert!(ino.entries().is_none());
    }

    #[test]
    fn new_file_has_one_zeroed_block() {
        let f = FileData::new();
        assert_eq!(f.block_count(), 1);
        assert_eq!(f.size(), 0);
        assert!(f.blocks[0].iter().all(|&b| b == 0));
        assert_eq!(format!("{f:?}"), "FileData { blocks: 1, size: 0 }");
    }
}
