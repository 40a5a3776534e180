//! # tmpfs
//!
//! Every inode lives in a per-instance arena and is addressed by
//! [`InodeId`]. Directory listings and file block chains are append-only:
//! nothing is unlinked, and link counts only grow. Destroying the instance
//! frees all of it.

use crate::driver::{FileSystem, FileSystemDriver};
use crate::inode::{BLOCK_SIZE, Dentry, FileData, FsId, Inode, InodeData, InodeId};
use crate::mode::{FileType, Mode};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};
use kernel_drivers::{DeviceNumber, DeviceRegistry, Errno, KResult};
use log::{debug, trace};

static NEXT_FS_ID: AtomicU32 = AtomicU32::new(1);

/// The tmpfs driver.
#[derive(Debug, Default, Copy, Clone)]
pub struct TmpfsDriver;

impl<'d> FileSystemDriver<'d> for TmpfsDriver {
    type Instance = Tmpfs<'d>;

    fn name(&self) -> &'static str {
        "tmpfs"
    }

    fn mount(&self, devices: &'d DeviceRegistry<'d>, flags: u32, _args: &str) -> KResult<Tmpfs<'d>> {
        Ok(Tmpfs::new(devices, flags))
    }

    fn destroy(&self, instance: Tmpfs<'d>) {
        debug!(
            "tmpfs: instance {} destroyed, {} inodes released",
            instance.id.0,
            instance.inodes.len()
        );
        drop(instance);
    }
}

pub struct Tmpfs<'d> {
    id: FsId,
    devices: &'d DeviceRegistry<'d>,
    inodes: Vec<Inode>,
}

impl<'d> Tmpfs<'d> {
    const ROOT: InodeId = InodeId(0);

    /// Instance with an empty root directory whose permissions are
    /// `flags & 0o777`.
    #[must_use]
    pub fn new(devices: &'d DeviceRegistry<'d>, flags: u32) -> Self {
        let id = FsId(NEXT_FS_ID.fetch_add(1, Ordering::Relaxed));
        #[allow(clippy::cast_possible_truncation)]
        let perms = (flags & u32::from(Mode::PERMS_MASK)) as u16;
        let root = Inode::new(id, perms, InodeData::Directory(Vec::new()));
        debug!("tmpfs: instance {} mounted, root {}", id.0, root.mode());
        Self {
            id,
            devices,
            inodes: alloc::vec![root],
        }
    }

    #[must_use]
    pub const fn id(&self) -> FsId {
        self.id
    }

    /// Inodes allocated so far, root included.
    #[must_use]
    pub fn inode_count(&self) -> usize {
        self.inodes.len()
    }

    /// Set the device number of a device node.
    ///
    /// # Errors
    /// `Fault` for an unknown inode, `Perm` if it isn't a device node.
    pub fn set_device(&mut self, ino: InodeId, dev: DeviceNumber) -> KResult<()> {
        match &mut self.get_mut(ino)?.data {
            InodeData::CharDevice(d) | InodeData::BlockDevice(d) => {
                *d = dev;
                Ok(())
            }
            _ => Err(Errno::Perm),
        }
    }

    fn get(&self, ino: InodeId) -> KResult<&Inode> {
        self.inodes.get(ino.index()).ok_or(Errno::Fault)
    }

    fn get_mut(&mut self, ino: InodeId) -> KResult<&mut Inode> {
        self.inodes.get_mut(ino.index()).ok_or(Errno::Fault)
    }

    fn entries(&self, dir: InodeId) -> KResult<&[Dentry]> {
        self.get(dir)?.entries().ok_or(Errno::NotDir)
    }

    fn alloc(&mut self, perms: u16, data: InodeData) -> KResult<InodeId> {
        let id = u32::try_from(self.inodes.len()).map_err(|_| Errno::NoSpc)?;
        self.inodes.push(Inode::new(self.id, perms, data));
        Ok(InodeId(id))
    }

    /// Append `name → target` to `dir` and count the new link.
    fn link(&mut self, dir: InodeId, name: &str, target: InodeId) -> KResult<()> {
        match &mut self.get_mut(dir)?.data {
            InodeData::Directory(entries) => entries.push(Dentry::new(name, target)),
            _ => return Err(Errno::NotDir),
        }
        let t = self.get_mut(target)?;
        t.links = t.links.saturating_add(1);
        Ok(())
    }

    fn target(&self, ino: InodeId) -> KResult<Target> {
        Ok(match &self.get(ino)?.data {
            InodeData::Directory(_) => Target::Directory,
            InodeData::CharDevice(dev) => Target::Char(*dev),
            InodeData::BlockDevice(dev) => Target::Block(*dev),
            InodeData::Regular(_) => Target::File,
        })
    }

    fn file(&self, ino: InodeId) -> KResult<&FileData> {
        match &self.get(ino)?.data {
            InodeData::Regular(f) => Ok(f),
            _ => Err(Errno::Perm),
        }
    }

    fn file_mut(&mut self, ino: InodeId) -> KResult<&mut FileData> {
        match &mut self.get_mut(ino)?.data {
            InodeData::Regular(f) => Ok(f),
            _ => Err(Errno::Perm),
        }
    }
}

/// Where reads and writes of an inode go.
#[derive(Copy, Clone)]
enum Target {
    Directory,
    Char(DeviceNumber),
    Block(DeviceNumber),
    File,
}

/// Block index and offset of byte `pos`.
fn locate(pos: u64) -> KResult<(usize, usize)> {
    let block = usize::try_from(pos / BLOCK_SIZE as u64).map_err(|_| Errno::FBig)?;
    #[allow(clippy::cast_possible_truncation)]
    let offset = (pos % BLOCK_SIZE as u64) as usize;
    Ok((block, offset))
}

impl FileData {
    /// Copy `buf` to `pos`, growing the chain with zeroed blocks as needed.
    fn write_at(&mut self, pos: u64, buf: &[u8]) -> KResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let end = pos.checked_add(buf.len() as u64).ok_or(Errno::FBig)?;
        let (mut block, mut offset) = locate(pos)?;

        let mut rest = buf;
        while !rest.is_empty() {
            while self.blocks.len() <= block {
                self.blocks.push(Box::new([0; BLOCK_SIZE]));
            }
            let n = rest.len().min(BLOCK_SIZE - offset);
            self.blocks[block][offset..offset + n].copy_from_slice(&rest[..n]);
            rest = &rest[n..];
            block += 1;
            offset = 0;
        }

        self.size = self.size.max(end);
        Ok(buf.len())
    }

    /// Copy out of the file, stopping at its size.
    fn read_at(&self, pos: u64, buf: &mut [u8]) -> KResult<usize> {
        if pos >= self.size {
            return Ok(0);
        }
        let avail = usize::try_from(self.size - pos).unwrap_or(usize::MAX);
        let total = buf.len().min(avail);
        let (mut block, mut offset) = locate(pos)?;

        let mut done = 0;
        while done < total {
            let n = (total - done).min(BLOCK_SIZE - offset);
            buf[done..done + n].copy_from_slice(&self.blocks[block][offset..offset + n]);
            done += n;
            block += 1;
            offset = 0;
        }
        Ok(total)
    }
}

impl FileSystem for Tmpfs<'_> {
    fn root(&self) -> InodeId {
        Self::ROOT
    }

    fn inode(&self, id: InodeId) -> Option<&Inode> {
        self.inodes.get(id.index())
    }

    fn create(&mut self, dir: InodeId, name: &str, mode: Mode) -> KResult<InodeId> {
        if self.entries(dir)?.iter().any(|e| e.name() == name) {
            return Err(Errno::Exist);
        }

        let perms = mode.permissions();
        let ino = match mode.file_type() {
            Some(FileType::Regular) => self.alloc(perms, InodeData::Regular(FileData::new()))?,
            Some(FileType::Directory) => {
                let d = self.alloc(perms, InodeData::Directory(Vec::new()))?;
                self.link(d, ".", d)?;
                self.link(d, "..", dir)?;
                d
            }
            Some(FileType::CharDevice) => self.alloc(perms, InodeData::CharDevice(DeviceNumber::NULL))?,
            Some(FileType::BlockDevice) => self.alloc(perms, InodeData::BlockDevice(DeviceNumber::NULL))?,
            _ => return Err(Errno::Perm),
        };
        self.link(dir, name, ino)?;
        trace!("tmpfs: created {name:?} as {ino} ({mode})");
        Ok(ino)
    }

    fn lookup(&self, dir: InodeId, name: &str) -> Option<&Dentry> {
        self.entries(dir).ok()?.iter().find(|e| e.name() == name)
    }

    fn readdir<'a>(&'a self, dir: InodeId, out: &mut [&'a str]) -> KResult<usize> {
        let entries = self.entries(dir)?;
        let n = entries.len().min(out.len());
        for (slot, e) in out.iter_mut().zip(entries) {
            *slot = e.name();
        }
        Ok(n)
    }

    fn read(&self, ino: InodeId, pos: u64, buf: &mut [u8]) -> KResult<usize> {
        match self.target(ino)? {
            Target::Directory => Err(Errno::IsDir),
            Target::Char(dev) => self.devices.read_char(dev, pos, buf),
            // The position selects the block.
            Target::Block(dev) => self.devices.read_block(dev, pos, buf),
            Target::File => self.file(ino)?.read_at(pos, buf),
        }
    }

    fn write(&mut self, ino: InodeId, pos: u64, buf: &[u8]) -> KResult<usize> {
        match self.target(ino)? {
            Target::Directory => Err(Errno::IsDir),
            Target::Char(dev) => self.devices.write_char(dev, pos, buf),
            Target::Block(dev) => self.devices.write_block(dev, pos, buf),
            Target::File => self.file_mut(ino)?.write_at(pos, buf),
        }
    }
}

impl fmt::Debug for Tmpfs<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tmpfs")
            .field("id", &self.id.0)
            .field("inodes", &self.inodes.len())
            .finish_non_exhaustive()
    }
}
