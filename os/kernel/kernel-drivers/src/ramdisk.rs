//! RAM disks on block major [`BLK_RAMDISK`](crate::major::BLK_RAMDISK).
//!
//! A RAM disk serves a memory buffer in fixed-size blocks. The minor number
//! is the order in which disks were added.

use crate::device::DeviceNumber;
use crate::errno::{Errno, KResult};
use crate::major::BLK_RAMDISK;
use crate::registry::BlockDriver;
use kernel_sync::SpinLock;
use log::{info, warn};

pub const MAX_RAMDISKS: usize = 8;

struct Disk<'r> {
    block_size: u32,
    data: &'r mut [u8],
}

impl Disk<'_> {
    /// Block size in bytes and the stored bytes of block `blk`. The last
    /// block may be partial; a block starting at or past the end faults.
    fn block(&self, blk: u64) -> KResult<(usize, core::ops::Range<usize>)> {
        let size = usize::try_from(self.block_size).map_err(|_| Errno::Fault)?;
        let start = usize::try_from(blk)
            .ok()
            .and_then(|b| b.checked_mul(size))
            .ok_or(Errno::Fault)?;
        if start >= self.data.len() {
            return Err(Errno::Fault);
        }
        let end = start.saturating_add(size).min(self.data.len());
        Ok((size, start..end))
    }
}

pub struct RamDisks<'r> {
    disks: SpinLock<[Option<Disk<'r>>; MAX_RAMDISKS]>,
}

impl<'r> RamDisks<'r> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            disks: SpinLock::new([const { None }; MAX_RAMDISKS]),
        }
    }

    /// Attach `data` as the next disk.
    ///
    /// Returns its device number, or `None` when all slots are in use or the
    /// block size is zero.
    pub fn add(&self, block_size: u32, data: &'r mut [u8]) -> Option<DeviceNumber> {
        if block_size == 0 {
            warn!("ramdisk: refusing block size 0");
            return None;
        }
        let mut disks = self.disks.lock();
        let Some(idx) = disks.iter().position(Option::is_none) else {
            warn!("ramdisk: all {MAX_RAMDISKS} slots in use");
            return None;
        };
        let len = data.len();
        disks[idx] = Some(Disk { block_size, data });

        #[allow(clippy::cast_possible_truncation)]
        let dev = DeviceNumber::new(BLK_RAMDISK, idx as u32);
        info!("ramdisk: {dev} is {len} bytes in {block_size}-byte blocks");
        Some(dev)
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.disks.lock().iter().filter(|d| d.is_some()).count()
    }

    fn with_disk<R>(&self, dev: DeviceNumber, f: impl FnOnce(&mut Disk<'r>) -> KResult<R>) -> KResult<R> {
        let idx = usize::try_from(dev.minor()).map_err(|_| Errno::NoDev)?;
        let mut disks = self.disks.lock();
        let disk = disks.get_mut(idx).and_then(Option::as_mut).ok_or(Errno::NoDev)?;
        f(disk)
    }
}

impl Default for RamDisks<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockDriver for RamDisks<'_> {
    fn block_size(&self, dev: DeviceNumber) -> u32 {
        self.with_disk(dev, |d| Ok(d.block_size)).unwrap_or(0)
    }

    fn read_block(&self, dev: DeviceNumber, blk: u64, buf: &mut [u8]) -> KResult<usize> {
        self.with_disk(dev, |d| {
            let (size, range) = d.block(blk)?;
            let out = buf.get_mut(..size).ok_or(Errno::Fault)?;
            let (stored, tail) = out.split_at_mut(range.len());
            stored.copy_from_slice(&d.data[range]);
            tail.fill(0);
            Ok(size)
        })
    }

    /// Bytes of a partial last block that fall past the disk are dropped;
    /// the count stored is returned.
    fn write_block(&self, dev: DeviceNumber, blk: u64, buf: &[u8]) -> KResult<usize> {
        self.with_disk(dev, |d| {
            let (size, range) = d.block(blk)?;
            let input = buf.get(..size).ok_or(Errno::Fault)?;
            let stored = range.len();
            d.data[range].copy_from_slice(&input[..stored]);
            Ok(stored)
        })
    }
}
