//! Boot sequence.
//!
//! 1. [`init_memory`]: reserve the kernel image, apply the bootloader's
//!    memory information and map boot modules into kernel space. Nothing in
//!    this phase touches the heap.
//! 2. [`BuiltinDrivers::register`]: install memdev, tty and ramdisk.
//! 3. [`attach_ramdisks`]: serve the mapped modules as RAM disks.
//! 4. [`fs_demo`]: mount a tmpfs and talk to the devices through it.
//! 5. [`echo_console`]: copy keyboard input back to the console.

use crate::context::KernelContext;
use alloc::boxed::Box;
use kernel_alloc::frame_alloc::FrameAllocError;
use kernel_alloc::vmm::VmmError;
use kernel_drivers::major::{BLK_RAMDISK, CHR_MEMDEV, CHR_TTY};
use kernel_drivers::{
    DeviceNumber, DeviceRegistry, KResult, MemDevices, PortIo, RamDisks, TerminalPort, Tty,
};
use kernel_fs::{
    BLOCK_SIZE, FileSystem, FileSystemDriver, FileType, InodeId, Mode, Tmpfs, TmpfsDriver,
};
use kernel_info::boot::{BootInfo, PhysicalRange};
use kernel_info::memory::{K_MEM_START, PAGE_SIZE};
use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::{PageEntryBits, TableMapper};
use log::{debug, error, info, warn};

/// Boot modules that can be mapped.
pub const MAX_MODULES: usize = 8;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum BootError {
    #[error("frame allocator: {0}")]
    Frames(#[from] FrameAllocError),
    #[error("mapping a boot module failed: {0}")]
    Map(#[from] VmmError),
}

/// A boot module mapped into kernel space.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MappedModule {
    pub phys: PhysicalRange,
    pub virt: VirtualAddress,
}

impl MappedModule {
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.phys.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.phys.is_empty()
    }
}

pub type MappedModules = [Option<MappedModule>; MAX_MODULES];

/// Bring up physical and virtual memory from the boot information.
///
/// Modules beyond [`MAX_MODULES`] and empty modules are skipped with a
/// warning.
///
/// # Errors
/// A second call ([`FrameAllocError::AlreadyInitialized`]), or a module
/// that could not be mapped.
pub fn init_memory<M: TableMapper>(
    ctx: &KernelContext<'_, M>,
    kernel_image: PhysicalRange,
    boot: &BootInfo<'_>,
) -> Result<MappedModules, BootError> {
    {
        let mut frames = ctx.frames.lock();
        frames.init(kernel_image)?;

        match boot.meminfo {
            Some(mi) => frames.init_regions(mi.lower_bytes(), mi.upper_bytes()),
            None => warn!("boot: no basic memory info, staying in the guaranteed range"),
        }

        for entry in boot.memory_map.iter().filter(|e| !e.is_available()) {
            debug!(
                "boot: {:?} at 0x{:08X} + 0x{:X}",
                entry.kind, entry.addr, entry.len
            );
            frames.mark_used(entry.addr, entry.len);
        }

        // Page tables for one module must not land inside another.
        for module in boot.modules {
            frames.mark_used(module.range.start.as_u64(), u64::from(module.range.len()));
        }
    }

    let mut mapped: MappedModules = [None; MAX_MODULES];
    let mut slots = mapped.iter_mut();
    for module in boot.modules {
        if module.range.is_empty() {
            warn!("boot: skipping empty module {:?}", module.cmdline);
            continue;
        }
        let Some(slot) = slots.next() else {
            warn!("boot: more than {MAX_MODULES} modules, ignoring {:?}", module.cmdline);
            continue;
        };

        let virt = ctx.with_vmm(|vmm| {
            vmm.map_physical_span(
                VirtualAddress::new(K_MEM_START),
                module.range.start,
                module.range.end,
                PageEntryBits::kernel_rw(),
            )
        })?;
        info!(
            "boot: module {:?} ({} bytes) mapped at {virt}",
            module.cmdline,
            module.range.len()
        );
        *slot = Some(MappedModule {
            phys: module.range,
            virt,
        });
    }

    let frames = ctx.frames.lock();
    let (start, end) = frames.window();
    info!(
        "boot: memory ready, {} frames free in {start}..0x{end:X}",
        frames.free_frames()
    );
    Ok(mapped)
}

/// The drivers every kernel carries.
pub struct BuiltinDrivers<'k> {
    pub memdev: MemDevices<'k>,
    pub tty: Tty<'k>,
    pub ramdisks: RamDisks<'k>,
}

impl<'k> BuiltinDrivers<'k> {
    pub const fn new(ports: &'k dyn PortIo, terminal: &'k dyn TerminalPort) -> Self {
        Self {
            memdev: MemDevices::new(ports),
            tty: Tty::new(terminal),
            ramdisks: RamDisks::new(),
        }
    }

    /// Register all drivers; returns how many were accepted. Refusals are
    /// logged by the registry and don't stop the others.
    pub fn register(&'k self, devices: &DeviceRegistry<'k>) -> usize {
        [
            devices.register_char(CHR_MEMDEV, &self.memdev),
            devices.register_char(CHR_TTY, &self.tty),
            devices.register_block(BLK_RAMDISK, &self.ramdisks),
        ]
        .into_iter()
        .filter(Result::is_ok)
        .count()
    }
}

/// Serve each image as a RAM disk with page-sized blocks.
pub fn attach_ramdisks<'k>(
    ramdisks: &RamDisks<'k>,
    images: impl IntoIterator<Item = &'k mut [u8]>,
) -> usize {
    let mut attached = 0;
    for image in images {
        match ramdisks.add(PAGE_SIZE, image) {
            Some(dev) => {
                info!("boot: added RAM disk as dev {dev}");
                attached += 1;
            }
            None => error!("boot: no RAM disk slot left"),
        }
    }
    attached
}

pub const TTY1_GREETING: &[u8] = b"\x1b[91;47mHello COM1";
pub const CONSOLE_GREETING: &[u8] = b"Hello from character device";

/// What [`fs_demo`] got back from the devices.
#[derive(Debug)]
pub struct DemoReport {
    pub tty1: KResult<usize>,
    pub console: KResult<usize>,
    pub ram0: KResult<usize>,
    /// First block of `ram0`, valid up to the byte count in `ram0`.
    pub ram0_block: Box<[u8; BLOCK_SIZE]>,
}

/// Mount a tmpfs, create the `tty1`, `console` and `ram0` device nodes and
/// exercise them. Device errors are reported, not fatal.
///
/// # Errors
/// Only filesystem errors while creating the nodes.
pub fn fs_demo<'k>(devices: &'k DeviceRegistry<'k>) -> KResult<(Tmpfs<'k>, DemoReport)> {
    let mut fs = TmpfsDriver.mount(devices, 0o755, "")?;
    let root = fs.root();

    let tty1 = fs.create(root, "tty1", Mode::of(FileType::CharDevice, 0o620))?;
    fs.set_device(tty1, DeviceNumber::new(CHR_TTY, 1))?;
    let tty1_result = fs.write(tty1, 0, TTY1_GREETING);

    let console = fs.create(root, "console", Mode::of(FileType::CharDevice, 0o620))?;
    fs.set_device(console, DeviceNumber::new(CHR_TTY, 0))?;
    let console_result = fs.write(console, 0, CONSOLE_GREETING);

    let ram0 = fs.create(root, "ram0", Mode::of(FileType::BlockDevice, 0o660))?;
    fs.set_device(ram0, DeviceNumber::new(BLK_RAMDISK, 0))?;
    let mut block = Box::new([0; BLOCK_SIZE]);
    let ram0_result = fs.read(ram0, 0, &mut block[..]);

    for (name, result) in [
        ("tty1", &tty1_result),
        ("console", &console_result),
        ("ram0", &ram0_result),
    ] {
        match result {
            Ok(n) => debug!("boot: {name}: {n} bytes"),
            Err(e) => warn!("boot: {name}: {e}"),
        }
    }

    Ok((
        fs,
        DemoReport {
            tty1: tty1_result,
            console: console_result,
            ram0: ram0_result,
            ram0_block: block,
        },
    ))
}

/// Bytes echoed per [`echo_console`] call.
pub const ECHO_CHUNK: usize = 10;

/// Read pending input from the `console` node and write it back; returns
/// the number of bytes echoed.
///
/// # Errors
/// The device error of the read or the write. A failed write is logged.
pub fn echo_console(fs: &mut Tmpfs<'_>, console: InodeId) -> KResult<usize> {
    let mut buf = [0; ECHO_CHUNK];
    let n = fs.read(console, 0, &mut buf)?;
    if n == 0 {
        return Ok(0);
    }
    fs.write(console, 0, &buf[..n]).inspect_err(|e| {
        warn!("boot: console echo of {n} bytes failed: {e}");
    })
}
