use std::sync::Mutex;

use kernel::KernelContext;
use kernel::boot::{
    self, BootError, BuiltinDrivers, CONSOLE_GREETING, MAX_MODULES, TTY1_GREETING,
};
use kernel_alloc::frame_alloc::{BitmapFrameAlloc, FrameAllocError};
use kernel_drivers::{DeviceRegistry, Errno, KResult, PortIo, TerminalPort};
use kernel_fs::{Dentry, FileSystem};
use kernel_info::boot::{
    BasicMemInfo, BootInfo, BootModule, MemoryKind, MemoryMapEntry, PhysicalRange,
};
use kernel_info::memory::K_MEM_START;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage};
use kernel_sync::SpinLock;
use kernel_vmem::testing::TestPhys;

struct NoPorts;

impl PortIo for NoPorts {
    fn inb(&self, _port: u16) -> u8 {
        0xFF
    }

    fn outb(&self, _port: u16, _value: u8) {}
}

#[derive(Default)]
struct Screen {
    console: Mutex<Vec<u8>>,
    serial: Mutex<Vec<u8>>,
}

impl TerminalPort for Screen {
    fn console_write(&self, bytes: &[u8]) {
        self.console.lock().unwrap().extend_from_slice(bytes);
    }

    fn serial_write(&self, line: u8, bytes: &[u8]) -> KResult<usize> {
        if line != 1 {
            return Err(Errno::NoDev);
        }
        self.serial.lock().unwrap().extend_from_slice(bytes);
        Ok(bytes.len())
    }
}

fn range(start: u32, end: u32) -> PhysicalRange {
    PhysicalRange::new(PhysicalAddress::new(start), PhysicalAddress::new(end))
}

fn kernel_image() -> PhysicalRange {
    range(0x0010_0000, 0x0020_0000)
}

#[test]
fn init_memory_reserves_and_maps_modules() {
    let frames = Box::new(SpinLock::new(BitmapFrameAlloc::new()));
    let phys = TestPhys::new(PhysicalPage::from_index(0x100));
    let devices = DeviceRegistry::new();
    let ctx = KernelContext::new(&frames, &phys, &devices);

    let memory_map = [
        MemoryMapEntry {
            addr: 0x0080_0000,
            len: 0x2000,
            kind: MemoryKind::Reserved,
        },
        MemoryMapEntry {
            addr: 0x0100_0000,
            len: 0x0100_0000,
            kind: MemoryKind::Available,
        },
    ];
    let modules = [
        BootModule {
            range: range(0x0040_0800, 0x0040_2000),
            cmdline: "initrd",
        },
        BootModule {
            range: range(0x0050_0000, 0x0050_0000),
            cmdline: "empty",
        },
    ];
    let info = BootInfo {
        meminfo: Some(BasicMemInfo {
            lower_kib: 639,
            upper_kib: 31 * 1024,
        }),
        memory_map: &memory_map,
        modules: &modules,
    };

    let mapped = boot::init_memory(&ctx, kernel_image(), &info).unwrap();

    {
        let frames = frames.lock();
        assert!(frames.is_used(PhysicalPage::from_index(0x100)));
        assert!(frames.is_used(PhysicalPage::from_index(0x1FF)));
        assert!(!frames.is_used(PhysicalPage::from_index(0x200)));
        // Below 1 MiB, past the reported lower memory.
        assert!(frames.is_used(PhysicalPage::from_index(0x9F)));
        assert!(frames.is_used(PhysicalPage::from_index(0x800)));
        assert!(frames.is_used(PhysicalPage::from_index(0x801)));
        assert!(!frames.is_used(PhysicalPage::from_index(0x802)));
        // The module's frames.
        assert!(frames.is_used(PhysicalPage::from_index(0x400)));
        assert!(frames.is_used(PhysicalPage::from_index(0x401)));
        assert_eq!(frames.window(), (PhysicalAddress::new(0), 32 * 1024 * 1024));
    }

    let module = mapped[0].unwrap();
    assert_eq!(module.len(), 0x1800);
    assert!(module.virt.as_u32() >= K_MEM_START);
    assert_eq!(module.virt.as_u32() & 0xFFF, 0x800);
    let (pa, _) = ctx.with_vmm(|vmm| vmm.translate(module.virt)).unwrap();
    assert_eq!(pa.as_u32(), 0x0040_0800);

    assert_eq!(mapped.iter().flatten().count(), 1);
    assert_eq!(mapped.len(), MAX_MODULES);
}

#[test]
fn modules_after_the_kernel_keep_their_frames() {
    let frames = Box::new(SpinLock::new(BitmapFrameAlloc::new()));
    let phys = TestPhys::new(PhysicalPage::from_index(0x100));
    let devices = DeviceRegistry::new();
    let ctx = KernelContext::new(&frames, &phys, &devices);

    // The lowest free frames, back to back.
    let modules = [
        BootModule {
            range: range(0x0020_0000, 0x0020_2000),
            cmdline: "initrd",
        },
        BootModule {
            range: range(0x0020_2000, 0x0020_3800),
            cmdline: "rootfs",
        },
    ];
    let info = BootInfo {
        meminfo: None,
        memory_map: &[],
        modules: &modules,
    };

    let mapped = boot::init_memory(&ctx, kernel_image(), &info).unwrap();

    for (module, expected) in mapped.iter().flatten().zip(&modules) {
        ctx.with_vmm(|vmm| {
            for offset in (0..module.len()).step_by(0x1000) {
                let (pa, _) = vmm.translate(module.virt + offset).unwrap();
                assert_eq!(pa.as_u32(), expected.range.start.as_u32() + offset);
            }
        });
    }

    let mut frames = frames.lock();
    assert_eq!(
        frames.window(),
        (PhysicalAddress::new(0x0010_0000), 15 * 1024 * 1024)
    );
    // One page table, placed after both modules.
    assert!(frames.is_used(PhysicalPage::from_index(0x204)));
    assert_eq!(frames.alloc_frame().unwrap().base().as_u32(), 0x0020_5000);
}

#[test]
fn init_memory_runs_once() {
    let frames = Box::new(SpinLock::new(BitmapFrameAlloc::new()));
    let phys = TestPhys::new(PhysicalPage::from_index(0x100));
    let devices = DeviceRegistry::new();
    let ctx = KernelContext::new(&frames, &phys, &devices);
    let info = BootInfo::default();

    let mapped = boot::init_memory(&ctx, kernel_image(), &info).unwrap();
    assert!(mapped.iter().all(Option::is_none));

    assert_eq!(
        boot::init_memory(&ctx, kernel_image(), &info),
        Err(BootError::Frames(FrameAllocError::AlreadyInitialized))
    );
    assert!(!frames.is_locked());
}

#[test]
fn builtin_drivers_register_once() {
    let screen = Screen::default();
    let drivers = BuiltinDrivers::new(&NoPorts, &screen);
    let devices = DeviceRegistry::new();

    assert_eq!(drivers.register(&devices), 3);

    let again = BuiltinDrivers::new(&NoPorts, &screen);
    assert_eq!(again.register(&devices), 0);

    again.tty.push_input(b'x');
    let console = kernel_drivers::DeviceNumber::new(kernel_drivers::major::CHR_TTY, 0);
    let mut buf = [0; 4];
    // The first driver keeps the major, so the second one's input is not seen.
    assert_eq!(devices.read_char(console, 0, &mut buf), Ok(0));
}

#[test]
fn fs_demo_talks_to_every_device() {
    let screen = Screen::default();
    let drivers = BuiltinDrivers::new(&NoPorts, &screen);
    let devices = DeviceRegistry::new();
    drivers.register(&devices);

    let mut image = vec![0u8; 8192];
    image[..5].copy_from_slice(b"hello");
    assert_eq!(
        boot::attach_ramdisks(&drivers.ramdisks, [image.leak() as &mut [u8]]),
        1
    );

    let (fs, report) = boot::fs_demo(&devices).unwrap();

    assert_eq!(report.tty1, Ok(TTY1_GREETING.len()));
    assert_eq!(report.console, Ok(CONSOLE_GREETING.len()));
    assert_eq!(report.ram0, Ok(4096));
    assert_eq!(&report.ram0_block[..5], b"hello");
    assert!(report.ram0_block[5..].iter().all(|&b| b == 0));

    assert_eq!(&*screen.serial.lock().unwrap(), TTY1_GREETING);
    assert_eq!(&*screen.console.lock().unwrap(), CONSOLE_GREETING);

    // Root plus three device nodes.
    assert_eq!(fs.inode_count(), 4);
}

#[test]
fn fs_demo_reads_a_module_smaller_than_a_block() {
    let screen = Screen::default();
    let drivers = BuiltinDrivers::new(&NoPorts, &screen);
    let devices = DeviceRegistry::new();
    drivers.register(&devices);

    let image: Vec<u8> = (0..100).collect();
    boot::attach_ramdisks(&drivers.ramdisks, [image.leak() as &mut [u8]]);

    let (_, report) = boot::fs_demo(&devices).unwrap();
    assert_eq!(report.ram0, Ok(4096));
    assert!(report.ram0_block[..100].iter().copied().eq(0..100));
    assert!(report.ram0_block[100..].iter().all(|&b| b == 0));
}

#[test]
fn echo_console_returns_keyboard_input() {
    let screen = Screen::default();
    let drivers = BuiltinDrivers::new(&NoPorts, &screen);
    let devices = DeviceRegistry::new();
    drivers.register(&devices);

    let (mut fs, _) = boot::fs_demo(&devices).unwrap();
    let console = fs.lookup(fs.root(), "console").map(Dentry::inode).unwrap();
    screen.console.lock().unwrap().clear();

    assert_eq!(boot::echo_console(&mut fs, console), Ok(0));
    for &b in b"hi there, world" {
        drivers.tty.push_input(b);
    }
    assert_eq!(boot::echo_console(&mut fs, console), Ok(boot::ECHO_CHUNK));
    assert_eq!(boot::echo_console(&mut fs, console), Ok(5));
    assert_eq!(&*screen.console.lock().unwrap(), b"hi there, world");
}

#[test]
fn echo_console_reports_device_errors() {
    let devices = DeviceRegistry::new();
    let (mut fs, report) = boot::fs_demo(&devices).unwrap();
    assert_eq!(report.console, Err(Errno::NoDev));

    let console = fs.lookup(fs.root(), "console").map(Dentry::inode).unwrap();
    assert_eq!(boot::echo_console(&mut fs, console), Err(Errno::NoDev));
}

#[test]
fn fs_demo_without_ramdisk_reports_no_device() {
    let screen = Screen::default();
    let drivers = BuiltinDrivers::new(&NoPorts, &screen);
    let devices = DeviceRegistry::new();
    drivers.register(&devices);

    let (_, report) = boot::fs_demo(&devices).unwrap();
    assert_eq!(report.tty1, Ok(TTY1_GREETING.len()));
    assert_eq!(report.ram0, Err(Errno::NoDev));
}

#[test]
fn attach_ramdisks_stops_when_slots_run_out() {
    let screen = Screen::default();
    let drivers = BuiltinDrivers::new(&NoPorts, &screen);
    let images = (0..10).map(|_| vec![0u8; 4096].leak() as &mut [u8]);
    assert_eq!(
        boot::attach_ramdisks(&drivers.ramdisks, images),
        kernel_drivers::ramdisk::MAX_RAMDISKS
    );
}
