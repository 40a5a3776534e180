//! i686 entry glue.
//!
//! The boot stub (multiboot header, initial higher-half paging with the
//! directory self-mapped in slot 1023, boot stack) parses the multiboot
//! tags into a [`BootInfo`] and calls [`kernel_main`]. The linker script
//! provides `__kernel_start`, `__kernel_end` and `__kernel_virtual_offset`.

#![allow(unsafe_code)]

use crate::allocator::KernelAllocator;
use crate::boot::{self, BuiltinDrivers};
use crate::context::KernelContext;
use core::hint::spin_loop;
use kernel_alloc::frame_alloc::BitmapFrameAlloc;
use kernel_alloc::table_mapper::RecursiveMapper;
use kernel_drivers::port::X86Ports;
use kernel_drivers::tty::PcTerminal;
use kernel_drivers::DeviceRegistry;
use kernel_fs::{Dentry, FileSystem, Tmpfs};
use kernel_info::boot::{BootInfo, PhysicalRange};
use kernel_memory_addresses::PhysicalAddress;
use kernel_qemu::{QemuLogger, qemu_trace};
use kernel_sync::SpinLock;
use log::{LevelFilter, error, info};

static LOGGER: QemuLogger = QemuLogger::new(LevelFilter::Debug);

static FRAMES: SpinLock<BitmapFrameAlloc> = SpinLock::new(BitmapFrameAlloc::new());
static MAPPER: RecursiveMapper = RecursiveMapper;
static DEVICES: DeviceRegistry<'static> = DeviceRegistry::new();
static CONTEXT: KernelContext<'static, RecursiveMapper> =
    KernelContext::new(&FRAMES, &MAPPER, &DEVICES);

#[global_allocator]
static ALLOCATOR: KernelAllocator<'static, RecursiveMapper> = KernelAllocator::new(&CONTEXT);

static PORTS: X86Ports = X86Ports;
static TERMINAL: PcTerminal<'static, fn(&[u8])> =
    PcTerminal::new(&PORTS, debug_console as fn(&[u8]));
static DRIVERS: BuiltinDrivers<'static> = BuiltinDrivers::new(&PORTS, &TERMINAL);

unsafe extern "C" {
    static __kernel_start: u8;
    static __kernel_end: u8;
    static __kernel_virtual_offset: u8;
}

/// Console output until a VGA renderer exists.
fn debug_console(bytes: &[u8]) {
    for chunk in bytes.utf8_chunks() {
        qemu_trace!("{}", chunk.valid());
    }
}

/// Physical extent of the loaded kernel image.
#[allow(clippy::cast_possible_truncation)]
fn kernel_image() -> PhysicalRange {
    let start = (&raw const __kernel_start).addr() as u32;
    let end = (&raw const __kernel_end).addr() as u32;
    let offset = (&raw const __kernel_virtual_offset).addr() as u32;
    PhysicalRange::new(
        PhysicalAddress::new(start - offset),
        PhysicalAddress::new(end - offset),
    )
}

/// Called by the keyboard interrupt handler for every decoded character.
#[unsafe(no_mangle)]
pub extern "C" fn kernel_keyboard_input(byte: u8) {
    DRIVERS.tty.push_input(byte);
}

#[unsafe(no_mangle)]
#[allow(improper_ctypes_definitions)]
pub extern "C" fn kernel_main(boot_info: &'static BootInfo<'static>) -> ! {
    qemu_trace!("kernel: entered\n");
    if LOGGER.install().is_err() {
        qemu_trace!("kernel: logger already installed\n");
    }

    let modules = boot::init_memory(&CONTEXT, kernel_image(), boot_info)
        .expect("memory initialization failed");

    let registered = DRIVERS.register(&DEVICES);
    info!("kernel: {registered} drivers registered");

    let images = modules.into_iter().flatten().map(|m| {
        // SAFETY: `init_memory` mapped the module at `virt`; nothing else uses it.
        unsafe { core::slice::from_raw_parts_mut(m.virt.as_mut_ptr::<u8>(), m.len() as usize) }
    });
    boot::attach_ramdisks(&DRIVERS.ramdisks, images);

    match boot::fs_demo(&DEVICES) {
        Ok((mut fs, report)) => {
            if let Ok(n) = report.ram0 {
                debug_console(&report.ram0_block[..n]);
                debug_console(b"\n");
            }
            echo_console(&mut fs)
        }
        Err(e) => {
            error!("kernel: filesystem demo failed: {e}");
            halt()
        }
    }
}

/// Copy keyboard input back to the console, forever.
fn echo_console(fs: &mut Tmpfs<'_>) -> ! {
    let Some(console) = fs.lookup(fs.root(), "console").map(Dentry::inode) else {
        halt()
    };
    loop {
        if !matches!(boot::echo_console(fs, console), Ok(n) if n > 0) {
            spin_loop();
        }
    }
}

fn halt() -> ! {
    loop {
        spin_loop();
    }
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    qemu_trace!("kernel panic: {info}\n");
    halt()
}
